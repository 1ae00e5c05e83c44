pub mod auth;
pub mod configuration;
pub mod error;
pub mod middleware;
pub mod request_id;
pub mod routes;
pub mod startup;
pub mod telemetry;
pub mod validators;
