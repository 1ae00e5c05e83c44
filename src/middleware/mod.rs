/// Middleware module
///
/// The route policy table and the gatekeeper that enforces it.

mod gatekeeper;
mod policy;

pub use gatekeeper::{Gatekeeper, USER_EMAIL_HEADER, USER_ID_HEADER, USER_ROLE_HEADER};
pub use policy::{route_policy, AccessRule, RoutePolicy};
