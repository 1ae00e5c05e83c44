mod auth;
mod health_check;
mod protected;

pub use auth::{
    get_current_user, login, logout, refresh, register, AuthResponse, IdentityResponse,
    LoginRequest, RefreshRequest, RegisterRequest,
};
pub use health_check::health_check;
pub use protected::{
    admin_overview, create_article, delete_article, list_articles, update_article,
    ArticleRequest, ArticleResponse,
};
