use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use sqlx::PgPool;
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{
    AuthCookies, BcryptVerifier, Clock, CredentialVerifier, InMemoryRevocationStore,
    PermissionModel, PgRevocationStore, PgUserDirectory, RefreshCoordinator, RevocationList,
    RevocationStore, SystemClock, TokenService, UserDirectory,
};
use crate::configuration::{RevocationBackend, Settings};
use crate::error::{AppError, ConfigError};
use crate::middleware::{route_policy, Gatekeeper};
use crate::request_id::RequestLogger;
use crate::routes::{
    admin_overview, create_article, delete_article, get_current_user, health_check,
    list_articles, login, logout, refresh, register, update_article,
};

/// Everything the handlers and the gatekeeper share, built once at startup
pub struct AuthServices {
    pub tokens: Arc<TokenService>,
    pub refresh: RefreshCoordinator,
    pub users: Arc<dyn UserDirectory>,
    pub verifier: Arc<dyn CredentialVerifier>,
    pub permissions: Arc<PermissionModel>,
    pub cookies: AuthCookies,
}

impl AuthServices {
    /// Assemble the auth core from explicit backends
    pub fn new(
        settings: &Settings,
        clock: Arc<dyn Clock>,
        revocation_store: Arc<dyn RevocationStore>,
        users: Arc<dyn UserDirectory>,
    ) -> Result<Self, AppError> {
        let permissions = PermissionModel::with_overrides(&settings.permissions.resource_overrides)
            .map_err(|e| ConfigError::InvalidValue(format!("permissions.resource_overrides: {}", e)))?;

        let revocations = RevocationList::new(revocation_store, settings.revocation.timeout());
        let tokens = Arc::new(TokenService::new(&settings.jwt, clock, revocations));
        let refresh = RefreshCoordinator::new(tokens.clone(), users.clone(), &settings.jwt);
        let cookies = AuthCookies::new(
            settings.cookies.clone(),
            settings.jwt.access_token_expiry,
            settings.jwt.refresh_token_expiry,
        );

        Ok(Self {
            tokens,
            refresh,
            users,
            verifier: Arc::new(BcryptVerifier::new()?),
            permissions: Arc::new(permissions),
            cookies,
        })
    }

    /// Production wiring: Postgres users, configured revocation backend,
    /// system clock
    pub fn from_pool(settings: &Settings, pool: PgPool) -> Result<Self, AppError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let revocation_store: Arc<dyn RevocationStore> = match settings.revocation.backend {
            RevocationBackend::Memory => Arc::new(InMemoryRevocationStore::new(clock.clone())),
            RevocationBackend::Postgres => Arc::new(PgRevocationStore::new(pool.clone())),
        };

        Self::new(settings, clock, revocation_store, Arc::new(PgUserDirectory::new(pool)))
    }

    pub fn revocation_store(&self) -> Arc<dyn RevocationStore> {
        self.tokens.revocations().store().clone()
    }

    pub fn gatekeeper(&self) -> Gatekeeper {
        Gatekeeper::new(
            self.tokens.clone(),
            self.permissions.clone(),
            route_policy(),
            self.cookies.clone(),
        )
    }
}

pub fn run(listener: TcpListener, services: AuthServices) -> Result<Server, std::io::Error> {
    let services = web::Data::new(services);

    let server = HttpServer::new(move || {
        App::new()
            // Registered last, runs first: every response gets a request id
            .wrap(services.gatekeeper())
            .wrap(RequestLogger)
            .app_data(services.clone())
            .route("/health_check", web::get().to(health_check))
            .route("/auth/register", web::post().to(register))
            .route("/auth/login", web::post().to(login))
            .service(
                web::resource("/auth/refresh")
                    .route(web::post().to(refresh))
                    .route(web::delete().to(logout)),
            )
            .route("/auth/me", web::get().to(get_current_user))
            .route("/admin/overview", web::get().to(admin_overview))
            .service(
                web::resource("/articles")
                    .route(web::get().to(list_articles))
                    .route(web::post().to(create_article)),
            )
            .service(
                web::resource("/articles/{id}")
                    .route(web::put().to(update_article))
                    .route(web::delete().to(delete_article)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
