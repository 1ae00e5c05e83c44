/// Authentication Routes
///
/// Registration, login, token refresh, logout and current identity.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{hash_password, IdentityClaims, LogoutOutcome, NewUser, Role};
use crate::error::{AppError, AuthError, ErrorContext};
use crate::startup::AuthServices;
use crate::validators::{is_valid_email, is_valid_name};

/// User registration request
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Refresh token in the body, for clients that do not keep cookies
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Token pair returned by register/login/refresh
#[derive(Serialize, Deserialize, Debug)]
pub struct AuthResponse {
    pub access_token: String,
    /// Absent on refresh when rotation is disabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_in: i64,
}

/// Identity attached by the gatekeeper
#[derive(Serialize, Deserialize, Debug)]
pub struct IdentityResponse {
    pub id: String,
    pub email: String,
    pub role: Role,
}

/// Issue a fresh token pair and attach both cookies
fn token_pair_response(
    mut response: actix_web::HttpResponseBuilder,
    services: &AuthServices,
    identity: &IdentityClaims,
) -> Result<HttpResponse, AppError> {
    let access_token = services.tokens.issue_access(identity)?;
    let refresh_token = services.tokens.issue_refresh(identity)?;

    Ok(response
        .cookie(services.cookies.access(&access_token))
        .cookie(services.cookies.refresh(&refresh_token))
        .json(AuthResponse {
            access_token,
            refresh_token: Some(refresh_token),
            token_type: "Bearer".to_string(),
            expires_in: services.tokens.access_ttl(),
        }))
}

/// POST /auth/register
///
/// Creates a `user`-role account and returns a token pair.
///
/// # Errors
/// - 400: invalid email, name or weak password
/// - 409: email already registered
pub async fn register(
    req: HttpRequest,
    form: web::Json<RegisterRequest>,
    services: web::Data<AuthServices>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::for_request(&req, "user_registration");

    let email = is_valid_email(&form.email)?;
    let name = is_valid_name(&form.name)?;
    let password_hash = hash_password(&form.password)?;

    let user = services
        .users
        .create(NewUser {
            email,
            name,
            password_hash,
            role: Role::User,
        })
        .await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user.id,
        "User registered successfully"
    );

    let identity = IdentityClaims::new(user.id, user.email, user.role);
    token_pair_response(HttpResponse::Created(), &services, &identity)
}

/// POST /auth/login
///
/// # Errors
/// - 400: malformed email
/// - 401: unknown email or wrong password (same response for both)
/// - 403: account is inactive
pub async fn login(
    req: HttpRequest,
    form: web::Json<LoginRequest>,
    services: web::Data<AuthServices>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::for_request(&req, "user_login");

    let email = is_valid_email(&form.email)?;

    let Some(user) = services.users.find_by_email(&email).await? else {
        services.verifier.verify_absent(&form.password);
        return Err(AuthError::InvalidCredentials.into());
    };

    if !services.verifier.verify(&form.password, &user.password_hash)? {
        let err = AppError::Auth(AuthError::InvalidCredentials);
        context.with_user_id(user.id.to_string()).log_error(&err);
        return Err(err);
    }

    if !user.is_active {
        return Err(AuthError::AccountInactive.into());
    }

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user.id,
        "User logged in successfully"
    );

    let identity = IdentityClaims::new(user.id, user.email, user.role);
    token_pair_response(HttpResponse::Ok(), &services, &identity)
}

/// Refresh cookie first, JSON body second
fn presented_refresh_token(
    req: &HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
    services: &AuthServices,
) -> Option<String> {
    services
        .cookies
        .refresh_from(req)
        .or_else(|| body.map(|b| b.into_inner().refresh_token))
}

/// POST /auth/refresh
///
/// Mints a new access token. With rotation enabled the presented refresh
/// token is revoked and replaced.
///
/// # Errors
/// - 401: missing, invalid, expired or revoked refresh token
/// - 403: account is inactive
pub async fn refresh(
    req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
    services: web::Data<AuthServices>,
) -> Result<HttpResponse, AppError> {
    let presented = presented_refresh_token(&req, body, &services);
    let outcome = services.refresh.refresh(presented.as_deref()).await?;

    let mut response = HttpResponse::Ok();
    response.cookie(services.cookies.access(&outcome.access_token));
    if let Some(refresh_token) = &outcome.refresh_token {
        response.cookie(services.cookies.refresh(refresh_token));
    }

    Ok(response.json(AuthResponse {
        access_token: outcome.access_token,
        refresh_token: outcome.refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: services.tokens.access_ttl(),
    }))
}

/// DELETE /auth/refresh
///
/// Revokes the presented refresh token and clears both cookies. Always
/// 204: a failed blacklist write is logged, not reported to the client.
pub async fn logout(
    req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
    services: web::Data<AuthServices>,
) -> HttpResponse {
    let presented = presented_refresh_token(&req, body, &services);
    let outcome = services.refresh.logout(presented.as_deref()).await;

    if outcome == LogoutOutcome::Degraded {
        tracing::warn!("Logout completed without a revocation entry");
    }

    let mut response = HttpResponse::NoContent();
    for cookie in services.cookies.removals() {
        response.cookie(cookie);
    }
    response.finish()
}

/// GET /auth/me
pub async fn get_current_user(identity: web::ReqData<IdentityClaims>) -> HttpResponse {
    let identity = identity.into_inner();
    HttpResponse::Ok().json(IdentityResponse {
        id: identity.sub,
        email: identity.email,
        role: identity.role,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use actix_web::{test, App};
    use uuid::Uuid;

    use crate::auth::{
        Clock, CredentialVerifier, InMemoryRevocationStore, InMemoryUserDirectory, ManualClock,
        UserRecord,
    };
    use crate::configuration::Settings;

    /// Counts which verification path each login took
    #[derive(Clone, Default)]
    struct CountingVerifier {
        verified: Arc<AtomicUsize>,
        absent: Arc<AtomicUsize>,
    }

    impl CredentialVerifier for CountingVerifier {
        fn verify(&self, secret: &str, _: &str) -> Result<bool, AppError> {
            self.verified.fetch_add(1, Ordering::SeqCst);
            Ok(secret == "SecurePass123")
        }

        fn verify_absent(&self, _: &str) {
            self.absent.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn settings() -> Settings {
        serde_json::from_value(serde_json::json!({
            "database": {
                "username": "postgres",
                "password": "password",
                "port": 5432,
                "host": "localhost",
                "database_name": "authgate"
            },
            "application": { "port": 0 },
            "jwt": {
                "access_secret": "test-access-secret-at-least-32-characters",
                "refresh_secret": "test-refresh-secret-at-least-32-characters",
                "access_token_expiry": 900,
                "refresh_token_expiry": 604800,
                "issuer": "test",
                "rotate_refresh_tokens": true,
                "rotation_race": "accept"
            }
        }))
        .unwrap()
    }

    async fn services(verifier: CountingVerifier) -> AuthServices {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_now());
        let users = Arc::new(InMemoryUserDirectory::new());
        users
            .upsert(UserRecord {
                id: Uuid::new_v4(),
                email: "john@example.com".to_string(),
                name: "John".to_string(),
                password_hash: "stored".to_string(),
                role: Role::User,
                is_active: true,
            })
            .await;

        let mut services = AuthServices::new(
            &settings(),
            clock.clone(),
            Arc::new(InMemoryRevocationStore::new(clock)),
            users,
        )
        .unwrap();
        services.verifier = Arc::new(verifier);
        services
    }

    #[actix_web::test]
    async fn test_unknown_email_does_the_same_verification_work() {
        let verifier = CountingVerifier::default();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(services(verifier.clone()).await))
                .route("/auth/login", web::post().to(login)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(serde_json::json!({ "email": "nobody@example.com", "password": "SecurePass123" }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status().as_u16(), 401);
        assert_eq!(verifier.absent.load(Ordering::SeqCst), 1);
        assert_eq!(verifier.verified.load(Ordering::SeqCst), 0);

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(serde_json::json!({ "email": "john@example.com", "password": "WrongPass123" }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status().as_u16(), 401);
        assert_eq!(verifier.absent.load(Ordering::SeqCst), 1);
        assert_eq!(verifier.verified.load(Ordering::SeqCst), 1);
    }
}
