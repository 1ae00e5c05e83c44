/// Request Gatekeeper
///
/// Classifies every request through the route policy, verifies the access
/// token (Bearer header first, then the access cookie), authorizes the
/// identity against the rule and attaches it to the request. Handlers only
/// ever see verified identities; failures short-circuit with a structured
/// error response before any handler runs.

use std::rc::Rc;
use std::sync::Arc;

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION},
    Error, HttpMessage, ResponseError,
};
use futures::future::LocalBoxFuture;

use crate::auth::{AuthCookies, IdentityClaims, PermissionModel, TokenService};
use crate::error::{AppError, AuthError};
use crate::middleware::policy::{AccessRule, RoutePolicy};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_ROLE_HEADER: &str = "x-user-role";

const FORWARDED_HEADERS: [&str; 3] = [USER_ID_HEADER, USER_EMAIL_HEADER, USER_ROLE_HEADER];

struct GateState {
    tokens: Arc<TokenService>,
    permissions: Arc<PermissionModel>,
    policy: RoutePolicy,
    cookies: AuthCookies,
}

/// Authentication and authorization middleware
#[derive(Clone)]
pub struct Gatekeeper {
    state: Arc<GateState>,
}

impl Gatekeeper {
    pub fn new(
        tokens: Arc<TokenService>,
        permissions: Arc<PermissionModel>,
        policy: RoutePolicy,
        cookies: AuthCookies,
    ) -> Self {
        Self {
            state: Arc::new(GateState {
                tokens,
                permissions,
                policy,
                cookies,
            }),
        }
    }
}

impl GateState {
    /// Decide a request. `Ok(None)` admits a public route without identity.
    ///
    /// The rule is looked up on the router's percent-decoded path, the same
    /// path that selects the handler.
    fn admit(&self, req: &ServiceRequest) -> Result<Option<IdentityClaims>, AuthError> {
        let rule = self.policy.rule_for(req.method(), req.match_info().as_str());
        if *rule == AccessRule::Public {
            return Ok(None);
        }

        let token = bearer_token(req.headers())
            .or_else(|| self.cookies.access_from(req.request()))
            .ok_or(AuthError::TokenMissing)?;

        let identity = self.tokens.verify_access(&token)?.identity();
        self.authorize(rule, &identity)?;

        Ok(Some(identity))
    }

    fn authorize(&self, rule: &AccessRule, identity: &IdentityClaims) -> Result<(), AuthError> {
        match rule {
            AccessRule::Public | AccessRule::Authenticated => Ok(()),
            AccessRule::Roles(allowed) => {
                if allowed.contains(&identity.role) {
                    Ok(())
                } else {
                    Err(AuthError::RoleDenied(identity.role))
                }
            }
            AccessRule::Permission {
                permission,
                resource,
            } => {
                let granted = match resource {
                    Some(resource) => {
                        self.permissions
                            .has_resource_permission(identity.role, resource, *permission)
                    }
                    None => self.permissions.has_permission(identity.role, *permission),
                };

                if granted {
                    Ok(())
                } else {
                    Err(AuthError::PermissionDenied {
                        permission: *permission,
                        resource: resource.clone(),
                    })
                }
            }
        }
    }
}

/// `Authorization: Bearer <token>`; scheme is case-insensitive
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();

    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token.to_string())
    } else {
        None
    }
}

/// Replace any client-supplied identity headers with the verified identity
fn forward_identity(headers: &mut HeaderMap, identity: Option<&IdentityClaims>) {
    for name in FORWARDED_HEADERS {
        headers.remove(name);
    }

    let Some(identity) = identity else {
        return;
    };

    let values = [
        (USER_ID_HEADER, identity.sub.as_str()),
        (USER_EMAIL_HEADER, identity.email.as_str()),
        (USER_ROLE_HEADER, identity.role.as_str()),
    ];
    for (name, value) in values {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Gatekeeper
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = GatekeeperService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(GatekeeperService {
            service: Rc::new(service),
            state: self.state.clone(),
        }))
    }
}

pub struct GatekeeperService<S> {
    service: Rc<S>,
    state: Arc<GateState>,
}

impl<S, B> Service<ServiceRequest> for GatekeeperService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let identity = match self.state.admit(&req) {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(
                    method = %req.method(),
                    path = %req.path(),
                    reason = %e,
                    "Request rejected by gatekeeper"
                );
                let response = ResponseError::error_response(&AppError::Auth(e));
                let res = req.into_response(response).map_into_right_body();
                return Box::pin(async move { Ok(res) });
            }
        };

        forward_identity(req.headers_mut(), identity.as_ref());

        if let Some(identity) = identity {
            tracing::debug!(
                user_id = %identity.sub,
                role = %identity.role,
                "Access token verified"
            );
            req.extensions_mut().insert(identity);
        }

        let service = self.service.clone();
        Box::pin(async move { Ok(service.call(req).await?.map_into_left_body()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use actix_web::{
        body::MessageBody, cookie::Cookie, test as actix_test, web, App, HttpRequest, HttpResponse,
    };
    use uuid::Uuid;

    use crate::auth::{
        Clock, InMemoryRevocationStore, ManualClock, Permission, ResourceType, RevocationList,
        Role,
    };
    use crate::configuration::{CookieSettings, JwtSettings, RotationRace};
    use crate::middleware::policy::route_policy;

    fn jwt(access_secret: &str) -> JwtSettings {
        JwtSettings {
            access_secret: access_secret.to_string(),
            refresh_secret: "test-refresh-secret-at-least-32-characters".to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 604_800,
            issuer: "test".to_string(),
            rotate_refresh_tokens: false,
            rotation_race: RotationRace::Accept,
        }
    }

    fn token_service(access_secret: &str, clock: &ManualClock) -> Arc<TokenService> {
        let clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let store = Arc::new(InMemoryRevocationStore::new(clock.clone()));
        let revocations = RevocationList::new(store, Duration::from_millis(100));
        Arc::new(TokenService::new(&jwt(access_secret), clock, revocations))
    }

    const SECRET: &str = "test-access-secret-at-least-32-characters";

    fn gatekeeper(tokens: Arc<TokenService>, permissions: PermissionModel) -> Gatekeeper {
        Gatekeeper::new(
            tokens,
            Arc::new(permissions),
            route_policy(),
            AuthCookies::new(CookieSettings::default(), 900, 604_800),
        )
    }

    async fn echo_identity(req: HttpRequest) -> HttpResponse {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string()
        };
        let from_extensions = req
            .extensions()
            .get::<IdentityClaims>()
            .map(|identity| identity.sub.clone())
            .unwrap_or_default();

        HttpResponse::Ok().json(serde_json::json!({
            "id": header(USER_ID_HEADER),
            "role": header(USER_ROLE_HEADER),
            "extension_id": from_extensions,
        }))
    }

    fn bearer(token: &str) -> (HeaderName, String) {
        (AUTHORIZATION, format!("Bearer {}", token))
    }

    async fn rejection<B: MessageBody>(res: ServiceResponse<B>) -> (u16, String) {
        let status = res.status().as_u16();
        let json: serde_json::Value = actix_test::read_body_json(res).await;
        (status, json["code"].as_str().unwrap_or_default().to_string())
    }

    macro_rules! app {
        ($gate:expr) => {
            actix_test::init_service(
                App::new()
                    .wrap($gate)
                    .route("/health_check", web::get().to(echo_identity))
                    .route("/auth/me", web::get().to(echo_identity))
                    .route("/admin/overview", web::get().to(echo_identity))
                    .route("/articles", web::get().to(echo_identity))
                    .route("/articles/{id}", web::delete().to(echo_identity)),
            )
            .await
        };
    }

    fn identity(role: Role) -> IdentityClaims {
        IdentityClaims::new(Uuid::new_v4(), "john@example.com", role)
    }

    #[actix_web::test]
    async fn test_public_route_needs_no_token() {
        let clock = ManualClock::starting_now();
        let app = app!(gatekeeper(token_service(SECRET, &clock), PermissionModel::default()));

        let req = actix_test::TestRequest::get().uri("/health_check").to_request();
        let res = actix_test::call_service(&app, req).await;
        assert!(res.status().is_success());
    }

    #[actix_web::test]
    async fn test_missing_token_rejected() {
        let clock = ManualClock::starting_now();
        let app = app!(gatekeeper(token_service(SECRET, &clock), PermissionModel::default()));

        let req = actix_test::TestRequest::get().uri("/auth/me").to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(rejection(res).await, (401, "TOKEN_MISSING".to_string()));
    }

    #[actix_web::test]
    async fn test_bearer_and_cookie_transports() {
        let clock = ManualClock::starting_now();
        let tokens = token_service(SECRET, &clock);
        let identity = identity(Role::User);
        let token = tokens.issue_access(&identity).unwrap();
        let app = app!(gatekeeper(tokens, PermissionModel::default()));

        let req = actix_test::TestRequest::get()
            .uri("/auth/me")
            .insert_header(bearer(&token))
            .to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["id"], identity.sub.as_str());
        assert_eq!(body["extension_id"], identity.sub.as_str());

        let req = actix_test::TestRequest::get()
            .uri("/auth/me")
            .cookie(Cookie::new("access_token", token.clone()))
            .to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["role"], "user");
    }

    #[actix_web::test]
    async fn test_spoofed_identity_headers_are_replaced() {
        let clock = ManualClock::starting_now();
        let tokens = token_service(SECRET, &clock);
        let token = tokens.issue_access(&identity(Role::User)).unwrap();
        let app = app!(gatekeeper(tokens, PermissionModel::default()));

        let req = actix_test::TestRequest::get()
            .uri("/auth/me")
            .insert_header(bearer(&token))
            .insert_header((USER_ROLE_HEADER, "admin"))
            .to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["role"], "user");

        let req = actix_test::TestRequest::get()
            .uri("/health_check")
            .insert_header((USER_ROLE_HEADER, "admin"))
            .to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["role"], "");
    }

    #[actix_web::test]
    async fn test_expired_and_forged_tokens() {
        let clock = ManualClock::starting_now();
        let tokens = token_service(SECRET, &clock);
        let expired = tokens.issue_access(&identity(Role::Admin)).unwrap();
        let forger = token_service("attacker-controlled-secret-value-123", &clock);
        let forged = forger.issue_access(&identity(Role::Admin)).unwrap();
        let app = app!(gatekeeper(tokens, PermissionModel::default()));

        let req = actix_test::TestRequest::get()
            .uri("/admin/overview")
            .insert_header(bearer(&forged))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(rejection(res).await, (401, "TOKEN_INVALID".to_string()));

        clock.advance(901);
        let req = actix_test::TestRequest::get()
            .uri("/admin/overview")
            .insert_header(bearer(&expired))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(rejection(res).await, (401, "TOKEN_EXPIRED".to_string()));
    }

    #[actix_web::test]
    async fn test_role_restricted_route() {
        let clock = ManualClock::starting_now();
        let tokens = token_service(SECRET, &clock);
        let admin = tokens.issue_access(&identity(Role::Admin)).unwrap();
        let editor = tokens.issue_access(&identity(Role::Editor)).unwrap();
        let app = app!(gatekeeper(tokens, PermissionModel::default()));

        let req = actix_test::TestRequest::get()
            .uri("/admin/overview")
            .insert_header(bearer(&admin))
            .to_request();
        assert!(actix_test::call_service(&app, req).await.status().is_success());

        let req = actix_test::TestRequest::get()
            .uri("/admin/overview")
            .insert_header(bearer(&editor))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(rejection(res).await, (403, "ROLE_DENIED".to_string()));
    }

    #[actix_web::test]
    async fn test_permission_restricted_route_honors_overrides() {
        let clock = ManualClock::starting_now();
        let tokens = token_service(SECRET, &clock);
        let editor = tokens.issue_access(&identity(Role::Editor)).unwrap();

        let mut permissions = PermissionModel::default();
        permissions.set_override(
            Role::Editor,
            ResourceType::parse("article").unwrap(),
            Permission::Delete,
            true,
        );
        permissions.set_override(
            Role::Editor,
            ResourceType::parse("article").unwrap(),
            Permission::Read,
            false,
        );
        let app = app!(gatekeeper(tokens, permissions));

        let req = actix_test::TestRequest::delete()
            .uri("/articles/42")
            .insert_header(bearer(&editor))
            .to_request();
        assert!(actix_test::call_service(&app, req).await.status().is_success());

        let req = actix_test::TestRequest::get()
            .uri("/articles")
            .insert_header(bearer(&editor))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(rejection(res).await, (403, "PERMISSION_DENIED".to_string()));
    }

    #[actix_web::test]
    async fn test_percent_encoded_paths_get_the_decoded_rule() {
        let clock = ManualClock::starting_now();
        let tokens = token_service(SECRET, &clock);
        let user = tokens.issue_access(&identity(Role::User)).unwrap();
        let app = app!(gatekeeper(tokens, PermissionModel::default()));

        let req = actix_test::TestRequest::get()
            .uri("/%61dmin/overview")
            .insert_header(bearer(&user))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(rejection(res).await, (403, "ROLE_DENIED".to_string()));

        let req = actix_test::TestRequest::delete()
            .uri("/%61rticles/42")
            .insert_header(bearer(&user))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(rejection(res).await, (403, "PERMISSION_DENIED".to_string()));

        let req = actix_test::TestRequest::get()
            .uri("/%68ealth_check")
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert!(res.status().is_success());
    }

    #[test]
    fn test_bearer_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer abc"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
