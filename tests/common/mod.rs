#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::Arc;

use authgate::auth::{
    Clock, InMemoryRevocationStore, InMemoryUserDirectory, ManualClock, RevocationList,
    RevocationStore, Role, TokenService, UserRecord,
};
use authgate::configuration::{
    ApplicationSettings, CookieSettings, DatabaseSettings, JwtSettings, PermissionSettings,
    RevocationBackend, RevocationSettings, RotationRace, Settings,
};
use authgate::startup::{run, AuthServices};
use serde_json::Value;
use uuid::Uuid;

pub const ACCESS_SECRET: &str = "integration-access-secret-0123456789";
pub const REFRESH_SECRET: &str = "integration-refresh-secret-0123456789";
pub const PASSWORD: &str = "SecurePass123";

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub users: Arc<InMemoryUserDirectory>,
    pub clock: ManualClock,
    pub settings: Settings,
}

pub fn test_settings(rotate: bool, race: RotationRace) -> Settings {
    Settings {
        database: DatabaseSettings {
            username: "postgres".to_string(),
            password: "password".to_string(),
            port: 5432,
            host: "localhost".to_string(),
            database_name: "authgate".to_string(),
        },
        application: ApplicationSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        jwt: JwtSettings {
            access_secret: ACCESS_SECRET.to_string(),
            refresh_secret: REFRESH_SECRET.to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 604_800,
            issuer: "authgate-test".to_string(),
            rotate_refresh_tokens: rotate,
            rotation_race: race,
        },
        revocation: RevocationSettings {
            backend: RevocationBackend::Memory,
            ..RevocationSettings::default()
        },
        cookies: CookieSettings {
            secure: false,
            ..CookieSettings::default()
        },
        permissions: PermissionSettings::default(),
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_settings(true, RotationRace::Accept), None).await
}

/// Start the server on a random port with in-memory users and, unless
/// given, an in-memory revocation store
pub async fn spawn_app_with(
    settings: Settings,
    revocation_store: Option<Arc<dyn RevocationStore>>,
) -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let clock = ManualClock::starting_now();
    let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
    let revocation_store = revocation_store
        .unwrap_or_else(|| Arc::new(InMemoryRevocationStore::new(shared_clock.clone())));
    let users = Arc::new(InMemoryUserDirectory::new());

    let services = AuthServices::new(&settings, shared_clock, revocation_store, users.clone())
        .expect("Failed to build auth services");
    let server = run(listener, services).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
        users,
        clock,
        settings,
    }
}

/// Issue tokens the way an attacker holding a different key would
pub fn forged_token_service(clock: &ManualClock) -> TokenService {
    let mut jwt = test_settings(true, RotationRace::Accept).jwt;
    jwt.access_secret = "attacker-controlled-secret-0123456789".to_string();

    let clock: Arc<dyn Clock> = Arc::new(clock.clone());
    let store = Arc::new(InMemoryRevocationStore::new(clock.clone()));
    TokenService::new(&jwt, clock, RevocationList::new(store, std::time::Duration::from_millis(100)))
}

pub async fn error_code(response: reqwest::Response) -> String {
    let body: Value = response.json().await.expect("error body is JSON");
    body["code"].as_str().unwrap_or_default().to_string()
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Insert an account directly, bypassing registration
    pub async fn seed_user(&self, email: &str, role: Role) -> Uuid {
        let id = Uuid::new_v4();
        self.users
            .upsert(UserRecord {
                id,
                email: email.to_string(),
                name: "Test User".to_string(),
                password_hash: bcrypt::hash(PASSWORD, 4).unwrap(),
                role,
                is_active: true,
            })
            .await;
        id
    }

    pub async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/login"))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Log in and return `(access_token, refresh_token)`
    pub async fn login_tokens(&self, email: &str) -> (String, String) {
        let response = self.login(email, PASSWORD).await;
        assert_eq!(200, response.status().as_u16());

        let body: Value = response.json().await.unwrap();
        (
            body["access_token"].as_str().unwrap().to_string(),
            body["refresh_token"].as_str().unwrap().to_string(),
        )
    }

    pub async fn get_with_bearer(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// POST /auth/refresh carrying the token in the refresh cookie
    pub async fn refresh_with_cookie(&self, refresh_token: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/refresh"))
            .header(
                reqwest::header::COOKIE,
                format!("{}={}", self.settings.cookies.refresh_name, refresh_token),
            )
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn logout(&self, refresh_token: &str) -> reqwest::Response {
        self.client
            .delete(self.url("/auth/refresh"))
            .header(
                reqwest::header::COOKIE,
                format!("{}={}", self.settings.cookies.refresh_name, refresh_token),
            )
            .send()
            .await
            .expect("Failed to execute request.")
    }
}
