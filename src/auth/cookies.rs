/// Auth cookies
///
/// Both tokens travel as HttpOnly cookies. The refresh cookie is scoped to
/// the refresh path so it is never sent with ordinary API calls.

use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::HttpRequest;

use crate::configuration::{CookieSettings, SameSitePolicy};

#[derive(Clone, Debug)]
pub struct AuthCookies {
    settings: CookieSettings,
    access_ttl: i64,
    refresh_ttl: i64,
}

impl AuthCookies {
    pub fn new(settings: CookieSettings, access_ttl: i64, refresh_ttl: i64) -> Self {
        Self {
            settings,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn access(&self, token: &str) -> Cookie<'static> {
        self.build(self.settings.access_name.clone(), token.to_string(), "/".to_string())
            .max_age(Duration::seconds(self.access_ttl))
            .finish()
    }

    pub fn refresh(&self, token: &str) -> Cookie<'static> {
        self.build(
            self.settings.refresh_name.clone(),
            token.to_string(),
            self.settings.refresh_path.clone(),
        )
        .max_age(Duration::seconds(self.refresh_ttl))
        .finish()
    }

    /// Expired replacements for both cookies, used on logout
    pub fn removals(&self) -> [Cookie<'static>; 2] {
        let mut access = self.access("");
        access.make_removal();
        let mut refresh = self.refresh("");
        refresh.make_removal();
        [access, refresh]
    }

    pub fn access_from(&self, req: &HttpRequest) -> Option<String> {
        non_empty(req.cookie(&self.settings.access_name))
    }

    pub fn refresh_from(&self, req: &HttpRequest) -> Option<String> {
        non_empty(req.cookie(&self.settings.refresh_name))
    }

    fn build(
        &self,
        name: String,
        value: String,
        path: String,
    ) -> actix_web::cookie::CookieBuilder<'static> {
        let same_site = match self.settings.same_site {
            SameSitePolicy::Strict => SameSite::Strict,
            SameSitePolicy::Lax => SameSite::Lax,
        };

        Cookie::build(name, value)
            .path(path)
            .http_only(true)
            .secure(self.settings.secure)
            .same_site(same_site)
    }
}

fn non_empty(cookie: Option<Cookie<'static>>) -> Option<String> {
    cookie
        .map(|c| c.value().to_string())
        .filter(|value| !value.is_empty())
}
