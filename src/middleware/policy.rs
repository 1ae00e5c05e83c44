/// Route access policy
///
/// A statically declared, ordered table of `(method, path prefix) → rule`.
/// The first matching entry decides; unmatched routes require
/// authentication.

use actix_web::http::Method;

use crate::auth::{Permission, Role};

/// What a request must prove before it reaches a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessRule {
    Public,
    Authenticated,
    /// Valid token and a role from the allow-list
    Roles(Vec<Role>),
    /// Valid token and a granted permission, optionally scoped to a
    /// resource type
    Permission {
        permission: Permission,
        resource: Option<String>,
    },
}

impl AccessRule {
    pub fn roles(min: Role) -> Self {
        AccessRule::Roles(Role::at_least(min))
    }

    pub fn on_resource(permission: Permission, resource: &str) -> Self {
        AccessRule::Permission {
            permission,
            resource: Some(resource.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
struct RouteEntry {
    method: Option<Method>,
    prefix: String,
    rule: AccessRule,
}

impl RouteEntry {
    fn matches(&self, method: &Method, path: &str) -> bool {
        self.method.as_ref().map_or(true, |m| m == method) && matches_prefix(&self.prefix, path)
    }
}

/// `/articles` matches `/articles` and `/articles/42` but not `/articlesx`
fn matches_prefix(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }

    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[derive(Debug, Clone)]
pub struct RoutePolicy {
    entries: Vec<RouteEntry>,
    fallback: AccessRule,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self::new(AccessRule::Authenticated)
    }
}

impl RoutePolicy {
    pub fn new(fallback: AccessRule) -> Self {
        Self {
            entries: Vec::new(),
            fallback,
        }
    }

    /// Add a rule for every method under `prefix`
    pub fn any(self, prefix: &str, rule: AccessRule) -> Self {
        self.push(None, prefix, rule)
    }

    /// Add a rule for one method under `prefix`
    pub fn on(self, method: Method, prefix: &str, rule: AccessRule) -> Self {
        self.push(Some(method), prefix, rule)
    }

    fn push(mut self, method: Option<Method>, prefix: &str, rule: AccessRule) -> Self {
        self.entries.push(RouteEntry {
            method,
            prefix: prefix.to_string(),
            rule,
        });
        self
    }

    pub fn rule_for(&self, method: &Method, path: &str) -> &AccessRule {
        self.entries
            .iter()
            .find(|entry| entry.matches(method, path))
            .map_or(&self.fallback, |entry| &entry.rule)
    }
}

/// Access rules for every route this service exposes
pub fn route_policy() -> RoutePolicy {
    RoutePolicy::default()
        .any("/health_check", AccessRule::Public)
        .on(Method::POST, "/auth/register", AccessRule::Public)
        .on(Method::POST, "/auth/login", AccessRule::Public)
        // Refresh and logout authenticate with the refresh token themselves
        .any("/auth/refresh", AccessRule::Public)
        .on(Method::GET, "/auth/me", AccessRule::Authenticated)
        .any("/admin", AccessRule::roles(Role::Admin))
        .on(Method::GET, "/articles", AccessRule::on_resource(Permission::Read, "article"))
        .on(Method::POST, "/articles", AccessRule::on_resource(Permission::Create, "article"))
        .on(Method::PUT, "/articles", AccessRule::on_resource(Permission::Update, "article"))
        .on(Method::DELETE, "/articles", AccessRule::on_resource(Permission::Delete, "article"))
}
