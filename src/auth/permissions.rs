/// Role and Permission Model
///
/// Roles and permissions are closed enums. Authorization is table-driven:
/// a role's general permission set is the default, and resource-scoped
/// overrides replace (never merge with) the general answer for a given
/// `(role, resource type, permission)` triple.
///
/// Every lookup fails closed: anything that cannot be resolved is a denial.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PermissionError;

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Editor,
    Admin,
    /// A role name this deployment does not define. Never granted anything.
    #[serde(other)]
    Unknown,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::User, Role::Editor, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Unknown => "unknown",
            Role::User => "user",
            Role::Editor => "editor",
            Role::Admin => "admin",
        }
    }

    /// Privilege rank; `Unknown` sits below every defined role
    pub fn rank(self) -> u8 {
        match self {
            Role::Unknown => 0,
            Role::User => 1,
            Role::Editor => 2,
            Role::Admin => 3,
        }
    }

    /// Allow-list of every defined role at or above `min` in privilege
    pub fn at_least(min: Role) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|role| role.rank() >= min.rank())
            .collect()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "editor" => Ok(Role::Editor),
            "admin" => Ok(Role::Admin),
            _ => Err(PermissionError::UnknownRole(s.to_string())),
        }
    }
}

/// Action verb checked against the permission tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Create,
    Read,
    Update,
    Delete,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Create => "create",
            Permission::Read => "read",
            Permission::Update => "update",
            Permission::Delete => "delete",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Permission::Create),
            "read" => Ok(Permission::Read),
            "update" => Ok(Permission::Update),
            "delete" => Ok(Permission::Delete),
            _ => Err(PermissionError::UnknownPermission(s.to_string())),
        }
    }
}

/// Normalized resource type name: lowercase ASCII letters, digits, `_` and `-`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceType(String);

impl ResourceType {
    const MAX_LENGTH: usize = 64;

    pub fn parse(raw: &str) -> Result<Self, PermissionError> {
        let normalized = raw.trim().to_ascii_lowercase();
        let valid = !normalized.is_empty()
            && normalized.len() <= Self::MAX_LENGTH
            && normalized
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

        if valid {
            Ok(Self(normalized))
        } else {
            Err(PermissionError::InvalidResourceType(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One configured resource-scoped override
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResourceOverride {
    pub role: String,
    pub resource: String,
    pub permission: String,
    pub allowed: bool,
}

type OverrideTable = HashMap<ResourceType, HashMap<Permission, bool>>;

/// Role → permission tables with resource-scoped overrides
#[derive(Debug, Clone)]
pub struct PermissionModel {
    general: HashMap<Role, HashSet<Permission>>,
    resources: HashMap<Role, OverrideTable>,
}

impl Default for PermissionModel {
    fn default() -> Self {
        let general = Role::ALL
            .into_iter()
            .map(|role| (role, default_permissions(role).iter().copied().collect()))
            .collect();

        Self {
            general,
            resources: HashMap::new(),
        }
    }
}

/// Built-in general permission set of each role
fn default_permissions(role: Role) -> &'static [Permission] {
    match role {
        Role::Admin => &[
            Permission::Create,
            Permission::Read,
            Permission::Update,
            Permission::Delete,
        ],
        Role::Editor => &[Permission::Create, Permission::Read, Permission::Update],
        Role::User => &[Permission::Read],
        Role::Unknown => &[],
    }
}

impl PermissionModel {
    /// Default tables plus overrides read from configuration.
    ///
    /// # Errors
    /// Rejects entries naming an unknown role, permission or a malformed
    /// resource type, so a typo cannot silently widen or narrow access.
    pub fn with_overrides(overrides: &[ResourceOverride]) -> Result<Self, PermissionError> {
        let mut model = Self::default();
        for entry in overrides {
            let role: Role = entry.role.parse()?;
            let permission: Permission = entry.permission.parse()?;
            let resource = ResourceType::parse(&entry.resource)?;
            model.set_override(role, resource, permission, entry.allowed);
        }
        Ok(model)
    }

    pub fn set_override(
        &mut self,
        role: Role,
        resource: ResourceType,
        permission: Permission,
        allowed: bool,
    ) -> &mut Self {
        self.resources
            .entry(role)
            .or_default()
            .entry(resource)
            .or_default()
            .insert(permission, allowed);
        self
    }

    /// General lookup. Total: unknown roles and missing entries are `false`.
    pub fn has_permission(&self, role: Role, permission: Permission) -> bool {
        match role {
            Role::Unknown => false,
            Role::User | Role::Editor | Role::Admin => self
                .general
                .get(&role)
                .is_some_and(|set| set.contains(&permission)),
        }
    }

    /// Resource-scoped lookup. An override for the exact triple wins;
    /// otherwise the general table answers. Lookup errors deny.
    pub fn has_resource_permission(
        &self,
        role: Role,
        resource_type: &str,
        permission: Permission,
    ) -> bool {
        match self.resolve_resource(role, resource_type, permission) {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::error!(
                    role = %role,
                    resource = resource_type,
                    permission = %permission,
                    error = %e,
                    "Permission lookup failed; denying"
                );
                false
            }
        }
    }

    fn resolve_resource(
        &self,
        role: Role,
        resource_type: &str,
        permission: Permission,
    ) -> Result<bool, PermissionError> {
        let resource = ResourceType::parse(resource_type)?;

        let scoped = self
            .resources
            .get(&role)
            .and_then(|table| table.get(&resource))
            .and_then(|perms| perms.get(&permission));

        match (role, scoped) {
            (Role::Unknown, _) => Ok(false),
            (_, Some(allowed)) => Ok(*allowed),
            (_, None) => Ok(self.has_permission(role, permission)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let model = PermissionModel::default();

        assert!(model.has_permission(Role::Admin, Permission::Delete));
        assert!(model.has_permission(Role::Editor, Permission::Update));
        assert!(!model.has_permission(Role::Editor, Permission::Delete));
        assert!(model.has_permission(Role::User, Permission::Read));
        assert!(!model.has_permission(Role::User, Permission::Create));
    }

    #[test]
    fn test_unknown_role_has_nothing() {
        let mut model = PermissionModel::default();
        model.set_override(
            Role::Unknown,
            ResourceType::parse("article").unwrap(),
            Permission::Read,
            true,
        );

        for permission in [
            Permission::Create,
            Permission::Read,
            Permission::Update,
            Permission::Delete,
        ] {
            assert!(!model.has_permission(Role::Unknown, permission));
            assert!(!model.has_resource_permission(Role::Unknown, "article", permission));
        }
    }

    #[test]
    fn test_unknown_role_name_deserializes_to_unknown() {
        let role: Role = serde_json::from_str("\"superuser\"").unwrap();
        assert_eq!(role, Role::Unknown);
        assert_eq!(serde_json::to_string(&Role::Editor).unwrap(), "\"editor\"");
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn test_resource_override_denies_over_general_grant() {
        let mut model = PermissionModel::default();
        model.set_override(
            Role::User,
            ResourceType::parse("X").unwrap(),
            Permission::Read,
            false,
        );

        assert!(model.has_permission(Role::User, Permission::Read));
        assert!(!model.has_resource_permission(Role::User, "X", Permission::Read));
        assert!(model.has_resource_permission(Role::User, "Y", Permission::Read));
    }

    #[test]
    fn test_resource_override_grants_over_general_denial() {
        let mut model = PermissionModel::default();
        model.set_override(
            Role::User,
            ResourceType::parse("comment").unwrap(),
            Permission::Create,
            true,
        );

        assert!(!model.has_permission(Role::User, Permission::Create));
        assert!(model.has_resource_permission(Role::User, "comment", Permission::Create));
        assert!(!model.has_resource_permission(Role::User, "article", Permission::Create));
    }

    #[test]
    fn test_override_for_other_permission_falls_back() {
        let mut model = PermissionModel::default();
        model.set_override(
            Role::Editor,
            ResourceType::parse("article").unwrap(),
            Permission::Delete,
            true,
        );

        assert!(model.has_resource_permission(Role::Editor, "article", Permission::Update));
        assert!(model.has_resource_permission(Role::Editor, "article", Permission::Delete));
    }

    #[test]
    fn test_malformed_resource_type_fails_closed() {
        let model = PermissionModel::default();

        assert!(!model.has_resource_permission(Role::Admin, "", Permission::Read));
        assert!(!model.has_resource_permission(Role::Admin, "../etc", Permission::Read));
    }

    #[test]
    fn test_with_overrides_from_config() {
        let overrides = vec![ResourceOverride {
            role: "Editor".to_string(),
            resource: "Invoice".to_string(),
            permission: "read".to_string(),
            allowed: false,
        }];
        let model = PermissionModel::with_overrides(&overrides).unwrap();

        assert!(!model.has_resource_permission(Role::Editor, "invoice", Permission::Read));
    }

    #[test]
    fn test_with_overrides_rejects_typos() {
        let overrides = vec![ResourceOverride {
            role: "editr".to_string(),
            resource: "invoice".to_string(),
            permission: "read".to_string(),
            allowed: true,
        }];
        assert!(PermissionModel::with_overrides(&overrides).is_err());
    }

    #[test]
    fn test_role_ordering_builds_allow_lists() {
        assert_eq!(Role::at_least(Role::Editor), vec![Role::Editor, Role::Admin]);
        assert_eq!(Role::at_least(Role::User).len(), 3);
        assert!(!Role::at_least(Role::User).contains(&Role::Unknown));
        assert_eq!(Role::at_least(Role::Unknown), Role::ALL.to_vec());
        assert!(Role::Unknown.rank() < Role::User.rank());
        assert!(Role::Editor.rank() < Role::Admin.rank());
    }
}
