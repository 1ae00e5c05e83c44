/// Authentication module
///
/// Token issuance and verification, the refresh-token revocation list,
/// the refresh flow, role/permission checks, password hashing and the
/// user directory they all read from.

mod claims;
mod clock;
mod cookies;
mod password;
mod permissions;
mod refresh;
mod revocation;
mod token;
mod users;

pub use claims::{IdentityClaims, TokenClaims};
pub use clock::{Clock, ManualClock, SystemClock};
pub use cookies::AuthCookies;
pub use password::{hash_password, verify_password};
pub use password::{BcryptVerifier, CredentialVerifier};
pub use permissions::{Permission, PermissionModel, ResourceOverride, ResourceType, Role};
pub use refresh::{LogoutOutcome, RefreshCoordinator, RefreshOutcome};
pub use revocation::{
    spawn_pruner, ClaimOutcome, InMemoryRevocationStore, PgRevocationStore, RevocationList,
    RevocationStore, RevokeOutcome,
};
pub use token::TokenService;
pub use users::{InMemoryUserDirectory, NewUser, PgUserDirectory, UserDirectory, UserRecord};
