//! Authentication module
//!
//! Password hashing, access-token issuance/verification, the authenticated
//! principal extractor, and refresh-token rotation.

mod extractor;
mod jwt;
mod password;
mod refresh;

pub use extractor::AuthUser;
pub use jwt::{Claims, JwtKeys, ACCESS_TOKEN_TTL_SECS};
pub use password::{hash_password, verify_password};
pub use refresh::{RefreshTokenService, RotatedToken, REFRESH_TOKEN_TTL_DAYS};
