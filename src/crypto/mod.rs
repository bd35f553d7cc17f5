//! Password hashing and session token primitives.
//!
//! Passwords are stored as Argon2id PHC strings. Sessions are stateless,
//! HMAC-signed JWTs carrying the username and an expiry; nothing about a
//! session is persisted server-side.

pub mod password;
pub mod token;

pub use password::{hash_password, verify_password};
pub use token::{AuthError, SessionAuthenticator, SessionClaims};
