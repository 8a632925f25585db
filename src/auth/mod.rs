//! Credentials: password hashing and bearer tokens.

pub mod jwt;
pub mod password;

pub use jwt::{Claims, JwtService, TokenAlgorithm};
pub use password::{PasswordPolicy, PasswordService};
