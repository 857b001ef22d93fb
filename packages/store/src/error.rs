//! Error taxonomy for the store crate.
//!
//! [`StoreError`] carries the data-layer failure taxonomy: a transient
//! read failure (`Unavailable`), a rejected write (`Rejected`), and a
//! decode failure (`Decode`). [`AuthError`] is the structured auth
//! failure value returned across the profile-loading boundary.

use thiserror::Error;

/// Data-layer failure taxonomy. Reads degrade to defaults at the
/// Gateway surface; writes surface `Rejected`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transient read failure — backend unreachable or erroring.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A write was rejected by the backend.
    #[error("write rejected: {0}")]
    Rejected(String),

    /// A response could not be decoded into the expected shape.
    #[error("decode failure: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Structured authentication failure, returned as a value rather than
/// thrown across the profile-loading boundary.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Credentials did not match a known user.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Sign-up failed because the email is already registered.
    #[error("email already registered")]
    EmailTaken,

    /// The auth backend was unavailable or returned an unexpected error.
    #[error("auth backend error: {0}")]
    Backend(String),
}
