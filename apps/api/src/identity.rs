//! Identity resolution: decides whether a session is cloud-backed or local-only.
//!
//! Authentication itself happens upstream; the auth proxy forwards the
//! principal in request headers and this module only classifies it.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use serde::Serialize;

use crate::errors::AppError;

const HEADER_USER_ID: &str = "x-user-id";
const HEADER_EMAIL: &str = "x-user-email";
const HEADER_EMAIL_VERIFIED: &str = "x-user-email-verified";
const HEADER_DISPLAY_NAME: &str = "x-user-name";

/// The authenticated user as reported by the auth proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub uid: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub display_name: Option<String>,
}

impl Principal {
    /// Email only if the provider verified it.
    pub fn verified_email(&self) -> Option<&str> {
        if self.email_verified {
            self.email.as_deref()
        } else {
            None
        }
    }

    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let uid = text(HEADER_USER_ID)?;
        Some(Self {
            uid,
            email: text(HEADER_EMAIL),
            email_verified: text(HEADER_EMAIL_VERIFIED).is_some_and(|v| v == "true"),
            display_name: text(HEADER_DISPLAY_NAME),
        })
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Principal::from_headers(&parts.headers).ok_or(AppError::Unauthorized)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityVerdict {
    Unauthenticated,
    /// Backed by the cloud medium.
    Privileged,
    /// Backed by account-local storage only.
    Standard,
}

/// Pluggable privileged-vs-standard decision.
///
/// Carried as `Arc<dyn IdentityPolicy>` so the store never hardcodes who is privileged.
pub trait IdentityPolicy: Send + Sync {
    fn resolve(&self, principal: Option<&Principal>) -> IdentityVerdict;
}

/// Single-operator policy: exactly one verified email address is privileged.
/// Comparison is exact and case-sensitive.
#[derive(Debug, Clone)]
pub struct AllowListPolicy {
    privileged_email: String,
}

impl AllowListPolicy {
    pub fn new(privileged_email: impl Into<String>) -> Self {
        Self {
            privileged_email: privileged_email.into(),
        }
    }
}

impl IdentityPolicy for AllowListPolicy {
    fn resolve(&self, principal: Option<&Principal>) -> IdentityVerdict {
        match principal {
            None => IdentityVerdict::Unauthenticated,
            Some(p) if p.verified_email() == Some(self.privileged_email.as_str()) => {
                IdentityVerdict::Privileged
            }
            Some(_) => IdentityVerdict::Standard,
        }
    }
}
