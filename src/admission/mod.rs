//! Admission gate evaluated before a WebSocket upgrade is accepted.
//!
//! Two independent checks:
//! - origin allow-list: empty allows everyone, otherwise the request host must
//!   match an entry exactly
//! - shared-secret token: disabled when unset or empty, otherwise the request
//!   must present the same token

use std::collections::HashSet;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::AdmissionConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("origin {0:?} is not allowed")]
    OriginNotAllowed(String),

    #[error("missing request host")]
    MissingHost,

    #[error("missing authentication token")]
    MissingToken,

    #[error("invalid authentication token")]
    InvalidToken,
}

impl AdmissionError {
    /// Short label used for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            Self::OriginNotAllowed(_) | Self::MissingHost => "origin",
            Self::MissingToken => "missing_token",
            Self::InvalidToken => "invalid_token",
        }
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
    }
}

/// Resolved admission rules
#[derive(Debug, Clone, Default)]
pub struct AdmissionPolicy {
    allowed_origins: HashSet<String>,
    auth_token: Option<String>,
}

impl AdmissionPolicy {
    pub fn new<I, S>(allowed_origins: I, auth_token: Option<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_origins: allowed_origins.into_iter().map(Into::into).collect(),
            auth_token: auth_token.filter(|token| !token.is_empty()),
        }
    }

    pub fn from_config(config: &AdmissionConfig) -> Self {
        Self::new(config.allowed_origins.iter().cloned(), config.auth_token.clone())
    }

    /// Policy that admits every request
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn requires_token(&self) -> bool {
        self.auth_token.is_some()
    }

    pub fn check_origin(&self, host: Option<&str>) -> Result<(), AdmissionError> {
        if self.allowed_origins.is_empty() {
            return Ok(());
        }

        let host = host.ok_or(AdmissionError::MissingHost)?;
        if self.allowed_origins.contains(host) {
            Ok(())
        } else {
            Err(AdmissionError::OriginNotAllowed(host.to_string()))
        }
    }

    pub fn check_token(&self, token: Option<&str>) -> Result<(), AdmissionError> {
        let Some(expected) = &self.auth_token else {
            return Ok(());
        };

        match token {
            Some(token) if tokens_match(token, expected) => Ok(()),
            Some(_) => Err(AdmissionError::InvalidToken),
            None => Err(AdmissionError::MissingToken),
        }
    }

    /// Run both checks, origin first
    pub fn admit(&self, host: Option<&str>, token: Option<&str>) -> Result<(), AdmissionError> {
        self.check_origin(host)?;
        self.check_token(token)
    }
}

/// Comparison time does not depend on where the tokens differ
fn tokens_match(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}
