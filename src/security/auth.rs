use axum::http::{HeaderMap, header};
use subtle::ConstantTimeEq;

use crate::application::config::AuthMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailureReason {
    MissingCredentials,
    InvalidCredentials,
}

pub fn authorize(mode: &AuthMode, headers: &HeaderMap) -> Result<(), AuthFailureReason> {
    match mode {
        AuthMode::None => Ok(()),
        AuthMode::Token(expected) => verify_secret(bearer_token(headers), expected),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn verify_secret(provided: Option<&str>, expected: &str) -> Result<(), AuthFailureReason> {
    let Some(provided) = provided.filter(|value| !value.is_empty()) else {
        return Err(AuthFailureReason::MissingCredentials);
    };

    if provided.as_bytes().ct_eq(expected.as_bytes()).into() {
        Ok(())
    } else {
        Err(AuthFailureReason::InvalidCredentials)
    }
}

#[must_use]
pub fn auth_failure_message(reason: AuthFailureReason) -> &'static str {
    match reason {
        AuthFailureReason::MissingCredentials => "unauthorized: missing bearer token",
        AuthFailureReason::InvalidCredentials => "unauthorized: invalid bearer token",
    }
}
