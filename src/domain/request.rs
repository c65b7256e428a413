//! Request target splitting and credential validation.
//!
//! Hubs send every request as a single GET target:
//!
//! ```text
//! /v1/sensor?api_key=<hardware_token>:<user_token>&f100=0.01&f101=28
//! ```
//!
//! [`split_request`] cuts the target into route, [`HardwareCredential`] and
//! ordered [`KeyValuePair`]s. No percent-decoding is applied: firmware sends
//! the target verbatim and the payload is interpreted byte for byte.

use std::fmt;

use crate::error::IngestError;

/// Marker separating the route path from the credential.
pub const API_KEY_MARKER: &str = "?api_key=";

/// Minimum length of the `<hardware_token>:<user_token>` segment.
pub const MIN_CREDENTIAL_LEN: usize = 36;

/// Minimum length of the hardware token.
pub const MIN_HARDWARE_TOKEN_LEN: usize = 12;

/// Exact length of the user token.
pub const USER_TOKEN_LEN: usize = 16;

/// Dual-token credential identifying a hub and its owning account.
///
/// Only ever used as a lookup key. The `Display` implementation masks the
/// user token so the credential can be logged.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct HardwareCredential {
    hardware_token: String,
    user_token: String,
}

impl HardwareCredential {
    /// Parses and validates a `<hardware_token>:<user_token>` segment.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::InvalidRequestShape`] when the segment is
    /// shorter than [`MIN_CREDENTIAL_LEN`], has no `:`, the hardware token is
    /// shorter than [`MIN_HARDWARE_TOKEN_LEN`], or the user token is not
    /// exactly [`USER_TOKEN_LEN`] characters.
    pub fn parse(api_key: &str) -> Result<Self, IngestError> {
        if api_key.chars().count() < MIN_CREDENTIAL_LEN {
            return Err(IngestError::InvalidRequestShape(format!(
                "api_key shorter than {MIN_CREDENTIAL_LEN} characters"
            )));
        }
        let Some((hardware_token, user_token)) = api_key.split_once(':') else {
            return Err(IngestError::InvalidRequestShape(
                "api_key has no ':' separator".to_string(),
            ));
        };
        if hardware_token.chars().count() < MIN_HARDWARE_TOKEN_LEN {
            return Err(IngestError::InvalidRequestShape(format!(
                "hardware token shorter than {MIN_HARDWARE_TOKEN_LEN} characters"
            )));
        }
        if user_token.chars().count() != USER_TOKEN_LEN {
            return Err(IngestError::InvalidRequestShape(format!(
                "user token is not {USER_TOKEN_LEN} characters"
            )));
        }
        Ok(Self {
            hardware_token: hardware_token.to_string(),
            user_token: user_token.to_string(),
        })
    }

    /// Returns the hub's hardware token.
    #[must_use]
    pub fn hardware_token(&self) -> &str {
        &self.hardware_token
    }

    /// Returns the account's user token.
    #[must_use]
    pub fn user_token(&self) -> &str {
        &self.user_token
    }

    /// Key under which identities for this credential are cached.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.hardware_token, self.user_token)
    }
}

impl fmt::Display for HardwareCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hardware_token, mask(&self.user_token))
    }
}

impl fmt::Debug for HardwareCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareCredential")
            .field("hardware_token", &self.hardware_token)
            .field("user_token", &mask(&self.user_token))
            .finish()
    }
}

/// A single `key=value` token from the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValuePair {
    /// Parameter name (e.g. `f100`, `id`, `device_id`).
    pub key: String,
    /// Raw, undecoded value.
    pub value: String,
}

impl KeyValuePair {
    /// Builds a pair from borrowed parts.
    #[must_use]
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// Request-scoped input threaded through the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    /// Route path (e.g. `/v1/sensor`).
    pub route: String,
    /// Validated credential.
    pub credential: HardwareCredential,
    /// Raw `&`-joined payload after the credential.
    pub raw_payload: String,
    /// Payload pairs in wire order.
    pub pairs: Vec<KeyValuePair>,
}

/// Splits a raw request target into route, credential and payload pairs.
///
/// # Errors
///
/// Returns [`IngestError::InvalidRequestShape`] when the `?api_key=` marker
/// or the `&` after the credential is missing, the credential is invalid,
/// or the payload is empty. Returns [`IngestError::InvalidPair`] when a
/// payload token is not exactly one non-empty `key=value` pair.
pub fn split_request(target: &str) -> Result<IngestRequest, IngestError> {
    let Some((route, rest)) = target.split_once(API_KEY_MARKER) else {
        return Err(IngestError::InvalidRequestShape(
            "missing api_key parameter".to_string(),
        ));
    };
    let Some((api_key, payload)) = rest.split_once('&') else {
        return Err(IngestError::InvalidRequestShape(
            "missing payload after api_key".to_string(),
        ));
    };
    let credential = HardwareCredential::parse(api_key)?;
    if payload.is_empty() {
        return Err(IngestError::InvalidRequestShape(
            "empty payload".to_string(),
        ));
    }

    Ok(IngestRequest {
        route: route.to_string(),
        credential,
        raw_payload: payload.to_string(),
        pairs: split_pairs(payload)?,
    })
}

/// Splits an `&`-joined payload into ordered pairs.
///
/// # Errors
///
/// Returns [`IngestError::InvalidPair`] for any token that does not contain
/// exactly one `=` with non-empty key and value.
pub fn split_pairs(payload: &str) -> Result<Vec<KeyValuePair>, IngestError> {
    payload
        .split('&')
        .map(|token| {
            let mut parts = token.split('=');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) if !key.is_empty() && !value.is_empty() => {
                    Ok(KeyValuePair::new(key, value))
                }
                _ => Err(IngestError::InvalidPair(token.to_string())),
            }
        })
        .collect()
}

/// Returns `target` with the user token masked, for logging.
#[must_use]
pub fn redact_target(target: &str) -> String {
    let Some((route, rest)) = target.split_once(API_KEY_MARKER) else {
        return target.to_string();
    };
    let (api_key, payload) = rest.split_once('&').unwrap_or((rest, ""));
    let api_key = match api_key.split_once(':') {
        Some((hardware, user)) => format!("{hardware}:{}", mask(user)),
        None => api_key.to_string(),
    };
    if payload.is_empty() {
        format!("{route}{API_KEY_MARKER}{api_key}")
    } else {
        format!("{route}{API_KEY_MARKER}{api_key}&{payload}")
    }
}

fn mask(token: &str) -> String {
    let visible: String = token
        .chars()
        .skip(token.chars().count().saturating_sub(4))
        .collect();
    format!("****{visible}")
}
