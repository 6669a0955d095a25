//! Bearer token inspection

use chrono::Utc;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::errors::ConsoleError;

/// Claims read from a session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user ID)
    #[serde(default)]
    pub sub: Option<String>,

    /// Expiration timestamp
    #[serde(default)]
    pub exp: Option<i64>,
}

/// What the gateway knows about the credential it is about to send.
/// Logged with every request, since a 401 can have any of these causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Missing,
    /// Not a three-segment token; never sent
    Malformed,
    /// Well formed but past its `exp`; still sent, the server decides
    Expired,
    Valid,
}

impl CredentialState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialState::Missing => "missing",
            CredentialState::Malformed => "malformed",
            CredentialState::Expired => "expired",
            CredentialState::Valid => "valid",
        }
    }

    /// Whether a bearer header is attached for this credential
    pub fn is_attachable(&self) -> bool {
        matches!(self, CredentialState::Expired | CredentialState::Valid)
    }
}

/// Three non-empty dot-delimited base64url segments
pub fn is_well_formed(raw: &str) -> bool {
    let segments: Vec<&str> = raw.split('.').collect();
    segments.len() == 3
        && segments.iter().all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '=')
        })
}

/// Decode the claims without verifying the signature; the client holds no key
pub fn decode_claims(raw: &str) -> Result<TokenClaims, ConsoleError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let token_data = decode::<TokenClaims>(raw, &DecodingKey::from_secret(b""), &validation)
        .map_err(|e| ConsoleError::TokenError(format!("Failed to decode token: {}", e)))?;
    Ok(token_data.claims)
}

/// Classify a credential
pub fn inspect(raw: Option<&str>) -> CredentialState {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return CredentialState::Missing;
    };
    if !is_well_formed(raw) {
        return CredentialState::Malformed;
    }
    match decode_claims(raw) {
        Ok(TokenClaims { exp: Some(exp), .. }) if exp < Utc::now().timestamp() => {
            CredentialState::Expired
        }
        Ok(_) => CredentialState::Valid,
        // right shape but undecodable payload
        Err(_) => CredentialState::Malformed,
    }
}
