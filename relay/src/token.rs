//! Doc token handling.
//!
//! The editor hands out JWT-shaped doc tokens. The relay only peeks into
//! their payload to enrich notifications; it never verifies the signature,
//! so nothing read from a doc token may be used to make an access decision.
use crate::metadata::{FileId, value_to_string};
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::{Engine as _, alphabet};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Map, Value};

// Standard alphabet after translating the url-safe characters. Padding is
// optional, as it is stripped from JWT segments.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

#[derive(thiserror::Error, Debug)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Decodes the payload of a JWT-shaped token without checking its signature.
///
/// Returns `None` unless the token has exactly three segments and the middle
/// one is a base64 encoded JSON object.
pub fn decode(token: &str) -> Option<Map<String, Value>> {
    let segments: Vec<&str> = token.split('.').collect();
    let [_, payload, _] = segments.as_slice() else {
        return None;
    };

    let translated: String = payload
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();

    let bytes = PAYLOAD_ENGINE.decode(translated).ok()?;
    match serde_json::from_slice(&bytes).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Signs `payload` as a compact HS256 JWT.
pub fn sign(payload: &Value, secret: &str) -> Result<String, TokenError> {
    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());
    Ok(jsonwebtoken::encode(&header, payload, &key)?)
}

/// Identifiers harvested from a doc token payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocClaims {
    pub file_path: Option<String>,
    pub file_id: Option<FileId>,
    pub owner_id: Option<String>,
    pub user_id: Option<String>,
}

impl DocClaims {
    pub fn from_payload(payload: &Map<String, Value>) -> Self {
        DocClaims {
            file_path: payload.get("filePath").and_then(value_to_string),
            file_id: payload.get("fileId").and_then(FileId::from_value),
            owner_id: payload.get("ownerId").and_then(value_to_string),
            user_id: payload.get("userId").and_then(value_to_string),
        }
    }

    /// Claims from `token`, or empty claims when it cannot be decoded.
    pub fn from_token(token: &str) -> Self {
        match decode(token) {
            Some(payload) => Self::from_payload(&payload),
            None => {
                tracing::debug!("doc token could not be decoded");
                DocClaims::default()
            }
        }
    }
}
