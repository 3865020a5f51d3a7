//! Unverified decoding of ID token claims.
//!
//! The backend signs every token; the client only reads the claims it needs
//! for bookkeeping (subject for reauthentication checks, lifetime for expiry).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value};

/// Claims read from an ID token payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedToken {
    pub sub: Option<String>,
    pub iat: Option<i64>,
    pub exp: Option<i64>,
    pub sign_in_provider: Option<String>,
    pub claims: Map<String, Value>,
}

impl ParsedToken {
    /// Token lifetime in seconds (`exp - iat`), when both claims are present.
    pub fn lifetime_secs(&self) -> Option<i64> {
        match (self.iat, self.exp) {
            (Some(iat), Some(exp)) if exp >= iat => Some(exp - iat),
            _ => None,
        }
    }
}

/// Decodes the payload segment of a JWT. Returns `None` for malformed tokens.
pub fn parse_token(token: &str) -> Option<ParsedToken> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        log::debug!("JWT malformed, expected three segments");
        return None;
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('=').as_bytes())
        .ok()?;
    let claims = match serde_json::from_slice::<Value>(&bytes).ok()? {
        Value::Object(map) => map,
        _ => return None,
    };

    let sign_in_provider = claims
        .get("firebase")
        .and_then(|firebase| firebase.get("sign_in_provider"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(ParsedToken {
        sub: claims.get("sub").and_then(Value::as_str).map(str::to_string),
        iat: claims.get("iat").and_then(value_as_i64),
        exp: claims.get("exp").and_then(value_as_i64),
        sign_in_provider,
        claims,
    })
}

/// Lifetime of the token in seconds, used when a server response omits `expiresIn`.
pub fn token_expires_in(token: &str) -> Option<i64> {
    parse_token(token).and_then(|parsed| parsed.lifetime_secs())
}

fn value_as_i64(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_u64().map(|v| v as i64))
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}
