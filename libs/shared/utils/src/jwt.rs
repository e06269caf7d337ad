use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use tracing::debug;
use shared_models::auth::JwtClaims;

/// Reads the claims section of a JWT without verifying the signature.
///
/// The client never holds the signing secret, so this is only used to avoid
/// presenting a token the server would reject anyway.
pub fn decode_claims(token: &str) -> Result<JwtClaims, String> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err("Invalid token format".to_string());
    }

    // Some issuers keep the padding; the URL-safe engine here does not accept it.
    let claims_b64 = parts[1].trim_end_matches('=');

    let claims_json = match URL_SAFE_NO_PAD.decode(claims_b64) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(json_str) => json_str,
            Err(_) => return Err("Invalid claims encoding".to_string()),
        },
        Err(e) => {
            debug!("Failed to decode claims: {}", e);
            return Err("Invalid claims encoding".to_string());
        }
    };

    serde_json::from_str::<JwtClaims>(&claims_json)
        .map_err(|e| format!("Invalid claims: {}", e))
}

/// True only when the token is a readable JWT whose `exp` lies in the past.
/// Opaque tokens are never considered expired here.
pub fn is_expired(token: &str) -> bool {
    match decode_claims(token) {
        Ok(JwtClaims { exp: Some(exp), .. }) => {
            let now = Utc::now().timestamp();
            if exp <= now {
                debug!("Token expired at {} (now {})", exp, now);
                true
            } else {
                false
            }
        }
        Ok(_) => false,
        Err(e) => {
            debug!("Token is not an inspectable JWT: {}", e);
            false
        }
    }
}
