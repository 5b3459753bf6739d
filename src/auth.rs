//! Bearer token verification (§6): HMAC-SHA256, decoded into [`Claims`].

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Claims carried by the signalling bearer token.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Claims {
    pub user_id: String,
    pub room: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_type: Option<String>,
    /// Expiry, Unix seconds; validated by [`jsonwebtoken`] against `now`.
    pub exp: u64,
}

/// Verifies `token` against `secret` and returns its claims.
///
/// Rejects the upgrade before any `Peer`, `Room`, or media session is
/// allocated, per I-invariant "no state for an invalid token" (§8).
pub fn verify(token: &str, secret: &[u8]) -> Result<Claims, AuthError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret),
        &Validation::new(jsonwebtoken::Algorithm::HS256),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
        _ => AuthError::Malformed(e),
    })?;
    Ok(data.claims)
}

/// Extracts the bearer token from a query parameter or `Authorization`
/// header value, per §4.1.
pub fn extract_token<'a>(query_token: Option<&'a str>, auth_header: Option<&'a str>) -> Option<&'a str> {
    query_token.or_else(|| auth_header.and_then(|h| h.strip_prefix("Bearer ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn sign(secret: &[u8], room: &str, user_id: &str, exp: u64) -> String {
        let claims = Claims {
            user_id: user_id.into(),
            room: room.into(),
            email: None,
            user_type: None,
            exp,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    #[test]
    fn verifies_well_formed_token() {
        let secret = b"top-secret";
        let token = sign(secret, "r1", "a", 9_999_999_999);
        let claims = verify(&token, secret).unwrap();
        assert_eq!(claims.room, "r1");
        assert_eq!(claims.user_id, "a");
    }

    #[test]
    fn rejects_token_signed_by_wrong_key() {
        let token = sign(b"right-key", "r1", "a", 9_999_999_999);
        let err = verify(&token, b"wrong-key").unwrap_err();
        assert!(matches!(err, AuthError::Malformed(_)));
    }

    #[test]
    fn rejects_expired_token() {
        let secret = b"top-secret";
        let token = sign(secret, "r1", "a", 1);
        let err = verify(&token, secret).unwrap_err();
        assert!(matches!(err, AuthError::Expired));
    }

    #[test]
    fn extracts_token_from_query_before_header() {
        assert_eq!(
            extract_token(Some("q"), Some("Bearer h")),
            Some("q")
        );
        assert_eq!(extract_token(None, Some("Bearer h")), Some("h"));
        assert_eq!(extract_token(None, None), None);
    }
}
