use axum::http::StatusCode;
use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorMessage, HttpError};

/// Standard JWT claims: sub carries the user id.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
}

pub fn create_token(
    user_id: &str,
    secret: &[u8],
    expires_in_seconds: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    if user_id.is_empty() {
        return Err(jsonwebtoken::errors::ErrorKind::InvalidSubject.into());
    }

    let now = Utc::now();
    let iat = now.timestamp() as usize;
    let exp = (now + Duration::seconds(expires_in_seconds)).timestamp() as usize;
    let claims = TokenClaims {
        sub: user_id.to_string(),
        iat,
        exp,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret),
    )
}

/// Decodes a token and returns its subject (the user id).
/// Signature and expiry checks both live in `Validation::new`.
pub fn decode_token<T: Into<String>>(token: T, secret: &[u8]) -> Result<String, HttpError> {
    let decoded = decode::<TokenClaims>(
        &token.into(),
        &DecodingKey::from_secret(secret),
        &Validation::new(Algorithm::HS256),
    );

    match decoded {
        Ok(token) => Ok(token.claims.sub),
        Err(_) => Err(HttpError::new(
            ErrorMessage::InvalidToken.to_string(),
            StatusCode::UNAUTHORIZED,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"token-test-secret";

    #[test]
    fn token_round_trips_to_the_same_subject() {
        let token = create_token("1d8eac08-4bd4-4aa2-a12c-6b82b0a71a51", SECRET, 3600).unwrap();
        let sub = decode_token(token, SECRET).unwrap();
        assert_eq!(sub, "1d8eac08-4bd4-4aa2-a12c-6b82b0a71a51");
    }

    #[test]
    fn empty_subject_is_rejected_at_creation() {
        assert!(create_token("", SECRET, 3600).is_err());
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let token = create_token("someone", SECRET, 3600).unwrap();
        let result = decode_token(token, b"a-different-secret");
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().status,
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn tampered_token_fails_verification() {
        let token = create_token("someone", SECRET, 3600).unwrap();
        let mut tampered = token.clone();
        tampered.pop();
        tampered.push(if token.ends_with('A') { 'B' } else { 'A' });
        assert!(decode_token(tampered, SECRET).is_err());
    }

    #[test]
    fn expired_token_fails_verification() {
        // Well past the default validation leeway.
        let token = create_token("someone", SECRET, -3600).unwrap();
        assert!(decode_token(token, SECRET).is_err());
    }
}
