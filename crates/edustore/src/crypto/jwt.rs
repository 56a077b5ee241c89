// JWT: HS256 sign/verify using the `jsonwebtoken` crate.
//
// The payload is flattened next to the registered `iat`/`exp` claims.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use edustore_core::error::EduStoreError;

/// Sign `payload` with HS256, valid for `expires_in_secs` from now.
pub fn sign_jwt<T: Serialize>(
    payload: &T,
    secret: &str,
    expires_in_secs: u64,
) -> Result<String, EduStoreError> {
    let now = chrono::Utc::now().timestamp() as u64;

    let claims = JwtClaims {
        payload: serde_json::to_value(payload).map_err(|e| {
            EduStoreError::Serialization(format!("Failed to serialize JWT payload: {e}"))
        })?,
        iat: now,
        exp: now + expires_in_secs,
    };

    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());

    jsonwebtoken::encode(&header, &claims, &key)
        .map_err(|e| EduStoreError::Other(format!("JWT signing failed: {e}")))
}

/// Verify an HS256 token and decode its payload.
///
/// Returns `None` if the signature, expiry or payload shape is wrong.
pub fn verify_jwt<T: DeserializeOwned>(token: &str, secret: &str) -> Option<T> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.required_spec_claims.clear();
    validation.required_spec_claims.insert("exp".to_string());

    let token_data = jsonwebtoken::decode::<JwtClaims>(token, &key, &validation).ok()?;
    serde_json::from_value(token_data.claims.payload).ok()
}

#[derive(Debug, Serialize, Deserialize)]
struct JwtClaims {
    #[serde(flatten)]
    payload: serde_json::Value,
    iat: u64,
    exp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestPayload {
        id: String,
        role: String,
    }

    fn payload() -> TestPayload {
        TestPayload {
            id: "user123".into(),
            role: "ADMIN".into(),
        }
    }

    #[test]
    fn test_sign_and_verify() {
        let token = sign_jwt(&payload(), "test-secret-key", 3600).unwrap();
        let decoded: Option<TestPayload> = verify_jwt(&token, "test-secret-key");
        assert_eq!(decoded, Some(payload()));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let token = sign_jwt(&payload(), "correct-secret", 3600).unwrap();
        let decoded: Option<TestPayload> = verify_jwt(&token, "wrong-secret");
        assert!(decoded.is_none());
    }

    #[test]
    fn test_expired_token_fails() {
        // Past the library's default 60 second leeway.
        let claims = serde_json::json!({
            "id": "user123",
            "role": "ADMIN",
            "iat": 1_000,
            "exp": 2_000,
        });
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        let decoded: Option<TestPayload> = verify_jwt(&token, "secret");
        assert!(decoded.is_none());
    }

    #[test]
    fn test_token_without_exp_is_rejected() {
        let claims = serde_json::json!({ "id": "user123", "role": "ADMIN" });
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        let decoded: Option<TestPayload> = verify_jwt(&token, "secret");
        assert!(decoded.is_none());
    }
}
