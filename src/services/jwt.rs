use jsonwebtoken::{encode, decode, Header, Validation, EncodingKey, DecodingKey};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;

use crate::models::Destination;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct Claims {
    pub sub: String,  // Verified mobile
    pub country_code: String,
    pub exp: i64,
    pub iat: i64,
}

pub struct JwtService;

impl JwtService {
    pub fn generate_access_token(destination: &Destination) -> Result<String, jsonwebtoken::errors::Error> {
        let secret = crate::config::Config::jwt_secret();
        let expiry = crate::config::Config::jwt_expiry();
        Self::encode_with(destination, &secret, expiry)
    }

    pub fn verify_token(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let secret = crate::config::Config::jwt_secret();
        Self::decode_with(token, &secret)
    }

    fn encode_with(destination: &Destination, secret: &str, expiry: i64) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp();

        let claims = Claims {
            sub: destination.mobile.clone(),
            country_code: destination.country_code.clone(),
            exp: now + expiry,
            iat: now,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    fn decode_with(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_destination() {
        let destination = Destination::new("9876543210", "+91");
        let token = JwtService::encode_with(&destination, "test-secret", 60).unwrap();

        let claims = JwtService::decode_with(&token, "test-secret").unwrap();
        assert_eq!(claims.sub, "9876543210");
        assert_eq!(claims.country_code, "+91");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let destination = Destination::new("9876543210", "+91");
        let token = JwtService::encode_with(&destination, "one", 60).unwrap();

        assert!(JwtService::decode_with(&token, "two").is_err());
    }
}
