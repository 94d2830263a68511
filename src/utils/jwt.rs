use crate::entities::UserRole;
use crate::error::{AppError, AppResult};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub email: String,
    pub role: UserRole,
    pub exp: i64,
    pub iat: i64,
    pub token_type: String, // "access" or "refresh"
}

impl Claims {
    pub fn user_id(&self) -> AppResult<i64> {
        self.sub
            .parse()
            .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))
    }
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expires_in: i64,
    refresh_token_expires_in: i64,
}

impl JwtService {
    pub fn new(secret: &str, access_expires_in: i64, refresh_expires_in: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_token_expires_in: access_expires_in,
            refresh_token_expires_in: refresh_expires_in,
        }
    }

    fn generate(
        &self,
        user_id: i64,
        email: &str,
        role: UserRole,
        token_type: &str,
        expires_in: i64,
    ) -> AppResult<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(expires_in);

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            token_type: token_type.to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(AppError::JwtError)
    }

    pub fn generate_access_token(&self, user_id: i64, email: &str, role: UserRole) -> AppResult<String> {
        self.generate(user_id, email, role, "access", self.access_token_expires_in)
    }

    pub fn generate_refresh_token(&self, user_id: i64, email: &str, role: UserRole) -> AppResult<String> {
        self.generate(user_id, email, role, "refresh", self.refresh_token_expires_in)
    }

    pub fn verify_token(&self, token: &str) -> AppResult<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(AppError::JwtError)
    }

    pub fn verify_access_token(&self, token: &str) -> AppResult<Claims> {
        let claims = self.verify_token(token)?;

        if claims.token_type != "access" {
            return Err(AppError::AuthError("Invalid access token type".to_string()));
        }

        Ok(claims)
    }

    pub fn verify_refresh_token(&self, token: &str) -> AppResult<Claims> {
        let claims = self.verify_token(token)?;

        if claims.token_type != "refresh" {
            return Err(AppError::AuthError("Invalid refresh token type".to_string()));
        }

        Ok(claims)
    }

    pub fn get_access_token_expires_in(&self) -> i64 {
        self.access_token_expires_in
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_round_trip() {
        let jwt = JwtService::new("test-secret", 3600, 7200);
        let token = jwt.generate_access_token(42, "t@school.org", UserRole::Admin).unwrap();
        let claims = jwt.verify_access_token(&token).unwrap();
        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.role, UserRole::Admin);
        assert_eq!(claims.email, "t@school.org");
    }

    #[test]
    fn test_token_types_are_not_interchangeable() {
        let jwt = JwtService::new("test-secret", 3600, 7200);
        let refresh = jwt.generate_refresh_token(1, "a@b.c", UserRole::Teacher).unwrap();
        assert!(jwt.verify_access_token(&refresh).is_err());
        assert!(jwt.verify_refresh_token(&refresh).is_ok());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let a = JwtService::new("secret-a", 3600, 7200);
        let b = JwtService::new("secret-b", 3600, 7200);
        let token = a.generate_access_token(1, "a@b.c", UserRole::Teacher).unwrap();
        assert!(b.verify_access_token(&token).is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        // 默认 leeway 为 60 秒
        let jwt = JwtService::new("test-secret", -120, 7200);
        let token = jwt.generate_access_token(1, "a@b.c", UserRole::Teacher).unwrap();
        assert!(jwt.verify_access_token(&token).is_err());
    }
}
