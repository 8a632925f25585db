//! JWT access token issuance and verification.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use jwt_simple::prelude::*;
use uuid::Uuid;

use crate::config::JwtConfig;

/// HMAC algorithms accepted for `JWT_ALGORITHM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenAlgorithm {
    HS256,
    HS384,
    HS512,
}

impl FromStr for TokenAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HS256" => Ok(TokenAlgorithm::HS256),
            "HS384" => Ok(TokenAlgorithm::HS384),
            "HS512" => Ok(TokenAlgorithm::HS512),
            other => Err(format!(
                "unsupported algorithm {}, expected HS256, HS384 or HS512",
                other
            )),
        }
    }
}

impl fmt::Display for TokenAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenAlgorithm::HS256 => "HS256",
            TokenAlgorithm::HS384 => "HS384",
            TokenAlgorithm::HS512 => "HS512",
        };
        f.write_str(name)
    }
}

enum SigningKey {
    HS256(HS256Key),
    HS384(HS384Key),
    HS512(HS512Key),
}

impl SigningKey {
    fn new(algorithm: TokenAlgorithm, secret: &[u8]) -> Self {
        match algorithm {
            TokenAlgorithm::HS256 => SigningKey::HS256(HS256Key::from_bytes(secret)),
            TokenAlgorithm::HS384 => SigningKey::HS384(HS384Key::from_bytes(secret)),
            TokenAlgorithm::HS512 => SigningKey::HS512(HS512Key::from_bytes(secret)),
        }
    }

    fn sign(&self, claims: JWTClaims<NoCustomClaims>) -> Result<String, jwt_simple::Error> {
        match self {
            SigningKey::HS256(key) => key.authenticate(claims),
            SigningKey::HS384(key) => key.authenticate(claims),
            SigningKey::HS512(key) => key.authenticate(claims),
        }
    }

    fn verify(
        &self,
        token: &str,
        options: VerificationOptions,
    ) -> Result<JWTClaims<NoCustomClaims>, jwt_simple::Error> {
        match self {
            SigningKey::HS256(key) => key.verify_token::<NoCustomClaims>(token, Some(options)),
            SigningKey::HS384(key) => key.verify_token::<NoCustomClaims>(token, Some(options)),
            SigningKey::HS512(key) => key.verify_token::<NoCustomClaims>(token, Some(options)),
        }
    }
}

/// Verified access token contents. `sub` holds the user id.
#[derive(Debug, Clone)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

#[derive(Clone)]
pub struct JwtService {
    key: Arc<SigningKey>,
    pub algorithm: TokenAlgorithm,
    pub access_token_expiry: u64,
    pub issuer: Option<String>,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            key: Arc::new(SigningKey::new(config.algorithm, config.secret.as_bytes())),
            algorithm: config.algorithm,
            access_token_expiry: config.access_token_expiry_secs,
            issuer: config.issuer.clone(),
        }
    }

    pub fn generate_access_token(&self, user_id: Uuid) -> Result<String, jwt_simple::Error> {
        let mut claims = jwt_simple::claims::Claims::create(Duration::from_secs(
            self.access_token_expiry,
        ))
        .with_subject(user_id.to_string());

        if let Some(issuer) = &self.issuer {
            claims = claims.with_issuer(issuer);
        }

        self.key.sign(claims)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, jwt_simple::Error> {
        let mut options = VerificationOptions::default();
        if let Some(issuer) = &self.issuer {
            options.allowed_issuers = Some(HashSet::from([issuer.clone()]));
        }

        let token_data = self.key.verify(token, options)?;

        Ok(Claims {
            sub: token_data.subject.unwrap_or_default(),
            exp: token_data
                .expires_at
                .map(|t| t.as_secs() as i64)
                .unwrap_or(0),
            iat: token_data
                .issued_at
                .map(|t| t.as_secs() as i64)
                .unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret-unit-test-secret";
    const OTHER_SECRET: &str = "another-secret-another-secret-xx";
    const SHARED_SECRET: &str = "shared-secret-shared-secret-shared";

    fn jwt_config(algorithm: TokenAlgorithm, secret: &str) -> JwtConfig {
        JwtConfig {
            secret: secret.to_string(),
            algorithm,
            access_token_expiry_secs: 604_800,
            issuer: None,
        }
    }

    fn test_service() -> JwtService {
        JwtService::new(&jwt_config(TokenAlgorithm::HS256, SECRET))
    }

    #[test]
    fn test_generate_and_verify_access_token() {
        let service = test_service();
        let user_id = Uuid::new_v4();

        let token = service
            .generate_access_token(user_id)
            .expect("Token generation should succeed");

        let claims = service
            .verify_access_token(&token)
            .expect("Token verification should succeed");

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.user_id(), Some(user_id));
        assert_eq!(claims.exp - claims.iat, 604_800);
    }

    #[test]
    fn test_invalid_token_fails_verification() {
        let service = test_service();
        assert!(service.verify_access_token("invalid.token.here").is_err());
    }

    #[test]
    fn test_wrong_secret_fails_verification() {
        let service1 = test_service();
        let service2 = JwtService::new(&jwt_config(TokenAlgorithm::HS256, OTHER_SECRET));

        let token = service1.generate_access_token(Uuid::new_v4()).unwrap();
        assert!(service2.verify_access_token(&token).is_err());
    }

    #[test]
    fn test_algorithm_mismatch_fails_verification() {
        let hs256 = JwtService::new(&jwt_config(TokenAlgorithm::HS256, SHARED_SECRET));
        let hs512 = JwtService::new(&jwt_config(TokenAlgorithm::HS512, SHARED_SECRET));

        let token = hs512.generate_access_token(Uuid::new_v4()).unwrap();
        assert!(hs512.verify_access_token(&token).is_ok());
        assert!(hs256.verify_access_token(&token).is_err());
    }

    #[test]
    fn test_issuer_is_enforced() {
        let mut config = jwt_config(TokenAlgorithm::HS256, SHARED_SECRET);
        let untagged = JwtService::new(&config);
        config.issuer = Some("issuehub".to_string());
        let tagged = JwtService::new(&config);

        let token = untagged.generate_access_token(Uuid::new_v4()).unwrap();
        assert!(tagged.verify_access_token(&token).is_err());

        let token = tagged.generate_access_token(Uuid::new_v4()).unwrap();
        assert!(tagged.verify_access_token(&token).is_ok());
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("hs384".parse::<TokenAlgorithm>(), Ok(TokenAlgorithm::HS384));
        assert_eq!(TokenAlgorithm::HS512.to_string(), "HS512");
        assert!("RS256".parse::<TokenAlgorithm>().is_err());
    }
}
