pub(crate) use crate::auth::dto::{Claims, JwtKeys};
use crate::auth::dto::{LoginRequest, RegisterRequest};
use crate::auth::error::AuthError;
use crate::config::JwtConfig;
use crate::state::AppState;
use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::{async_trait, extract::{FromRef, FromRequestParts}, http::request::Parts};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use regex::Regex;
use std::time::Duration;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, error, warn};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Normalized registration input, validated and ready to hash and store.
#[derive(Debug)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
}

pub(crate) fn validate_register(payload: RegisterRequest) -> Result<NewUser, AuthError> {
    let name = payload.name.trim().to_string();
    let email = payload.email.trim().to_lowercase();
    let phone = payload.phone.trim().to_string();
    let password = payload.password;

    if name.is_empty() || email.is_empty() || phone.is_empty() || password.trim().is_empty() {
        return Err(AuthError::Validation("All fields are required".into()));
    }
    if !is_valid_email(&email) {
        return Err(AuthError::Validation("Invalid email".into()));
    }

    Ok(NewUser {
        name,
        email,
        phone,
        password,
    })
}

pub(crate) fn validate_login(payload: LoginRequest) -> Result<(String, String), AuthError> {
    let phone = payload.phone.trim().to_string();
    if phone.is_empty() || payload.password.trim().is_empty() {
        return Err(AuthError::Validation("Missing phone or password".into()));
    }
    Ok((phone, payload.password))
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// A digest that does not parse counts as a mismatch, not an error.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "malformed password hash");
            return false;
        }
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs((cfg.ttl_minutes as u64) * 60),
        }
    }

    pub fn sign(&self, user_id: i64) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::from_config(&state.config.jwt)
    }
}

/// Extracts and validates the bearer token, yielding the user ID.
pub struct AuthUser(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::InvalidToken)?;

        // Expect "Bearer <token>"
        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or(AuthError::InvalidToken)?;

        let claims = keys.verify(token).map_err(|_| {
            warn!("invalid or expired token");
            AuthError::InvalidToken
        })?;

        Ok(AuthUser(claims.sub))
    }
}

#[cfg(test)]
mod password_tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash));
    }

    #[test]
    fn verify_returns_false_on_malformed_hash() {
        assert!(!verify_password("anything", "not-a-valid-hash"));
        assert!(!verify_password("anything", ""));
    }

    #[test]
    fn hashes_are_salted() {
        let password = "pw";
        let first = hash_password(password).expect("hashing should succeed");
        let second = hash_password(password).expect("hashing should succeed");
        assert_ne!(first, second);
        assert_ne!(first, password);
        assert!(verify_password(password, &first));
        assert!(verify_password(password, &second));
    }
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    fn register_payload() -> RegisterRequest {
        RegisterRequest {
            name: "Ann".into(),
            email: "ann@x.com".into(),
            phone: "555".into(),
            password: "pw".into(),
        }
    }

    #[test]
    fn register_accepts_complete_payload() {
        let new_user = validate_register(register_payload()).expect("valid payload");
        assert_eq!(new_user.name, "Ann");
        assert_eq!(new_user.email, "ann@x.com");
        assert_eq!(new_user.phone, "555");
        assert_eq!(new_user.password, "pw");
    }

    #[test]
    fn register_rejects_missing_fields() {
        for field in ["name", "email", "phone", "password"] {
            let mut payload = register_payload();
            match field {
                "name" => payload.name = "".into(),
                "email" => payload.email = "  ".into(),
                "phone" => payload.phone = "".into(),
                _ => payload.password = "".into(),
            }
            let err = validate_register(payload).unwrap_err();
            assert!(matches!(err, AuthError::Validation(_)), "{field} should be required");
        }
    }

    #[test]
    fn register_normalizes_email_and_trims() {
        let payload = RegisterRequest {
            name: "  Ann  ".into(),
            email: " Ann@X.Com ".into(),
            phone: " 555 ".into(),
            password: "pw".into(),
        };
        let new_user = validate_register(payload).expect("valid payload");
        assert_eq!(new_user.name, "Ann");
        assert_eq!(new_user.email, "ann@x.com");
        assert_eq!(new_user.phone, "555");
    }

    #[test]
    fn register_rejects_invalid_email() {
        let mut payload = register_payload();
        payload.email = "not-an-email".into();
        let err = validate_register(payload).unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[test]
    fn login_requires_phone_and_password() {
        let err = validate_login(LoginRequest {
            phone: "".into(),
            password: "pw".into(),
        })
        .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));

        let err = validate_login(LoginRequest {
            phone: "555".into(),
            password: "".into(),
        })
        .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[test]
    fn login_trims_phone_only() {
        let (phone, password) = validate_login(LoginRequest {
            phone: " 555 ".into(),
            password: " pw ".into(),
        })
        .expect("valid payload");
        assert_eq!(phone, "555");
        assert_eq!(password, " pw ");
    }
}
