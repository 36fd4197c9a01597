use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use posledger_core::{BranchId, UserId};

use crate::{Caller, Role};

/// JWT claims model (transport-agnostic).
///
/// The identity provider issues these after login; this crate only verifies
/// them and turns them into a [`Caller`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject / staff user identifier.
    pub sub: UserId,

    pub role: Role,

    /// Assigned branch; absent for global staff.
    #[serde(default)]
    pub branch_id: Option<BranchId>,

    #[serde(default)]
    pub is_superuser: bool,

    /// Issued-at timestamp.
    pub issued_at: DateTime<Utc>,

    /// Expiration timestamp.
    pub expires_at: DateTime<Utc>,
}

impl JwtClaims {
    pub fn caller(&self) -> Caller {
        Caller {
            user_id: self.sub,
            role: self.role,
            branch_id: self.branch_id,
            is_superuser: self.is_superuser,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("malformed or unsigned token: {0}")]
    Malformed(String),
}

/// Deterministically validate JWT claims.
///
/// Note: this validates the *claims* only. Signature verification happens in
/// the [`JwtValidator`] implementation.
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

/// Verifies a bearer token and yields its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError>;
}

/// HMAC-SHA256 validator over a shared secret.
#[derive(Clone)]
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // The claim window uses `issued_at`/`expires_at` and is checked by
        // `validate_claims`, not the registered `exp` claim.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.key, &self.validation)
            .map_err(|e| TokenValidationError::Malformed(e.to_string()))?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

/// Sign claims with a shared secret (HS256).
///
/// Used by the dev token tooling and tests; production tokens come from the
/// identity provider.
pub fn sign_hs256(claims: &JwtClaims, secret: impl AsRef<[u8]>) -> Result<String, TokenValidationError> {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
    .map_err(|e| TokenValidationError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claims(now: DateTime<Utc>) -> JwtClaims {
        JwtClaims {
            sub: UserId::new(1),
            role: Role::Counter,
            branch_id: Some(BranchId::new(4)),
            is_superuser: false,
            issued_at: now - Duration::minutes(1),
            expires_at: now + Duration::minutes(10),
        }
    }

    #[test]
    fn round_trips_through_hs256() {
        let now = Utc::now();
        let token = sign_hs256(&claims(now), "secret").unwrap();
        let decoded = Hs256JwtValidator::new("secret").validate(&token, now).unwrap();
        assert_eq!(decoded.caller().branch_id, Some(BranchId::new(4)));
        assert_eq!(decoded.caller().effective_role(), Role::Counter);
    }

    #[test]
    fn rejects_wrong_secret() {
        let now = Utc::now();
        let token = sign_hs256(&claims(now), "secret").unwrap();
        let err = Hs256JwtValidator::new("other").validate(&token, now).unwrap_err();
        assert!(matches!(err, TokenValidationError::Malformed(_)));
    }

    #[test]
    fn rejects_expired_window() {
        let now = Utc::now();
        let token = sign_hs256(&claims(now), "secret").unwrap();
        let later = now + Duration::hours(1);
        assert_eq!(
            Hs256JwtValidator::new("secret").validate(&token, later),
            Err(TokenValidationError::Expired)
        );
    }

    #[test]
    fn rejects_inverted_window() {
        let now = Utc::now();
        let mut c = claims(now);
        c.expires_at = c.issued_at;
        assert_eq!(validate_claims(&c, now), Err(TokenValidationError::InvalidTimeWindow));
    }
}
