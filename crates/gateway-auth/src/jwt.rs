//! JWT token management
//!
//! Access and refresh tokens share one claim layout and differ only in
//! lifetime and signing secret.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AuthError;
use crate::identity::Identity;

/// Default access token lifetime (15 minutes)
pub const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;
/// Default refresh token lifetime (7 days)
pub const REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 3600;

/// JWT claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (email)
    pub sub: String,
    /// Issuer (user ID)
    pub iss: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Primary role
    pub role: String,
}

/// Token kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// Signing and verification key bound to one secret
pub struct SigningKey {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SigningKey {
    fn new(algorithm: Algorithm, secret: &str) -> Self {
        Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Resolves secrets to signing keys, caching one key per secret
pub struct KeyProvider {
    algorithm: Algorithm,
    cache: RwLock<HashMap<String, Arc<SigningKey>>>,
}

impl KeyProvider {
    /// Create a provider for an HMAC algorithm
    pub fn new(algorithm: Algorithm) -> Result<Self, AuthError> {
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(AuthError::Configuration(format!(
                "unsupported signing algorithm {:?}, expected HS256, HS384 or HS512",
                algorithm
            )));
        }

        Ok(Self {
            algorithm,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Resolve a secret to its key
    pub fn resolve(&self, secret: &str) -> Arc<SigningKey> {
        if let Some(key) = self.cache.read().get(secret) {
            return key.clone();
        }

        let mut cache = self.cache.write();
        cache
            .entry(secret.to_string())
            .or_insert_with(|| Arc::new(SigningKey::new(self.algorithm, secret)))
            .clone()
    }

    /// Number of cached keys
    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }
}

/// Token service settings
#[derive(Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub algorithm: Algorithm,
}

impl TokenConfig {
    /// Settings with the default lifetimes and HS256
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl: Duration::seconds(ACCESS_TOKEN_TTL_SECS),
            refresh_ttl: Duration::seconds(REFRESH_TOKEN_TTL_SECS),
            algorithm: Algorithm::HS256,
        }
    }

    fn validate(&self) -> Result<(), AuthError> {
        if self.access_secret.is_empty() || self.refresh_secret.is_empty() {
            return Err(AuthError::Configuration(
                "token secrets cannot be empty".to_string(),
            ));
        }
        if self.access_secret == self.refresh_secret {
            return Err(AuthError::Configuration(
                "access and refresh token secrets must differ".to_string(),
            ));
        }
        if self.access_ttl <= Duration::zero() || self.refresh_ttl <= Duration::zero() {
            return Err(AuthError::Configuration(
                "token lifetimes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Issues and verifies access and refresh tokens
#[derive(Clone)]
pub struct TokenService {
    keys: Arc<KeyProvider>,
    config: TokenConfig,
}

impl TokenService {
    /// Create a token service, resolving both keys up front
    pub fn new(config: TokenConfig) -> Result<Self, AuthError> {
        config.validate()?;

        let keys = Arc::new(KeyProvider::new(config.algorithm)?);
        keys.resolve(&config.access_secret);
        keys.resolve(&config.refresh_secret);

        Ok(Self { keys, config })
    }

    /// Lifetime of tokens of the given kind
    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.config.access_ttl,
            TokenKind::Refresh => self.config.refresh_ttl,
        }
    }

    fn key(&self, kind: TokenKind) -> Arc<SigningKey> {
        let secret = match kind {
            TokenKind::Access => &self.config.access_secret,
            TokenKind::Refresh => &self.config.refresh_secret,
        };
        self.keys.resolve(secret)
    }

    /// Issue a short-lived access token
    pub fn issue_access(&self, identity: &Identity) -> Result<String, AuthError> {
        self.issue(TokenKind::Access, identity)
    }

    /// Issue a long-lived refresh token
    pub fn issue_refresh(&self, identity: &Identity) -> Result<String, AuthError> {
        self.issue(TokenKind::Refresh, identity)
    }

    fn issue(&self, kind: TokenKind, identity: &Identity) -> Result<String, AuthError> {
        let role = identity.primary_role().ok_or(AuthError::MissingRole)?;
        let exp = Utc::now() + self.ttl(kind);

        let claims = Claims {
            sub: identity.email.clone(),
            iss: identity.id.to_string(),
            exp: exp.timestamp(),
            role: role.to_string(),
        };

        debug!("Issuing {} token for {}", kind.as_str(), identity.email);

        self.sign(kind, &claims)
    }

    pub(crate) fn sign(&self, kind: TokenKind, claims: &Claims) -> Result<String, AuthError> {
        let key = self.key(kind);
        encode(&Header::new(key.algorithm()), claims, &key.encoding_key).map_err(AuthError::Signing)
    }

    /// Verify an access token and rebuild its identity
    pub fn verify_access(&self, token: &str) -> Result<Identity, AuthError> {
        self.verify(TokenKind::Access, token)
    }

    /// Verify a refresh token and rebuild its identity
    pub fn verify_refresh(&self, token: &str) -> Result<Identity, AuthError> {
        self.verify(TokenKind::Refresh, token)
    }

    fn verify(&self, kind: TokenKind, token: &str) -> Result<Identity, AuthError> {
        let key = self.key(kind);

        let mut validation = Validation::new(key.algorithm());
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        let claims = decode::<Claims>(token, &key.decoding_key, &validation)
            .map_err(|e| {
                let err = match e.kind() {
                    ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    ErrorKind::InvalidSignature => AuthError::TokenSignatureInvalid,
                    _ => AuthError::TokenMalformed,
                };
                warn!("Rejected {} token: {} ({})", kind.as_str(), err, e);
                err
            })?
            .claims;

        let id = Uuid::parse_str(&claims.iss).map_err(|e| {
            warn!("Rejected {} token: issuer is not a UUID ({})", kind.as_str(), e);
            AuthError::TokenMalformed
        })?;

        if claims.role.is_empty() {
            warn!("Rejected {} token: empty role claim", kind.as_str());
            return Err(AuthError::TokenMalformed);
        }

        Ok(Identity::new(claims.sub, id, vec![claims.role]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(TokenConfig::new("access-secret", "refresh-secret")).unwrap()
    }

    fn student() -> Identity {
        Identity::new(
            "a@x.com",
            Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap(),
            vec!["STUDENT".to_string()],
        )
    }

    #[test]
    fn test_access_round_trip() {
        let tokens = service();
        let identity = student();

        let token = tokens.issue_access(&identity).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let verified = tokens.verify_access(&token).unwrap();
        assert_eq!(verified.email, "a@x.com");
        assert_eq!(verified.id, identity.id);
        assert_eq!(verified.roles, vec!["STUDENT"]);
    }

    #[test]
    fn test_refresh_round_trip() {
        let tokens = service();
        let token = tokens.issue_refresh(&student()).unwrap();
        let verified = tokens.verify_refresh(&token).unwrap();
        assert_eq!(verified, student());
    }

    #[test]
    fn test_only_primary_role_is_embedded() {
        let tokens = service();
        let identity = Identity::new(
            "multi@x.com",
            Uuid::new_v4(),
            vec!["ADMIN".to_string(), "STUDENT".to_string()],
        );

        let verified = tokens
            .verify_access(&tokens.issue_access(&identity).unwrap())
            .unwrap();
        assert_eq!(verified.roles, vec!["ADMIN"]);
    }

    #[test]
    fn test_kind_isolation() {
        let tokens = service();
        let identity = student();

        let refresh = tokens.issue_refresh(&identity).unwrap();
        assert!(matches!(
            tokens.verify_access(&refresh),
            Err(AuthError::TokenSignatureInvalid)
        ));

        let access = tokens.issue_access(&identity).unwrap();
        assert!(matches!(
            tokens.verify_refresh(&access),
            Err(AuthError::TokenSignatureInvalid)
        ));
    }

    #[test]
    fn test_expired_token() {
        let tokens = service();
        let claims = Claims {
            sub: "a@x.com".to_string(),
            iss: "11111111-1111-1111-1111-111111111111".to_string(),
            exp: Utc::now().timestamp() - 10,
            role: "STUDENT".to_string(),
        };

        let token = tokens.sign(TokenKind::Access, &claims).unwrap();
        assert!(matches!(tokens.verify_access(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_tampered_signature() {
        let tokens = service();
        let token = tokens.issue_access(&student()).unwrap();

        let (message, signature) = token.rsplit_once('.').unwrap();
        let mut chars: Vec<char> = signature.chars().collect();
        chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
        let tampered = format!("{}.{}", message, chars.into_iter().collect::<String>());

        assert!(matches!(
            tokens.verify_access(&tampered),
            Err(AuthError::TokenSignatureInvalid)
        ));
    }

    #[test]
    fn test_malformed_token() {
        let tokens = service();
        assert!(matches!(
            tokens.verify_access("invalid-token"),
            Err(AuthError::TokenMalformed)
        ));
        assert!(matches!(tokens.verify_access(""), Err(AuthError::TokenMalformed)));
    }

    #[test]
    fn test_non_uuid_issuer_rejected() {
        let tokens = service();
        let claims = Claims {
            sub: "a@x.com".to_string(),
            iss: "not-a-uuid".to_string(),
            exp: Utc::now().timestamp() + 60,
            role: "STUDENT".to_string(),
        };

        let token = tokens.sign(TokenKind::Access, &claims).unwrap();
        assert!(matches!(tokens.verify_access(&token), Err(AuthError::TokenMalformed)));
    }

    #[test]
    fn test_identity_without_role_cannot_be_issued() {
        let tokens = service();
        let identity = Identity::new("a@x.com", Uuid::new_v4(), vec![]);
        assert!(matches!(tokens.issue_access(&identity), Err(AuthError::MissingRole)));
    }

    #[test]
    fn test_shared_secret_rejected() {
        let result = TokenService::new(TokenConfig::new("same", "same"));
        assert!(matches!(result, Err(AuthError::Configuration(_))));

        let result = TokenService::new(TokenConfig::new("", "refresh"));
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_non_hmac_algorithm_rejected() {
        let mut config = TokenConfig::new("access", "refresh");
        config.algorithm = Algorithm::RS256;
        assert!(matches!(
            TokenService::new(config),
            Err(AuthError::Configuration(_))
        ));
    }

    #[test]
    fn test_key_provider_caches_per_secret() {
        let provider = KeyProvider::new(Algorithm::HS256).unwrap();

        let a = provider.resolve("secret-a");
        let again = provider.resolve("secret-a");
        let b = provider.resolve("secret-b");

        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(provider.cached(), 2);
    }

    #[test]
    fn test_same_secret_signs_identically() {
        let first = KeyProvider::new(Algorithm::HS256).unwrap();
        let second = KeyProvider::new(Algorithm::HS256).unwrap();
        let claims = Claims {
            sub: "a@x.com".to_string(),
            iss: Uuid::nil().to_string(),
            exp: 4_000_000_000,
            role: "STUDENT".to_string(),
        };

        let sign = |key: Arc<SigningKey>| {
            encode(&Header::new(key.algorithm()), &claims, &key.encoding_key).unwrap()
        };
        assert_eq!(sign(first.resolve("s")), sign(second.resolve("s")));
    }

    #[test]
    fn test_hs512_round_trip() {
        let mut config = TokenConfig::new("access", "refresh");
        config.algorithm = Algorithm::HS512;
        let tokens = TokenService::new(config).unwrap();

        let token = tokens.issue_access(&student()).unwrap();
        assert_eq!(tokens.verify_access(&token).unwrap().email, "a@x.com");
    }
}
