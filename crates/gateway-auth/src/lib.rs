//! Gateway Authentication and Authorization
//!
//! This crate provides signed-token authentication and role-based
//! route authorization for the gateway: token issuing and verification,
//! the route policy table, and the request filter chain that runs the
//! login and authorization stages.

pub mod authenticator;
pub mod chain;
pub mod error;
pub mod identity;
pub mod jwt;
pub mod login;
pub mod middleware;
pub mod password;
pub mod path;
pub mod policy;

pub use authenticator::{CredentialAuthenticator, DatabaseAuthenticator};
pub use chain::{filter_chain_middleware, FilterChain, RequestStage, StageOutcome};
pub use error::AuthError;
pub use identity::{Identity, Principal};
pub use jwt::{Claims, KeyProvider, SigningKey, TokenConfig, TokenKind, TokenService};
pub use login::{LoginRequest, LoginStage, TokenPairResponse};
pub use middleware::{extract_bearer_token, AuthorizationStage};
pub use password::{hash_password, verify_password};
pub use path::{normalize_path, normalize_path_middleware};
pub use policy::{Requirement, RoutePolicy, RouteRule};
