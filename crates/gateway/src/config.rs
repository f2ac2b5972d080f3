//! Configuration loading and validation

use anyhow::{Context, Result, bail};
use axum::http::Method;
use gateway_auth::{Requirement, RoutePolicy, RouteRule, TokenConfig};
use gateway_proxy::UpstreamClientConfig;
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Environment variable prefix, e.g. `GATEWAY__AUTH__ACCESS_TOKEN_SECRET`
const ENV_PREFIX: &str = "GATEWAY";

/// Placeholder passwords refused for seed users
const PLACEHOLDER_PASSWORDS: &[&str] = &["change-me", "changeme", "password"];

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub upstreams: Vec<UpstreamConfig>,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

/// Token and login configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub access_token_secret: String,
    #[serde(default)]
    pub refresh_token_secret: String,
    #[serde(default = "default_access_ttl_minutes")]
    pub access_token_ttl_minutes: i64,
    #[serde(default = "default_refresh_ttl_days")]
    pub refresh_token_ttl_days: i64,
    /// HS256, HS384 or HS512
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Users created when the store is empty
    #[serde(default)]
    pub seed_users: Vec<SeedUser>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_secret: String::new(),
            refresh_token_secret: String::new(),
            access_token_ttl_minutes: default_access_ttl_minutes(),
            refresh_token_ttl_days: default_refresh_ttl_days(),
            algorithm: default_algorithm(),
            login_path: default_login_path(),
            seed_users: Vec::new(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_token_ttl_minutes", &self.access_token_ttl_minutes)
            .field("refresh_token_ttl_days", &self.refresh_token_ttl_days)
            .field("algorithm", &self.algorithm)
            .field("login_path", &self.login_path)
            .field("seed_users", &self.seed_users.len())
            .finish_non_exhaustive()
    }
}

/// A user to create on first start
#[derive(Clone, Serialize, Deserialize)]
pub struct SeedUser {
    pub email: String,
    pub password: String,
    pub roles: Vec<String>,
}

/// Route policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Requirement for routes no rule matches: `public` or a role name
    #[serde(default = "default_requirement")]
    pub default: String,
    #[serde(default = "default_rules")]
    pub rules: Vec<RuleConfig>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default: default_requirement(),
            rules: default_rules(),
        }
    }
}

/// One route rule; exactly one of `public` and `role` must be set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub method: Option<String>,
    pub pattern: String,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub role: Option<String>,
}

impl RuleConfig {
    fn public(method: Option<&str>, pattern: &str) -> Self {
        Self {
            method: method.map(str::to_string),
            pattern: pattern.to_string(),
            public: true,
            role: None,
        }
    }

    fn role(method: Option<&str>, pattern: &str, role: &str) -> Self {
        Self {
            method: method.map(str::to_string),
            pattern: pattern.to_string(),
            public: false,
            role: Some(role.to_string()),
        }
    }

    fn to_rule(&self) -> Result<RouteRule> {
        let method = self
            .method
            .as_deref()
            .map(|m| Method::from_str(&m.to_ascii_uppercase()))
            .transpose()
            .with_context(|| format!("Invalid method in rule for {}", self.pattern))?;

        match (self.public, self.role.as_deref()) {
            (true, None) => Ok(RouteRule::public(method, &self.pattern)),
            (false, Some(role)) if !role.is_empty() => {
                Ok(RouteRule::role(method, &self.pattern, role))
            }
            _ => bail!(
                "Rule for {} must set either public = true or a role",
                self.pattern
            ),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Upstream service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub name: String,
    /// Path prefix routed to this upstream
    pub prefix: String,
    pub url: String,
    #[serde(default)]
    pub strip_prefix: bool,
    #[serde(default = "default_upstream_timeout_secs")]
    pub timeout_secs: u64,
}

impl UpstreamConfig {
    pub fn client_config(&self) -> UpstreamClientConfig {
        UpstreamClientConfig {
            name: self.name.clone(),
            prefix: self.prefix.clone(),
            url: self.url.clone(),
            strip_prefix: self.strip_prefix,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Browser origin allowed to call the gateway with credentials
    #[serde(default)]
    pub allowed_origin: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_access_ttl_minutes() -> i64 {
    15
}

fn default_refresh_ttl_days() -> i64 {
    7
}

fn default_algorithm() -> String {
    "HS256".to_string()
}

fn default_login_path() -> String {
    gateway_auth::login::DEFAULT_LOGIN_PATH.to_string()
}

fn default_requirement() -> String {
    "public".to_string()
}

fn default_rules() -> Vec<RuleConfig> {
    vec![
        RuleConfig::public(None, "/api/login/**"),
        RuleConfig::public(None, "/api/refreshToken/**"),
        RuleConfig::public(None, "/api/core/tansiq/**"),
        RuleConfig::role(Some("POST"), "/api/core/studentFiles", "ADMIN"),
        RuleConfig::role(Some("GET"), "/api/core/admins/**", "ADMIN"),
        RuleConfig::role(None, "/api/core/students/**", "STUDENT"),
    ]
}

fn default_db_path() -> String {
    "data/gateway.db".to_string()
}

fn default_upstream_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Config {
    /// Load configuration from a file, overridden by `GATEWAY__*` variables
    ///
    /// A missing file is not an error; every section has defaults except
    /// the token secrets.
    pub fn load(path: &str) -> Result<Self> {
        let file_exists = Path::new(path).exists();

        let config: Config = ::config::Config::builder()
            .add_source(::config::File::from(Path::new(path)).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .with_context(|| format!("Failed to load configuration from {}", path))?;

        if file_exists {
            info!("Loaded configuration from {}", path);
        } else {
            info!("Config file not found at {}, using defaults and environment", path);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the settings that cannot be fixed at runtime
    pub fn validate(&self) -> Result<()> {
        self.token_config()?;
        self.route_policy()?;

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            bail!(
                "logging.format must be pretty or json, got {}",
                self.logging.format
            );
        }
        if !self.auth.login_path.starts_with('/') {
            bail!("auth.login_path must start with '/'");
        }

        for upstream in &self.upstreams {
            url::Url::parse(&upstream.url)
                .with_context(|| format!("Invalid URL for upstream {}", upstream.name))?;
            if upstream.timeout_secs == 0 {
                bail!("Upstream {} timeout must be positive", upstream.name);
            }
        }

        if let Some(origin) = &self.cors.allowed_origin {
            url::Url::parse(origin).with_context(|| format!("Invalid CORS origin {}", origin))?;
        }

        for user in &self.auth.seed_users {
            if user.email.trim().is_empty() || user.roles.is_empty() {
                bail!("Seed users need an email and at least one role");
            }
            let password = user.password.trim().to_ascii_lowercase();
            if password.is_empty() || PLACEHOLDER_PASSWORDS.contains(&password.as_str()) {
                bail!("Seed user {} has an empty or placeholder password", user.email);
            }
        }

        Ok(())
    }

    /// Token service settings
    pub fn token_config(&self) -> Result<TokenConfig> {
        let algorithm = Algorithm::from_str(&self.auth.algorithm.to_ascii_uppercase())
            .with_context(|| format!("Unknown signing algorithm {}", self.auth.algorithm))?;

        if self.auth.access_token_secret.is_empty() || self.auth.refresh_token_secret.is_empty() {
            bail!(
                "auth.access_token_secret and auth.refresh_token_secret must be set \
                 (or {ENV_PREFIX}__AUTH__ACCESS_TOKEN_SECRET / {ENV_PREFIX}__AUTH__REFRESH_TOKEN_SECRET)"
            );
        }
        if self.auth.access_token_secret == self.auth.refresh_token_secret {
            bail!("auth.access_token_secret and auth.refresh_token_secret must differ");
        }
        if self.auth.access_token_ttl_minutes <= 0 || self.auth.refresh_token_ttl_days <= 0 {
            bail!("token lifetimes must be positive");
        }

        Ok(TokenConfig {
            access_secret: self.auth.access_token_secret.clone(),
            refresh_secret: self.auth.refresh_token_secret.clone(),
            access_ttl: chrono::Duration::minutes(self.auth.access_token_ttl_minutes),
            refresh_ttl: chrono::Duration::days(self.auth.refresh_token_ttl_days),
            algorithm,
        })
    }

    /// Route policy from the configured rules
    pub fn route_policy(&self) -> Result<RoutePolicy> {
        let rules = self
            .policy
            .rules
            .iter()
            .map(RuleConfig::to_rule)
            .collect::<Result<Vec<_>>>()?;

        let default = match self.policy.default.as_str() {
            "" => bail!("policy.default cannot be empty"),
            d if d.eq_ignore_ascii_case("public") => Requirement::Public,
            role => Requirement::Role(role.to_string()),
        };

        Ok(RoutePolicy::new(rules)?.with_default(default))
    }
}
