//! Route authorization policy
//!
//! Maps `(method, path)` to the role a request must carry. Rules are
//! evaluated in order and the first match wins, so method-specific rules
//! must precede a method-agnostic rule for the same pattern.
//!
//! Patterns are matched per path segment:
//! - `*` matches exactly one segment, and may be embedded (`*.json`)
//! - `**` matches zero or more segments, so `/api/login/**` also
//!   matches `/api/login`
//!
//! Empty segments are ignored on both sides, so `//a/b/` and `/a/b`
//! are the same path.

use axum::http::Method;

use crate::error::AuthError;

/// What a route requires from the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Reachable without authentication
    Public,
    /// Requires a valid access token whose role equals this one
    Role(String),
}

impl Requirement {
    pub fn is_public(&self) -> bool {
        matches!(self, Requirement::Public)
    }
}

/// A single policy entry
#[derive(Debug, Clone)]
pub struct RouteRule {
    /// `None` applies to every method
    pub method: Option<Method>,
    pub pattern: String,
    pub requirement: Requirement,
}

impl RouteRule {
    pub fn public(method: Option<Method>, pattern: impl Into<String>) -> Self {
        Self {
            method,
            pattern: pattern.into(),
            requirement: Requirement::Public,
        }
    }

    pub fn role(method: Option<Method>, pattern: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            method,
            pattern: pattern.into(),
            requirement: Requirement::Role(role.into()),
        }
    }
}

/// Maximum iterations allowed for pattern matching
const MAX_MATCH_ITERATIONS: usize = 10000;

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: RouteRule,
    parts: Vec<PatternPart>,
}

#[derive(Debug, Clone, PartialEq)]
enum PatternPart {
    /// Segment that must match exactly
    Literal(String),
    /// Single segment wildcard (*)
    SingleWildcard,
    /// Single segment with embedded wildcards (e.g. `*.json`)
    Glob(String),
    /// Multi-segment wildcard (**)
    MultiWildcard,
}

/// Ordered, immutable route policy table
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    rules: Vec<CompiledRule>,
    default: Requirement,
}

impl RoutePolicy {
    /// Build a policy; unmatched routes are public
    pub fn new(rules: Vec<RouteRule>) -> Result<Self, AuthError> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let parts = compile_pattern(&rule.pattern)?;
                Ok(CompiledRule { rule, parts })
            })
            .collect::<Result<Vec<_>, AuthError>>()?;

        Ok(Self {
            rules,
            default: Requirement::Public,
        })
    }

    /// Set the requirement for routes no rule matches
    pub fn with_default(mut self, requirement: Requirement) -> Self {
        self.default = requirement;
        self
    }

    pub fn rules(&self) -> impl Iterator<Item = &RouteRule> {
        self.rules.iter().map(|c| &c.rule)
    }

    /// Find the first rule matching a request
    pub fn find_match(&self, method: &Method, path: &str) -> Option<&RouteRule> {
        let segments = split_path(path);

        self.rules
            .iter()
            .filter(|c| c.rule.method.as_ref().is_none_or(|m| m == method))
            .find(|c| matches_pattern(&c.parts, &segments))
            .map(|c| &c.rule)
    }

    /// Requirement applying to a request
    pub fn lookup(&self, method: &Method, path: &str) -> &Requirement {
        self.find_match(method, path)
            .map(|rule| &rule.requirement)
            .unwrap_or(&self.default)
    }
}

fn split_path(path: &str) -> Vec<&str> {
    // Drop any query string before splitting.
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Compile a pattern into per-segment parts
fn compile_pattern(pattern: &str) -> Result<Vec<PatternPart>, AuthError> {
    if !pattern.starts_with('/') {
        return Err(AuthError::Configuration(format!(
            "route pattern '{}' must start with '/'",
            pattern
        )));
    }

    pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| match segment {
            "**" => Ok(PatternPart::MultiWildcard),
            "*" => Ok(PatternPart::SingleWildcard),
            s if s.contains("**") => Err(AuthError::Configuration(format!(
                "route pattern '{}': '**' must be a whole segment",
                pattern
            ))),
            s if s.contains('*') => Ok(PatternPart::Glob(s.to_string())),
            s => Ok(PatternPart::Literal(s.to_string())),
        })
        .collect()
}

fn matches_pattern(parts: &[PatternPart], segments: &[&str]) -> bool {
    let mut iterations = 0;
    match_recursive(parts, segments, &mut iterations)
}

fn match_recursive(parts: &[PatternPart], segments: &[&str], iterations: &mut usize) -> bool {
    *iterations += 1;
    if *iterations > MAX_MATCH_ITERATIONS {
        tracing::warn!(
            "Pattern matching exceeded {} iterations, aborting",
            MAX_MATCH_ITERATIONS
        );
        return false;
    }

    let Some((part, rest)) = parts.split_first() else {
        return segments.is_empty();
    };

    match part {
        PatternPart::MultiWildcard => {
            if rest.is_empty() {
                return true;
            }
            (0..=segments.len()).any(|skip| match_recursive(rest, &segments[skip..], iterations))
        }
        _ => {
            let Some((segment, remaining)) = segments.split_first() else {
                return false;
            };
            let matched = match part {
                PatternPart::Literal(lit) => lit == segment,
                PatternPart::SingleWildcard => true,
                PatternPart::Glob(glob) => glob_matches(glob, segment),
                PatternPart::MultiWildcard => false,
            };
            matched && match_recursive(rest, remaining, iterations)
        }
    }
}

/// Match a single segment against a glob containing `*`
fn glob_matches(glob: &str, segment: &str) -> bool {
    let pattern = glob.as_bytes();
    let text = segment.as_bytes();
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&b| b == b'*')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway_policy() -> RoutePolicy {
        RoutePolicy::new(vec![
            RouteRule::public(None, "/api/login/**"),
            RouteRule::public(None, "/api/refreshToken/**"),
            RouteRule::public(None, "/api/core/tansiq/**"),
            RouteRule::role(Some(Method::POST), "/api/core/studentFiles", "ADMIN"),
            RouteRule::role(Some(Method::GET), "/api/core/admins/**", "ADMIN"),
            RouteRule::role(None, "/api/core/students/**", "STUDENT"),
        ])
        .unwrap()
    }

    fn role(name: &str) -> Requirement {
        Requirement::Role(name.to_string())
    }

    #[test]
    fn test_exact_match() {
        let policy = gateway_policy();
        assert_eq!(policy.lookup(&Method::POST, "/api/core/studentFiles"), &role("ADMIN"));
        assert_eq!(policy.lookup(&Method::POST, "/api/core/studentFiles/x"), &Requirement::Public);
    }

    #[test]
    fn test_method_specific_rule() {
        let policy = gateway_policy();
        assert_eq!(policy.lookup(&Method::GET, "/api/core/studentFiles"), &Requirement::Public);
        assert_eq!(policy.lookup(&Method::GET, "/api/core/admins/7"), &role("ADMIN"));
        assert_eq!(policy.lookup(&Method::DELETE, "/api/core/admins/7"), &Requirement::Public);
    }

    #[test]
    fn test_multi_wildcard_matches_prefix_itself() {
        let policy = gateway_policy();
        assert!(policy.lookup(&Method::POST, "/api/login").is_public());
        assert!(policy.lookup(&Method::POST, "/api/login/").is_public());
        assert!(policy.lookup(&Method::GET, "/api/login/a/b/c").is_public());
        assert_eq!(policy.lookup(&Method::GET, "/api/core/admins"), &role("ADMIN"));
    }

    #[test]
    fn test_single_wildcard() {
        let policy =
            RoutePolicy::new(vec![RouteRule::role(None, "/api/core/students/*", "STUDENT")]).unwrap();

        assert!(policy.find_match(&Method::GET, "/api/core/students/1").is_some());
        assert!(policy.find_match(&Method::GET, "/api/core/students").is_none());
        assert!(policy.find_match(&Method::GET, "/api/core/students/1/files").is_none());
    }

    #[test]
    fn test_embedded_wildcard() {
        let policy =
            RoutePolicy::new(vec![RouteRule::role(None, "/files/*.json", "ADMIN")]).unwrap();

        assert!(policy.find_match(&Method::GET, "/files/report.json").is_some());
        assert!(policy.find_match(&Method::GET, "/files/report.csv").is_none());
        assert!(policy.find_match(&Method::GET, "/files/a/report.json").is_none());
    }

    #[test]
    fn test_inner_multi_wildcard() {
        let policy =
            RoutePolicy::new(vec![RouteRule::role(None, "/api/**/export", "ADMIN")]).unwrap();

        assert!(policy.find_match(&Method::GET, "/api/export").is_some());
        assert!(policy.find_match(&Method::GET, "/api/a/b/export").is_some());
        assert!(policy.find_match(&Method::GET, "/api/a/b/exports").is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let policy = RoutePolicy::new(vec![
            RouteRule::role(Some(Method::GET), "/api/reports/**", "STUDENT"),
            RouteRule::role(None, "/api/reports/**", "ADMIN"),
        ])
        .unwrap();

        assert_eq!(policy.lookup(&Method::GET, "/api/reports/1"), &role("STUDENT"));
        assert_eq!(policy.lookup(&Method::PUT, "/api/reports/1"), &role("ADMIN"));
    }

    #[test]
    fn test_slashes_and_query_are_normalized() {
        let policy = gateway_policy();
        assert_eq!(policy.lookup(&Method::GET, "//api//core/admins/"), &role("ADMIN"));
        assert_eq!(
            policy.lookup(&Method::GET, "/api/core/students/1?page=2"),
            &role("STUDENT")
        );
    }

    #[test]
    fn test_default_requirement() {
        let policy = gateway_policy();
        assert!(policy.lookup(&Method::GET, "/unknown").is_public());

        let strict = gateway_policy().with_default(role("ADMIN"));
        assert_eq!(strict.lookup(&Method::GET, "/unknown"), &role("ADMIN"));
        assert!(strict.lookup(&Method::GET, "/api/login").is_public());
    }

    #[test]
    fn test_invalid_patterns_rejected() {
        assert!(RoutePolicy::new(vec![RouteRule::public(None, "api/login")]).is_err());
        assert!(RoutePolicy::new(vec![RouteRule::public(None, "/api/a**b")]).is_err());
    }

    #[test]
    fn test_glob_matches() {
        assert!(glob_matches("*.json", "a.json"));
        assert!(glob_matches("a*b*c", "aXXbYYc"));
        assert!(glob_matches("a*", "a"));
        assert!(!glob_matches("a*c", "abd"));
    }

    #[test]
    fn test_pathological_pattern_terminates() {
        let policy = RoutePolicy::new(vec![RouteRule::public(
            None,
            "/**/a/**/a/**/a/**/a/**/a/**/b",
        )])
        .unwrap();
        let path = format!("/{}", vec!["a"; 60].join("/"));
        assert!(policy.find_match(&Method::GET, &path).is_none());
    }
}
