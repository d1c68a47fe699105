//! Path-pattern access rules.
//!
//! Rules are evaluated in configured order and the last matching rule wins.
//! The literal pattern `all` is a low-priority default: it only applies while
//! no earlier rule has matched. Once another rule has matched, `all` is
//! skipped rather than read as a pattern, so it never matches paths that
//! merely contain the word.
//!
//! Patterns support two wildcards:
//! - `*` - zero or more word characters
//! - `?` - exactly one word character
//!
//! Patterns are anchored at the start of the path (leading `/` ignored on both
//! sides); everything else is literal.

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::request::AccessMethod;

/// Pattern that matches every path while nothing more specific has matched.
pub const MATCH_ALL_PATTERN: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessDecision {
    Allow,
    Deny,
}

impl AccessDecision {
    pub fn is_allowed(self) -> bool {
        self == AccessDecision::Allow
    }
}

/// One configured rule. A missing decision is a configuration error, raised
/// only when a request actually needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    #[serde(rename = "path")]
    pub pattern: String,
    #[serde(default)]
    pub read: Option<AccessDecision>,
    #[serde(default)]
    pub write: Option<AccessDecision>,
}

impl AccessRule {
    pub fn new(
        pattern: impl Into<String>,
        read: Option<AccessDecision>,
        write: Option<AccessDecision>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            read,
            write,
        }
    }

    pub fn decision(&self, access: AccessMethod) -> Option<AccessDecision> {
        match access {
            AccessMethod::Read => self.read,
            AccessMethod::Write => self.write,
        }
    }
}

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("`{access}` configuration not set for path pattern `{pattern}`")]
    Configuration {
        pattern: String,
        access: AccessMethod,
    },
    #[error("no access rule matches path `{path}`")]
    NoMatchingRule { path: String },
    #[error("invalid path pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },
}

impl AccessError {
    /// Both a missing rule and a missing decision are configuration faults.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AccessError::Configuration { .. } | AccessError::NoMatchingRule { .. }
        )
    }
}

#[derive(Debug, Clone)]
enum PatternMatcher {
    All,
    Pattern(Regex),
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: AccessRule,
    matcher: PatternMatcher,
}

/// Ordered rule set with precompiled patterns.
#[derive(Debug, Clone, Default)]
pub struct AccessRuleMatcher {
    rules: Vec<CompiledRule>,
}

impl AccessRuleMatcher {
    pub fn new(rules: impl IntoIterator<Item = AccessRule>) -> Result<Self, AccessError> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let matcher = compile_pattern(&rule.pattern)?;
                Ok(CompiledRule { rule, matcher })
            })
            .collect::<Result<Vec<_>, AccessError>>()?;
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The rule governing `path`, if any.
    pub fn matching_rule(&self, path: &str) -> Option<&AccessRule> {
        let path = path.trim_start_matches('/');
        self.rules
            .iter()
            .fold(None, |best: Option<&CompiledRule>, candidate| {
                let matched = match &candidate.matcher {
                    PatternMatcher::All => best.is_none(),
                    PatternMatcher::Pattern(regex) => regex.is_match(path),
                };
                if matched { Some(candidate) } else { best }
            })
            .map(|compiled| &compiled.rule)
    }

    /// Decide whether `access` to `path` is allowed.
    pub fn authorize(
        &self,
        path: &str,
        access: AccessMethod,
    ) -> Result<AccessDecision, AccessError> {
        let rule = self
            .matching_rule(path)
            .ok_or_else(|| AccessError::NoMatchingRule {
                path: path.to_string(),
            })?;

        let decision = rule
            .decision(access)
            .ok_or_else(|| AccessError::Configuration {
                pattern: rule.pattern.clone(),
                access,
            })?;

        debug!(
            path,
            access = access.as_str(),
            pattern = %rule.pattern,
            decision = ?decision,
            "access rule matched"
        );
        Ok(decision)
    }
}

fn compile_pattern(pattern: &str) -> Result<PatternMatcher, AccessError> {
    if pattern == MATCH_ALL_PATTERN {
        return Ok(PatternMatcher::All);
    }

    let mut source = String::from("^");
    let mut buffer = [0u8; 4];
    for ch in pattern.trim_start_matches('/').chars() {
        match ch {
            '*' => source.push_str(r"\w*"),
            '?' => source.push_str(r"\w"),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut buffer))),
        }
    }

    Regex::new(&source)
        .map(PatternMatcher::Pattern)
        .map_err(|err| AccessError::InvalidPattern {
            pattern: pattern.to_string(),
            message: err.to_string(),
        })
}
