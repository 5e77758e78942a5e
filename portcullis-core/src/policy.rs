//! Access policy engine
//!
//! An ordered list of path patterns, each mapped to the capability a request
//! needs to reach it. The first matching rule decides; unmatched paths require
//! an authenticated session. Rules are not reordered or checked for shadowing,
//! so broad patterns must be declared before narrower ones that depend on them.

use crate::session::SessionContext;
use crate::types::Role;
use std::collections::HashSet;
use tracing::debug;

/// Access level required to reach a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    Public,
    Authenticated,
    Roles(HashSet<Role>),
}

impl Capability {
    pub fn roles<I: IntoIterator<Item = Role>>(roles: I) -> Self {
        Capability::Roles(roles.into_iter().collect())
    }
}

/// Outcome of an authorization check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Permit,
    /// No session where one is required; send the client to the login path
    Redirect(String),
    /// Session present but its role is not allowed
    Deny,
}

/// Ant-style path pattern: `*` matches one segment, `**` any number of segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<String>,
}

impl PathPattern {
    pub fn new(pattern: &str) -> Self {
        Self {
            raw: pattern.to_string(),
            segments: split_path(pattern).map(str::to_string).collect(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, path: &str) -> bool {
        // Ignore the query string if a full URI slipped through
        let path = path.split('?').next().unwrap_or(path);
        let parts: Vec<&str> = split_path(path).collect();
        match_segments(&self.segments, &parts)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn match_segments(pattern: &[String], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((head, rest)) if head == "**" => {
            (0..=path.len()).any(|skip| match_segments(rest, &path[skip..]))
        }
        Some((head, rest)) => match path.split_first() {
            Some((segment, remaining)) => {
                (head == "*" || head == segment) && match_segments(rest, remaining)
            }
            None => false,
        },
    }
}

/// One `(pattern, capability)` pair
#[derive(Debug, Clone)]
pub struct AccessRule {
    pub pattern: PathPattern,
    pub capability: Capability,
}

/// Ordered access rules, evaluated first-match-wins
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    rules: Vec<AccessRule>,
    fallback: Capability,
    login_path: String,
}

impl AccessPolicy {
    pub fn builder() -> AccessPolicyBuilder {
        AccessPolicyBuilder::default()
    }

    /// The route table served by the web front end
    pub fn standard() -> Self {
        Self::builder()
            .permit_all(["/login", "/loginProc", "/join", "/joinProc"])
            .permit_all(["/"])
            .require_any_role(["/my/**"], [Role::Admin, Role::User])
            .require_any_role(["/admin"], [Role::Admin])
            .build()
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn rules(&self) -> &[AccessRule] {
        &self.rules
    }

    fn matching_rule(&self, path: &str) -> Option<&AccessRule> {
        self.rules.iter().find(|rule| rule.pattern.matches(path))
    }

    /// Capability of the first rule matching `path`; `Authenticated` when none match
    pub fn required_capability(&self, path: &str) -> &Capability {
        self.matching_rule(path)
            .map(|rule| &rule.capability)
            .unwrap_or(&self.fallback)
    }

    pub fn authorize(&self, path: &str, context: &SessionContext) -> Decision {
        let rule = self.matching_rule(path);
        let capability = rule.map_or(&self.fallback, |rule| &rule.capability);

        let decision = match capability {
            Capability::Public => Decision::Permit,
            Capability::Authenticated => match context.session {
                Some(_) => Decision::Permit,
                None => Decision::Redirect(self.login_path.clone()),
            },
            Capability::Roles(allowed) => match context.role() {
                Some(role) if allowed.contains(&role) => Decision::Permit,
                Some(_) => Decision::Deny,
                None => Decision::Redirect(self.login_path.clone()),
            },
        };

        debug!(
            path = %path,
            rule = rule.map_or("<default>", |rule| rule.pattern.as_str()),
            user = ?context.username(),
            decision = ?decision,
            "Access decision"
        );
        decision
    }
}

/// Builder for [`AccessPolicy`]; rules keep the order they are added in
#[derive(Debug)]
pub struct AccessPolicyBuilder {
    rules: Vec<AccessRule>,
    login_path: String,
}

impl Default for AccessPolicyBuilder {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            login_path: "/login".to_string(),
        }
    }
}

impl AccessPolicyBuilder {
    pub fn rule(mut self, pattern: &str, capability: Capability) -> Self {
        self.rules.push(AccessRule {
            pattern: PathPattern::new(pattern),
            capability,
        });
        self
    }

    pub fn permit_all<'a, I: IntoIterator<Item = &'a str>>(mut self, patterns: I) -> Self {
        for pattern in patterns {
            self = self.rule(pattern, Capability::Public);
        }
        self
    }

    pub fn authenticated<'a, I: IntoIterator<Item = &'a str>>(mut self, patterns: I) -> Self {
        for pattern in patterns {
            self = self.rule(pattern, Capability::Authenticated);
        }
        self
    }

    pub fn require_any_role<'a, I, R>(mut self, patterns: I, roles: R) -> Self
    where
        I: IntoIterator<Item = &'a str>,
        R: IntoIterator<Item = Role>,
    {
        let capability = Capability::roles(roles);
        for pattern in patterns {
            self = self.rule(pattern, capability.clone());
        }
        self
    }

    pub fn login_path<S: Into<String>>(mut self, path: S) -> Self {
        self.login_path = path.into();
        self
    }

    pub fn build(self) -> AccessPolicy {
        AccessPolicy {
            rules: self.rules,
            fallback: Capability::Authenticated,
            login_path: self.login_path,
        }
    }
}
