//! Tenant scopes
//!
//! A scope is the tenant coordinate `(user_id, sub_tenant_id, session_id)`.
//! Each scope maps to exactly one isolated subtree under the data root.
//! Scopes are created on first write and never implicitly deleted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Sub-tenant id used when sub-tenant isolation is disabled by the mode gate.
pub const DEFAULT_SUB_TENANT: &str = "default";

/// A tenant coordinate identifying an isolated subtree of data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId {
    /// Top-level tenant
    pub user_id: String,
    /// Sub-tenant (e.g. a character in narrative deployments)
    pub sub_tenant_id: String,
    /// Conversation or capture session
    pub session_id: String,
}

impl ScopeId {
    /// Create a scope, sanitizing every component for filesystem use.
    ///
    /// Components are lower-cased at the boundary so that scope paths cannot
    /// collide on case-folding filesystems.
    pub fn new(
        user_id: impl Into<String>,
        sub_tenant_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: sanitize(&user_id.into()),
            sub_tenant_id: sanitize(&sub_tenant_id.into()),
            session_id: sanitize(&session_id.into()),
        }
    }

    /// Scope with the fixed default sub-tenant (non-narrative modes).
    pub fn without_sub_tenant(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self::new(user_id, DEFAULT_SUB_TENANT, session_id)
    }

    /// Force the sub-tenant to the fixed default, keeping user and session.
    #[must_use]
    pub fn with_default_sub_tenant(&self) -> Self {
        Self {
            user_id: self.user_id.clone(),
            sub_tenant_id: DEFAULT_SUB_TENANT.to_string(),
            session_id: self.session_id.clone(),
        }
    }

    /// Relative directory for this scope: `<user>/<sub_tenant>/<session>`.
    #[must_use]
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(&self.user_id)
            .join(&self.sub_tenant_id)
            .join(&self.session_id)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.user_id, self.sub_tenant_id, self.session_id
        )
    }
}

/// Lower-case and replace path-hostile characters with `_`.
///
/// Empty components become `"default"` so a scope always maps to a real
/// directory triple.
fn sanitize(component: &str) -> String {
    let folded: String = component
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if folded.is_empty() || folded == "." || folded == ".." {
        "default".to_string()
    } else {
        folded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_are_lowercased() {
        let scope = ScopeId::new("Alice", "Bard", "Session-1");
        assert_eq!(scope.user_id, "alice");
        assert_eq!(scope.sub_tenant_id, "bard");
        assert_eq!(scope.session_id, "session-1");
    }

    #[test]
    fn hostile_characters_are_replaced() {
        let scope = ScopeId::new("a/b", "..", "c:d");
        assert_eq!(scope.user_id, "a_b");
        assert_eq!(scope.sub_tenant_id, "default");
        assert_eq!(scope.session_id, "c_d");
        assert_eq!(scope.relative_path(), PathBuf::from("a_b/default/c_d"));
    }

    #[test]
    fn default_sub_tenant_override() {
        let scope = ScopeId::new("u", "hero", "s").with_default_sub_tenant();
        assert_eq!(scope.sub_tenant_id, DEFAULT_SUB_TENANT);
    }
}
