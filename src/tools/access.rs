//! Tool access control: the single allow/deny policy decision point.
//!
//! The runtime consults one [`PolicyDecision`] after admission and before rate
//! limiting. [`ToolAccessPolicy`] is a grant table; anything richer lives
//! outside this crate behind the same trait.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::gateway::ValidatedCall;
use crate::types::Identity;

/// Wildcard for identities or tool ids.
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyVerdict {
    Allow,
    Deny(String),
}

/// External authorization hook.
#[cfg_attr(test, mockall::automock)]
pub trait PolicyDecision: Send + Sync {
    fn decide(&self, identity: &Identity, call: &ValidatedCall) -> PolicyVerdict;
}

/// Allows every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl PolicyDecision for AllowAll {
    fn decide(&self, _identity: &Identity, _call: &ValidatedCall) -> PolicyVerdict {
        PolicyVerdict::Allow
    }
}

/// Identity → tools grant table.
///
/// Tool ids are `plugin/tool`; `plugin/*` and `*` grant more broadly, and
/// grants to the `*` identity apply to everyone. An identity with no
/// matching grant is denied.
#[derive(Debug, Default)]
pub struct ToolAccessPolicy {
    /// identity → set of granted tool ids
    grants: RwLock<HashMap<String, HashSet<String>>>,
}

impl ToolAccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant an identity access to a tool id or pattern.
    pub fn grant(&self, identity: &str, tool_id: &str) {
        if let Ok(mut grants) = self.grants.write() {
            grants
                .entry(identity.to_string())
                .or_default()
                .insert(tool_id.to_string());
        }
    }

    pub fn revoke(&self, identity: &str, tool_id: &str) {
        if let Ok(mut grants) = self.grants.write() {
            if let Some(set) = grants.get_mut(identity) {
                set.remove(tool_id);
            }
        }
    }

    pub fn check_access(&self, identity: &str, plugin: &str, tool: &str) -> bool {
        let Ok(grants) = self.grants.read() else {
            return false;
        };
        let exact = format!("{}/{}", plugin, tool);
        let plugin_wide = format!("{}/{}", plugin, WILDCARD);
        [identity, WILDCARD]
            .iter()
            .filter_map(|who| grants.get(*who))
            .any(|set| {
                set.contains(&exact) || set.contains(&plugin_wide) || set.contains(WILDCARD)
            })
    }

    /// Granted ids for an identity, sorted.
    pub fn tools_for(&self, identity: &str) -> Vec<String> {
        let Ok(grants) = self.grants.read() else {
            return Vec::new();
        };
        let mut ids: Vec<String> = grants
            .get(identity)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }
}

impl PolicyDecision for ToolAccessPolicy {
    fn decide(&self, identity: &Identity, call: &ValidatedCall) -> PolicyVerdict {
        if self.check_access(identity.as_str(), &call.plugin, &call.tool.name) {
            PolicyVerdict::Allow
        } else {
            PolicyVerdict::Deny(format!(
                "{} may not invoke {}",
                identity,
                call.qualified_name()
            ))
        }
    }
}
