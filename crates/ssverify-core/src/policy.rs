use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Fields never compared between stored and fresh listings.
pub const EXEMPT_FIELDS: &[&str] = &["_id", "date", "kind"];

pub fn is_exempt(field: &str) -> bool {
    EXEMPT_FIELDS.contains(&field)
}

/// What to do when a field differs between the stored and the fresh listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldPolicy {
    /// Snapshot the old value as an audit document, then update.
    AuditAndUpdate,
    /// Update in place without history.
    UpdateOnly,
    /// Leave the stored value alone.
    Skip,
}

/// Per-field resolution policies.
///
/// The default table audits price changes and silently follows the other
/// numeric fields. Fields without an entry are unresolvable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    policies: BTreeMap<String, FieldPolicy>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::empty()
            .with_policy("price", FieldPolicy::AuditAndUpdate)
            .with_policy("price_m2", FieldPolicy::UpdateOnly)
            .with_policy("m2", FieldPolicy::UpdateOnly)
            .with_policy("level", FieldPolicy::UpdateOnly)
            .with_policy("rooms", FieldPolicy::UpdateOnly)
    }
}

impl PolicyTable {
    pub fn empty() -> Self {
        Self {
            policies: BTreeMap::new(),
        }
    }

    pub fn with_policy(mut self, field: &str, policy: FieldPolicy) -> Self {
        self.policies.insert(field.to_string(), policy);
        self
    }

    pub fn get(&self, field: &str) -> Option<FieldPolicy> {
        self.policies.get(field).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, FieldPolicy)> {
        self.policies.iter().map(|(f, p)| (f.as_str(), *p))
    }

    /// Replace or add entries. Exempt fields cannot carry a policy.
    pub fn apply_overrides<'a, I>(&mut self, overrides: I) -> Result<(), AppError>
    where
        I: IntoIterator<Item = (&'a String, &'a FieldPolicy)>,
    {
        for (field, policy) in overrides {
            if is_exempt(field) {
                return Err(AppError::ConfigError(format!(
                    "Field '{field}' is never compared and cannot have a resolver"
                )));
            }
            self.policies.insert(field.clone(), *policy);
        }
        Ok(())
    }
}
