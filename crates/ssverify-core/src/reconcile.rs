//! Field-level reconciliation of stored listings against fresh extractions.
//!
//! Each stored `ad` is matched to the first fresh listing with the same url
//! and address. Every non-exempt field of the stored document is compared to
//! the fresh value, and differing fields are resolved through the
//! [`PolicyTable`]. Outcomes are returned as values and collected into a
//! [`ReconcileReport`]; nothing here fails the cycle. Store errors are
//! logged and recorded as [`FieldOutcome::PersistenceFailed`].

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    AD_KIND, AddressIndex, Document, Filter, ListingRecord, NewDocument, StoredRecord, format_date,
};
use crate::policy::{FieldPolicy, PolicyTable, is_exempt};
use crate::traits::ListingStore;

/// Result of comparing one field.
///
/// Variants are ordered by severity; a record's status is its worst field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldOutcome {
    NoChange,
    Skipped,
    Updated,
    AuditAndUpdated,
    PersistenceFailed,
    ResolverMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    NotFound,
    Matched(FieldOutcome),
}

/// A detected difference between a stored and a fresh field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub record_id: Uuid,
    pub url: String,
    pub field: String,
    pub old: Value,
    /// `None` when the fresh listing has no such field.
    pub new: Option<Value>,
}

impl FieldChange {
    /// Kind given to audit snapshots of this field.
    pub fn kind(&self) -> String {
        format!("old_{}", self.field)
    }
}

/// An audit snapshot written before a field update.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditWrite {
    pub audit_id: Uuid,
    pub record_id: Uuid,
    pub field: String,
    pub old: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersistenceFailure {
    pub change: FieldChange,
    pub error: String,
}

/// Everything one reconciliation pass decided.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub audit_writes: Vec<AuditWrite>,
    /// Changes applied to the store (with or without audit).
    pub updates: Vec<FieldChange>,
    pub skipped: Vec<FieldChange>,
    pub not_found: Vec<StoredRecord>,
    pub resolver_missing: Vec<FieldChange>,
    pub failures: Vec<PersistenceFailure>,
    pub statuses: Vec<(Uuid, RecordStatus)>,
    /// Fresh listings no stored ad matched.
    pub new_listings: Vec<ListingRecord>,
}

impl ReconcileReport {
    pub fn status_of(&self, id: Uuid) -> Option<RecordStatus> {
        self.statuses
            .iter()
            .find(|(record_id, _)| *record_id == id)
            .map(|(_, status)| *status)
    }
}

/// Store handle, policies and classification buckets for one pass.
pub struct ReconcileContext<S: ListingStore> {
    store: S,
    policies: PolicyTable,
    report: ReconcileReport,
}

impl<S: ListingStore> ReconcileContext<S> {
    pub fn new(store: S, policies: PolicyTable) -> Self {
        Self {
            store,
            policies,
            report: ReconcileReport::default(),
        }
    }

    /// Reconcile every stored `ad` against the fresh index.
    ///
    /// Store failures land in the report's buckets, so the pass itself
    /// always completes.
    pub async fn reconcile(
        mut self,
        stored: &[StoredRecord],
        fresh: &AddressIndex,
    ) -> ReconcileReport {
        let ads: Vec<&StoredRecord> = stored.iter().filter(|r| r.kind == AD_KIND).collect();

        for record in &ads {
            let status = self.reconcile_record(record, fresh).await;
            self.report.statuses.push((record.id, status));
        }

        self.report.new_listings = fresh
            .records()
            .filter(|listing| {
                !ads.iter().any(|ad| {
                    ad.url() == Some(listing.url()) && ad.address() == Some(listing.address())
                })
            })
            .cloned()
            .collect();

        tracing::info!(
            ads = ads.len(),
            updated = self.report.updates.len(),
            not_found = self.report.not_found.len(),
            resolver_missing = self.report.resolver_missing.len(),
            failures = self.report.failures.len(),
            new = self.report.new_listings.len(),
            "Reconciliation complete"
        );
        self.report
    }

    async fn reconcile_record(
        &mut self,
        stored: &StoredRecord,
        fresh: &AddressIndex,
    ) -> RecordStatus {
        let candidate = match (stored.url(), stored.address()) {
            (Some(url), Some(address)) => fresh.find(url, address),
            _ => None,
        };
        let Some(candidate) = candidate else {
            tracing::debug!(record_id = %stored.id, url = ?stored.url(), "Not found");
            self.report.not_found.push(stored.clone());
            return RecordStatus::NotFound;
        };

        let mut worst = FieldOutcome::NoChange;
        for (field, old) in &stored.doc {
            if is_exempt(field) {
                continue;
            }
            let new = candidate.field(field);
            if new.as_ref().is_some_and(|new| same_value(old, new)) {
                continue;
            }
            let change = FieldChange {
                record_id: stored.id,
                url: candidate.url().to_string(),
                field: field.clone(),
                old: old.clone(),
                new,
            };
            worst = worst.max(self.resolve(change).await);
        }

        RecordStatus::Matched(worst)
    }

    async fn resolve(&mut self, change: FieldChange) -> FieldOutcome {
        let policy = match (change.new.is_some(), self.policies.get(&change.field)) {
            (true, Some(policy)) => policy,
            (false, _) => {
                tracing::warn!(
                    record_id = %change.record_id,
                    field = %change.field,
                    "Field missing from fresh listing"
                );
                self.report.resolver_missing.push(change);
                return FieldOutcome::ResolverMissing;
            }
            (true, None) => {
                tracing::error!(
                    record_id = %change.record_id,
                    field = %change.field,
                    "No resolver for changed field"
                );
                self.report.resolver_missing.push(change);
                return FieldOutcome::ResolverMissing;
            }
        };

        tracing::info!(
            kind = %change.kind(),
            old = %change.old,
            new = ?change.new,
            url = %change.url,
            "Field changed"
        );

        match policy {
            FieldPolicy::Skip => {
                self.report.skipped.push(change);
                FieldOutcome::Skipped
            }
            FieldPolicy::UpdateOnly => match self.apply(&change).await {
                Ok(()) => {
                    self.report.updates.push(change);
                    FieldOutcome::Updated
                }
                Err(e) => self.fail(change, e),
            },
            FieldPolicy::AuditAndUpdate => {
                let audit = audit_document(&change);
                let audit_id = match self.store.insert_one(&audit).await {
                    Ok(id) => id,
                    Err(e) => return self.fail(change, e),
                };
                self.report.audit_writes.push(AuditWrite {
                    audit_id,
                    record_id: change.record_id,
                    field: change.field.clone(),
                    old: change.old.clone(),
                });

                match self.apply(&change).await {
                    Ok(()) => {
                        self.report.updates.push(change);
                        FieldOutcome::AuditAndUpdated
                    }
                    Err(e) => self.fail(change, e),
                }
            }
        }
    }

    async fn apply(&self, change: &FieldChange) -> Result<(), AppError> {
        let Some(new) = &change.new else {
            return Err(AppError::Persistence(format!(
                "No fresh value for '{}'",
                change.field
            )));
        };
        let mut set = Document::new();
        set.insert(change.field.clone(), new.clone());

        let matched = self
            .store
            .update_one(&Filter::Id(change.record_id), &set)
            .await?;
        if matched == 0 {
            return Err(AppError::Persistence(format!(
                "Not updated record {} ('{}')",
                change.record_id, change.field
            )));
        }
        Ok(())
    }

    fn fail(&mut self, change: FieldChange, error: AppError) -> FieldOutcome {
        tracing::error!(
            record_id = %change.record_id,
            field = %change.field,
            error = %error,
            "Failed to apply field change"
        );
        self.report.failures.push(PersistenceFailure {
            change,
            error: error.to_string(),
        });
        FieldOutcome::PersistenceFailed
    }
}

/// Snapshot of the old value: `{ad_id, <field>: old, date}` of kind `old_<field>`.
fn audit_document(change: &FieldChange) -> NewDocument {
    let mut doc = Document::new();
    doc.insert("ad_id".into(), change.record_id.to_string().into());
    doc.insert(change.field.clone(), change.old.clone());
    doc.insert("date".into(), format_date(&Utc::now()).into());
    NewDocument {
        kind: change.kind(),
        doc,
    }
}

/// Equality that tolerates documents storing numbers where listings carry text.
fn same_value(stored: &Value, fresh: &Value) -> bool {
    match (stored, fresh) {
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            n.to_string() == s.trim()
        }
        _ => stored == fresh,
    }
}
