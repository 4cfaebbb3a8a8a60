use std::fmt::Write;

use serde_json::Value;
use ssverify_core::models::AddressIndex;
use ssverify_core::poll::{CycleReport, PollEvent, PollReporter, TracingPollReporter};
use ssverify_core::reconcile::FieldChange;

/// Prints each completed cycle to stdout and logs every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct CliReporter {
    tracing: TracingPollReporter,
}

impl PollReporter for CliReporter {
    fn report(&self, event: PollEvent<'_>) {
        if let PollEvent::CycleCompleted { report, .. } = &event {
            print!("{}", render_cycle(report));
        }
        self.tracing.report(event);
    }
}

/// Every record, grouped by address.
pub fn render_index(index: &AddressIndex) -> String {
    let mut out = String::new();
    for (address, records) in index.iter() {
        for record in records {
            let _ = writeln!(out, "{address:>30} {record}");
        }
    }
    out
}

pub fn render_cycle(report: &CycleReport) -> String {
    let reconcile = &report.reconcile;
    let mut out = render_index(&report.index);

    if !reconcile.updates.is_empty() {
        out.push_str("\nResolved:\n");
        for change in &reconcile.updates {
            let _ = writeln!(out, "  {}", render_change(change));
        }
    }
    if !reconcile.resolver_missing.is_empty() {
        out.push_str("\nMissing resolver:\n");
        for change in &reconcile.resolver_missing {
            let _ = writeln!(out, "  {}", render_change(change));
        }
    }
    if !reconcile.failures.is_empty() {
        out.push_str("\nFailed:\n");
        for failure in &reconcile.failures {
            let _ = writeln!(
                out,
                "  {} ({})",
                render_change(&failure.change),
                failure.error
            );
        }
    }
    if !reconcile.new_listings.is_empty() {
        out.push_str("\nNew:\n");
        for record in &reconcile.new_listings {
            let _ = writeln!(out, "  {record}");
        }
    }

    let _ = writeln!(
        out,
        "\nrecords={} resolved={} not_found={} resolver_missing={} failed={} new={} inserted={} sites_failed={}",
        report.index.len(),
        reconcile.updates.len(),
        reconcile.not_found.len(),
        reconcile.resolver_missing.len(),
        reconcile.failures.len(),
        reconcile.new_listings.len(),
        report.inserted,
        report.sites_failed,
    );
    out
}

fn render_change(change: &FieldChange) -> String {
    let new = change.new.as_ref().map_or_else(|| "-".to_string(), plain);
    format!(
        "{} {} {} {} -> {}",
        change.kind(),
        change.record_id,
        change.url,
        plain(&change.old),
        new
    )
}

/// Strings without JSON quotes, anything else as JSON.
fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
