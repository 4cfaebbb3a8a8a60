use std::time::Duration;

use crate::assembler::RecordAssembler;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::extract::SiteExtractor;
use crate::models::{AD_KIND, AddressIndex, Filter, NewDocument};
use crate::parser::TagStreamParser;
use crate::policy::PolicyTable;
use crate::reconcile::{ReconcileContext, ReconcileReport};
use crate::traits::{Fetcher, ListingStore};

/// Outcome of one extract, assemble and reconcile cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub index: AddressIndex,
    pub reconcile: ReconcileReport,
    pub sites_ok: usize,
    pub sites_failed: usize,
    /// Newly persisted listings, when `insert.new` is enabled.
    pub inserted: usize,
}

/// Events emitted by the poll loop for monitoring/logging.
#[derive(Debug, Clone)]
pub enum PollEvent<'a> {
    CycleStarted { cycle: u64 },
    CycleCompleted { cycle: u64, report: &'a CycleReport },
    CycleFailed { cycle: u64, error: &'a AppError },
    Sleeping { delay: Duration },
    Stopped { cycles: u64 },
}

/// Trait for receiving poll events (decoupled logging).
pub trait PollReporter: Send + Sync {
    fn report(&self, event: PollEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPollReporter;

impl PollReporter for TracingPollReporter {
    fn report(&self, event: PollEvent<'_>) {
        match event {
            PollEvent::CycleStarted { cycle } => {
                tracing::info!(%cycle, "Cycle started");
            }
            PollEvent::CycleCompleted { cycle, report } => {
                tracing::info!(
                    %cycle,
                    records = report.index.len(),
                    resolved = report.reconcile.updates.len(),
                    not_found = report.reconcile.not_found.len(),
                    resolver_missing = report.reconcile.resolver_missing.len(),
                    inserted = report.inserted,
                    "Cycle completed"
                );
            }
            PollEvent::CycleFailed { cycle, error } => {
                tracing::error!(%cycle, %error, "Cycle failed");
            }
            PollEvent::Sleeping { delay } => {
                tracing::info!(seconds = delay.as_secs(), "Sleeping until next cycle");
            }
            PollEvent::Stopped { cycles } => {
                tracing::info!(%cycles, "Poll loop stopped");
            }
        }
    }
}

/// Periodic scrape-and-reconcile service.
pub struct PollService<F, S>
where
    F: Fetcher,
    S: ListingStore,
{
    extractor: SiteExtractor<F>,
    assembler: RecordAssembler,
    store: S,
    policies: PolicyTable,
    sites: Vec<String>,
    insert_new: bool,
    restart: Option<Duration>,
}

impl<F, S> PollService<F, S>
where
    F: Fetcher,
    S: ListingStore,
{
    pub fn new(fetcher: F, store: S, config: &AppConfig) -> Result<Self, AppError> {
        let parser = TagStreamParser::new(config.parser_config())?;
        let extractor = SiteExtractor::new(
            fetcher,
            parser,
            config.base_url(),
            &config.pagination_marker,
        )
        .with_concurrency(config.fetch_concurrency);
        let assembler = RecordAssembler::new(
            config.marker_matcher(),
            config.base_url(),
            &config.house_marker,
        );

        Ok(Self {
            extractor,
            assembler,
            store,
            policies: config.policies()?,
            sites: config.sites.clone(),
            insert_new: config.insert_new,
            restart: config.restart_interval(),
        })
    }

    /// Run one cycle.
    ///
    /// Site failures are absorbed; only a failing store read or a failing
    /// insert of new listings fails the cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport, AppError> {
        let extraction = self.extractor.extract_sites(&self.sites).await;
        let index = self.assembler.assemble(&extraction.stream);

        let stored = self.store.find(&Filter::Kind(AD_KIND.to_string())).await?;
        tracing::debug!(stored = stored.len(), fresh = index.len(), "Reconciling");

        let reconcile = ReconcileContext::new(self.store.clone(), self.policies.clone())
            .reconcile(&stored, &index)
            .await;

        let mut inserted = 0;
        if self.insert_new && !reconcile.new_listings.is_empty() {
            let docs: Vec<NewDocument> = reconcile
                .new_listings
                .iter()
                .map(NewDocument::listing)
                .collect();
            inserted = self.store.insert_many(&docs).await?.len();
            tracing::info!(inserted, "Inserted new listings");
        }

        Ok(CycleReport {
            index,
            reconcile,
            sites_ok: extraction.sites_ok,
            sites_failed: extraction.sites_failed,
            inserted,
        })
    }

    /// Run cycles separated by the restart delay.
    ///
    /// Without a restart delay a single cycle runs and its error, if any, is
    /// returned. Otherwise the loop never returns; cycle errors are reported
    /// and the next cycle runs after the usual delay.
    pub async fn run<R: PollReporter>(&self, reporter: &R) -> Result<(), AppError> {
        let mut cycle = 0u64;

        loop {
            cycle += 1;
            reporter.report(PollEvent::CycleStarted { cycle });

            match self.run_cycle().await {
                Ok(report) => {
                    reporter.report(PollEvent::CycleCompleted {
                        cycle,
                        report: &report,
                    });
                }
                Err(e) => {
                    reporter.report(PollEvent::CycleFailed { cycle, error: &e });
                    if self.restart.is_none() {
                        reporter.report(PollEvent::Stopped { cycles: cycle });
                        return Err(e);
                    }
                }
            }

            let Some(delay) = self.restart else {
                break;
            };
            reporter.report(PollEvent::Sleeping { delay });
            tokio::time::sleep(delay).await;
        }

        reporter.report(PollEvent::Stopped { cycles: cycle });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::Value;

    use super::*;
    use crate::testutil::{MockFetcher, MockStore, make_stored_ad};

    const SITE: &str = "https://www.ss.com/lv/real-estate/flats/riga/centre/sell/";

    fn config(extra: &str) -> AppConfig {
        AppConfig::from_json(&format!(
            r#"{{
                "sites": ["{SITE}"],
                "sscom.url": "https://www.ss.com",
                "sscom.class": "msga2-o pp6",
                "sscom.class.url": "am"{extra}
            }}"#
        ))
        .unwrap()
    }

    fn row(href: &str, address: &str, price: &str) -> String {
        format!(
            r#"<tr><td class="msga2"><a href="{href}" class="am">x</a></td>
            <td class="msga2-o pp6">{address}</td>
            <td class="msga2-o pp6">2</td>
            <td class="msga2-o pp6">54</td>
            <td class="msga2-o pp6">3/5</td>
            <td class="msga2-o pp6">Jaun.</td>
            <td class="msga2-o pp6">1 000</td>
            <td class="msga2-o pp6">{price}</td></tr>"#
        )
    }

    fn page() -> String {
        format!(
            "<table>{}{}<tr><td>end</td></tr></table>",
            row("/msg/1.html", "Main St 1", "120"),
            row("/msg/2.html", "Other 2", "90")
        )
    }

    fn stored_first(price: &str) -> crate::models::StoredRecord {
        make_stored_ad(&[
            ("url", "https://www.ss.com/msg/1.html"),
            ("address", "Main St 1"),
            ("rooms", "2"),
            ("m2", "54"),
            ("level", "3/5"),
            ("type", "Jaun."),
            ("price_m2", "1 000"),
            ("price", price),
            ("date", "2020-03-05T10:00:00.000Z"),
        ])
    }

    #[derive(Default)]
    struct RecordingReporter {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl PollReporter for RecordingReporter {
        fn report(&self, event: PollEvent<'_>) {
            let name = match event {
                PollEvent::CycleStarted { .. } => "started",
                PollEvent::CycleCompleted { .. } => "completed",
                PollEvent::CycleFailed { .. } => "failed",
                PollEvent::Sleeping { .. } => "sleeping",
                PollEvent::Stopped { .. } => "stopped",
            };
            self.events.lock().unwrap().push(name.to_string());
        }
    }

    #[tokio::test]
    async fn test_cycle_reconciles_and_reports_new_listings() {
        let record = stored_first("100");
        let store = MockStore::with_records(vec![record.clone()]);
        let fetcher = MockFetcher::new().with_page(SITE, &page());
        let service = PollService::new(fetcher, store.clone(), &config("")).unwrap();

        let report = service.run_cycle().await.unwrap();

        assert_eq!(report.sites_ok, 1);
        assert_eq!(report.index.len(), 2);
        assert_eq!(report.reconcile.updates.len(), 1);
        assert_eq!(report.reconcile.new_listings.len(), 1);
        assert_eq!(report.reconcile.new_listings[0].address(), "Other 2");
        assert_eq!(report.inserted, 0);
        assert_eq!(
            store.get(record.id).unwrap().field("price"),
            Some(&Value::from("120"))
        );
    }

    #[tokio::test]
    async fn test_insert_new_persists_unmatched_listings() {
        let store = MockStore::with_records(vec![stored_first("120")]);
        let fetcher = MockFetcher::new().with_page(SITE, &page());
        let service =
            PollService::new(fetcher, store.clone(), &config(r#", "insert.new": true"#)).unwrap();

        let report = service.run_cycle().await.unwrap();

        assert_eq!(report.inserted, 1);
        let inserted = store.inserted.lock().unwrap().clone();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].kind, AD_KIND);
        assert_eq!(
            inserted[0].doc.get("address"),
            Some(&Value::from("Other 2"))
        );
    }

    #[tokio::test]
    async fn test_store_failure_fails_cycle() {
        let store = MockStore::empty().with_find_error(AppError::DatabaseError("down".into()));
        let fetcher = MockFetcher::new().with_page(SITE, &page());
        let service = PollService::new(fetcher, store, &config("")).unwrap();

        let err = service.run_cycle().await.unwrap_err();
        assert!(matches!(err, AppError::DatabaseError(_)));
    }

    #[tokio::test]
    async fn test_failed_site_still_reconciles() {
        let record = stored_first("100");
        let store = MockStore::with_records(vec![record.clone()]);
        let service = PollService::new(MockFetcher::new(), store.clone(), &config("")).unwrap();

        let report = service.run_cycle().await.unwrap();
        assert_eq!(report.sites_failed, 1);
        assert!(report.index.is_empty());
        assert_eq!(report.reconcile.not_found.len(), 1);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_run_once_without_restart() {
        let fetcher = MockFetcher::new().with_page(SITE, &page());
        let service = PollService::new(fetcher, MockStore::empty(), &config("")).unwrap();
        let reporter = RecordingReporter::default();

        service.run(&reporter).await.unwrap();

        assert_eq!(
            *reporter.events.lock().unwrap(),
            vec!["started", "completed", "stopped"]
        );
    }

    #[tokio::test]
    async fn test_run_once_returns_cycle_error() {
        let store = MockStore::empty().with_find_error(AppError::DatabaseError("down".into()));
        let service = PollService::new(MockFetcher::new(), store, &config("")).unwrap();
        let reporter = RecordingReporter::default();

        assert!(service.run(&reporter).await.is_err());
        assert_eq!(
            *reporter.events.lock().unwrap(),
            vec!["started", "failed", "stopped"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_cycle_error() {
        let store = MockStore::empty().with_find_error(AppError::DatabaseError("down".into()));
        let fetcher = MockFetcher::new().with_page(SITE, &page());
        let service = PollService::new(fetcher, store, &config(r#", "restart": 60"#)).unwrap();
        let reporter = RecordingReporter::default();

        let _ = tokio::time::timeout(Duration::from_secs(90), service.run(&reporter)).await;

        let events = reporter.events.lock().unwrap().clone();
        assert_eq!(
            &events[..5],
            &["started", "failed", "sleeping", "started", "completed"]
        );
    }
}
