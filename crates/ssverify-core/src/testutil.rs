//! Test utilities: mock implementations of the collaborator traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::{AD_KIND, Document, Filter, NewDocument, Response, StoredRecord};
use crate::traits::{Fetcher, ListingStore};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher serving canned pages by URL.
///
/// Unknown URLs fail with an HTTP 404 error. Every requested URL is recorded.
/// A URL given a delay answers only after sleeping on the tokio clock.
#[derive(Clone, Default)]
pub struct MockFetcher {
    pages: Arc<Mutex<HashMap<String, Result<String, AppError>>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, body: &str) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(body.to_string()));
        self
    }

    /// The error is returned once; later requests for the URL get a 404.
    pub fn with_error(self, url: &str, error: AppError) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(error));
        self
    }

    pub fn with_delay(self, url: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<Response, AppError> {
        self.requested.lock().unwrap().push(url.to_string());
        let delay = self.delays.lock().unwrap().get(url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut pages = self.pages.lock().unwrap();
        match pages.get(url) {
            Some(Ok(body)) => Ok(Response {
                status: 200,
                body: body.clone(),
            }),
            Some(Err(_)) => match pages.remove(url) {
                Some(Err(e)) => Err(e),
                _ => unreachable!(),
            },
            None => Err(AppError::HttpError(format!("HTTP 404 for {url}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

/// In-memory listing store that records every write.
#[derive(Clone, Default)]
pub struct MockStore {
    pub records: Arc<Mutex<Vec<StoredRecord>>>,
    pub inserted: Arc<Mutex<Vec<NewDocument>>>,
    pub updates: Arc<Mutex<Vec<(Filter, Document)>>>,
    zero_match_updates: Arc<Mutex<bool>>,
    insert_error: Arc<Mutex<Option<AppError>>>,
    find_error: Arc<Mutex<Option<AppError>>>,
}

impl MockStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<StoredRecord>) -> Self {
        let store = Self::default();
        *store.records.lock().unwrap() = records;
        store
    }

    /// Every update reports zero matched rows and changes nothing.
    pub fn with_zero_match_updates(self) -> Self {
        *self.zero_match_updates.lock().unwrap() = true;
        self
    }

    /// The next insert fails with this error.
    pub fn with_insert_error(self, error: AppError) -> Self {
        *self.insert_error.lock().unwrap() = Some(error);
        self
    }

    /// The next find fails with this error.
    pub fn with_find_error(self, error: AppError) -> Self {
        *self.find_error.lock().unwrap() = Some(error);
        self
    }

    pub fn get(&self, id: Uuid) -> Option<StoredRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// Number of writes of any kind.
    pub fn write_count(&self) -> usize {
        self.inserted.lock().unwrap().len() + self.updates.lock().unwrap().len()
    }
}

fn matches(record: &StoredRecord, filter: &Filter) -> bool {
    match filter {
        Filter::Kind(kind) => &record.kind == kind,
        Filter::Id(id) => &record.id == id,
    }
}

impl ListingStore for MockStore {
    async fn find(&self, filter: &Filter) -> Result<Vec<StoredRecord>, AppError> {
        if let Some(e) = self.find_error.lock().unwrap().take() {
            return Err(e);
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| matches(r, filter))
            .cloned()
            .collect())
    }

    async fn insert_one(&self, doc: &NewDocument) -> Result<Uuid, AppError> {
        if let Some(e) = self.insert_error.lock().unwrap().take() {
            return Err(e);
        }
        let id = Uuid::new_v4();
        self.inserted.lock().unwrap().push(doc.clone());
        self.records.lock().unwrap().push(StoredRecord {
            id,
            kind: doc.kind.clone(),
            doc: doc.doc.clone(),
        });
        Ok(id)
    }

    async fn insert_many(&self, docs: &[NewDocument]) -> Result<Vec<Uuid>, AppError> {
        let mut ids = Vec::with_capacity(docs.len());
        for doc in docs {
            ids.push(self.insert_one(doc).await?);
        }
        Ok(ids)
    }

    async fn update_one(&self, filter: &Filter, set: &Document) -> Result<u64, AppError> {
        self.updates
            .lock()
            .unwrap()
            .push((filter.clone(), set.clone()));
        if *self.zero_match_updates.lock().unwrap() {
            return Ok(0);
        }
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| matches(r, filter)) {
            Some(record) => {
                for (k, v) in set {
                    record.doc.insert(k.clone(), v.clone());
                }
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// A stored `ad` document built from string fields.
pub fn make_stored_ad(fields: &[(&str, &str)]) -> StoredRecord {
    let mut doc = Document::new();
    for (k, v) in fields {
        doc.insert(k.to_string(), (*v).into());
    }
    StoredRecord {
        id: Uuid::new_v4(),
        kind: AD_KIND.to_string(),
        doc,
    }
}
