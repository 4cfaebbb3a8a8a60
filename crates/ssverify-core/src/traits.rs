use std::future::Future;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Document, Filter, NewDocument, Response, StoredRecord};

/// Fetches a page over HTTP.
///
/// Implementations must return an error for any non-success status.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Response, AppError>> + Send;
}

/// Document collection holding listings and their audit snapshots.
pub trait ListingStore: Send + Sync + Clone {
    /// All documents matching the filter.
    fn find(
        &self,
        filter: &Filter,
    ) -> impl Future<Output = Result<Vec<StoredRecord>, AppError>> + Send;

    /// Insert a single document. Returns the generated identifier.
    fn insert_one(
        &self,
        doc: &NewDocument,
    ) -> impl Future<Output = Result<Uuid, AppError>> + Send;

    /// Insert several documents, returning their identifiers in order.
    fn insert_many(
        &self,
        docs: &[NewDocument],
    ) -> impl Future<Output = Result<Vec<Uuid>, AppError>> + Send;

    /// Merge `set` into the first document matching the filter.
    ///
    /// Returns the matched count; callers treat `0` as an error.
    fn update_one(
        &self,
        filter: &Filter,
        set: &Document,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;
}
