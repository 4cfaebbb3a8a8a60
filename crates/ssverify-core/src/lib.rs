pub mod assembler;
pub mod config;
pub mod error;
pub mod extract;
pub mod lexer;
pub mod models;
pub mod parser;
pub mod poll;
pub mod policy;
pub mod reconcile;
pub mod traits;

#[cfg(test)]
pub mod testutil;

pub use assembler::{MarkerMatcher, RecordAssembler};
pub use config::AppConfig;
pub use error::AppError;
pub use extract::SiteExtractor;
pub use models::{AddressIndex, ListingRecord, StoredRecord};
pub use parser::{ParserConfig, TagStreamParser};
pub use poll::{CycleReport, PollEvent, PollReporter, PollService, TracingPollReporter};
pub use policy::{FieldPolicy, PolicyTable};
pub use reconcile::{FieldOutcome, ReconcileContext, ReconcileReport, RecordStatus};
pub use traits::{Fetcher, ListingStore};
