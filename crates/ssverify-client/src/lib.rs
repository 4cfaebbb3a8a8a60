pub mod fetcher;
pub mod recorder;

pub use fetcher::ReqwestFetcher;
pub use recorder::RecordingFetcher;
