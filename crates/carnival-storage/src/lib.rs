//! Postgres persistence, raw snapshot archive and HTTP fetch utilities.

pub mod archive;
pub mod fetch;
pub mod pg;

pub use archive::{Snapshot, SnapshotArchive};
pub use fetch::{BackoffPolicy, FetchError, FetchedPage, FetcherConfig, HttpFetcher};
pub use pg::PgCarnivalStore;

pub const CRATE_NAME: &str = "carnival-storage";
