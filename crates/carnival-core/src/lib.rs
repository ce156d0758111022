//! Carnival identity, merge and ownership rules for the Masters Carnival
//! directory.

pub mod admin;
pub mod config;
pub mod error;
pub mod fields;
pub mod matcher;
pub mod model;
pub mod notify;
pub mod ownership;
pub mod resolver;
pub mod rules;
pub mod service;
pub mod store;

pub use admin::MergeReport;
pub use config::{SiteConfig, SiteMode};
pub use error::{CarnivalError, StoreError};
pub use fields::{DescriptiveField, FieldValue, MergeCategory};
pub use matcher::find_match;
pub use model::{
    ActingUser, Carnival, CarnivalDetails, CarnivalId, CarnivalSubmission, ClaimOutcome, ClubId,
    ExternalCarnival, NewCarnival, UserId,
};
pub use notify::{CarnivalEvent, CarnivalNotifier, NoopNotifier, NotifyResult};
pub use service::CarnivalService;
pub use store::{CarnivalStore, CarnivalTx, MemoryCarnivalStore};

pub const CRATE_NAME: &str = "carnival-core";
