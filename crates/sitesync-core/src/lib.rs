//! sitesync-core - Core library for sitesync
//!
//! This crate contains the shared models, local store adapters, the master
//! merge engine, the photo archive codec and the outbound sync client used by
//! the sync server and the operator CLI.

pub mod audit;
pub mod db;
pub mod error;
pub mod merge;
pub mod models;
pub mod photos;
pub mod protocol;
pub mod site;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use merge::{merge_master_snapshot, MergeCounts, MergeResult};
pub use models::{Member, MemberType, Office, Visit};
pub use protocol::{MasterPackage, RemoteSiteConfig, SyncInfoResponse};
