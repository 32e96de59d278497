//! Site-to-site transfer: the outbound sync client and the helpers that build
//! and apply master packages on either side of the wire.

mod client;
mod package;

pub use client::SyncClient;
pub use package::{apply_master_merge, apply_master_overwrite, build_master_package, AppliedPackage};
