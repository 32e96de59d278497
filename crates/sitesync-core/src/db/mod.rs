//! Local store adapters for the master and visits files

mod connection;
mod master;
mod migrations;
mod visits;

pub use connection::{
    open_read_only, open_read_write, probe_store, probe_store_bytes, SQLITE_HEADER,
};
pub use master::{list_settings, upsert_setting, MasterRow, MasterStore};
pub use visits::VisitsStore;
