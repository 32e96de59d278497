pub mod common;
pub mod history;
pub mod info;
pub mod master;
pub mod remote;
pub mod visits;
