//! Domain types shared by the storage layer and the HTTP application.

pub mod report;
pub mod types;
