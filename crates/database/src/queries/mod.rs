//! Database query operations organized by table

pub mod pending;
pub mod records;
pub mod sync_log;
