pub mod compactor;
pub mod config;
pub mod engine;
pub mod holidays;
pub mod limits;
pub mod model;
pub mod observability;
pub mod rules;
pub mod store;
pub mod wal;
pub mod zone;
