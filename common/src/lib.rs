// Distributed cron scheduling: leader-guarded, minute-driven dispatch of
// registry cron definitions onto job queues

pub mod config;
pub mod cursor;
pub mod errors;
pub mod keys;
pub mod lock;
pub mod models;
pub mod registry;
pub mod schedule;
pub mod scheduler;
pub mod store;
pub mod telemetry;
