pub mod alerts;
pub mod api;
pub mod config;
pub mod context;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod messaging;
pub mod notifications;
pub mod notifier;
pub mod payload_archive;
pub mod sensors;
pub mod storage;
pub mod thresholds;
