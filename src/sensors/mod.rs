pub mod ingest;
pub mod service;

pub use ingest::{BatchIngest, Ingested, ReadingIngestor};
pub use service::{BatchReport, DispatchFailure, Processed, SensorService};
