//! Durable transcription history and batch job orchestration on SQLite.
//!
//! [`HistoryStore`] keeps finished transcriptions with full-text search;
//! [`BatchOrchestrator`] tracks multi-file jobs through their lifecycle.
//! Both open the same store file independently and must be initialized
//! before use.

pub mod config;
pub mod db;
pub mod error;
pub mod history;
pub mod model;
pub mod orchestrator;
pub mod runner;
pub mod transcriber;

pub use error::{Result, StoreError};
pub use history::HistoryStore;
pub use orchestrator::BatchOrchestrator;
