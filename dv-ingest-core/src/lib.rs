#![doc = "dv-ingest-core: core pipeline library for dv-ingest."]

//! This crate turns bag deposits on disk into ordered mutations of a remote dataset
//! repository. The repository itself is reached only through the
//! [`contract::DatasetRepository`] capability trait; no transport lives here.
//!
//! # Usage
//! Build a [`registry::JobRegistry`] from an [`config::IngestConfig`], a repository client
//! and a [`contract::DepositValidator`] (usually [`task::StructuralValidator`]), then
//! submit deposit or batch directories found under the inbox.

pub mod config;
pub mod contract;
pub mod deposit;
pub mod error;
pub mod file_index;
pub mod job;
pub mod output;
pub mod partition;
pub mod processor;
pub mod properties;
pub mod registry;
pub mod task;
pub mod wait;
pub mod zipper;

pub use error::{ErrorKind, IngestError, Result};
