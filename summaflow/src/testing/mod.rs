//! Testing utilities for summaflow.
//!
//! This module provides:
//! - [`MockBackend`], a deterministic in-process ML backend
//! - Fixtures for SAMSum CSV files, dataset archives and a small tokenizer
//! - Helpers to build a [`crate::stages::StageContext`] over in-memory storage

pub mod fixtures;
mod mocks;

pub use mocks::{MockBackend, MOCK_SCORE_FILE};
