//! Report export functionality
//!
//! This module provides functionality for exporting session results in
//! machine-readable form. Currently supports a JSON session report.

pub mod report;

pub use report::{ReportExporter, SessionReport};
