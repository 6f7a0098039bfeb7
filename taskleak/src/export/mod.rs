//! Leak report formatting and export
//!
//! This module turns the detector's final unexpected-task list into text for
//! test output and JSON for tooling.

pub mod report;

pub use report::LeakReport;
