//! Integration tests for end-to-end functionality
//!
//! Tests for:
//! - Complete file loading cycles through every store
//! - Sample integrity while scrolling across a recording

pub mod data_integrity_tests;
pub mod file_loading_tests;
