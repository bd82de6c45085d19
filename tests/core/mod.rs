//! Core module tests
//!
//! Tests for:
//! - Recording files and stores
//! - Filter chains
//! - Frame planning and buffer sharing
//! - Filter warm-up
//! - Materialization and traces
//! - View settings persistence

pub mod materialize_tests;
pub mod planner_tests;
pub mod settings_tests;
