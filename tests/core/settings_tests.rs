//! Tests for view settings persistence
//!
//! Tests cover:
//! - Default settings values
//! - Serialization/deserialization with missing fields
//! - Save/load round trip through a file
//! - Config path handling
//! - Buffer ceiling override

use edfview::clock::TICKS_PER_SECOND;
use edfview::settings::{platform_buffer_ceiling, ViewSettings};

use crate::common::temp_path;

// ============================================
// Default Settings Tests
// ============================================

#[test]
fn test_settings_defaults() {
    let settings = ViewSettings::default();
    assert_eq!(settings.version, 1);
    assert_eq!(settings.default_page_time, 10 * TICKS_PER_SECOND);
    assert_eq!(settings.fallback_page_time, TICKS_PER_SECOND);
    assert_eq!(settings.buffer_ceiling, None);
    assert!(!settings.parallel_traces);
}

#[test]
fn test_platform_ceiling() {
    let ceiling = platform_buffer_ceiling();
    if cfg!(target_pointer_width = "64") {
        assert_eq!(ceiling, u32::MAX as u64 * 32);
    } else {
        assert_eq!(ceiling, u32::MAX as u64);
    }
    assert_eq!(ViewSettings::default().buffer_ceiling(), ceiling);
}

#[test]
fn test_ceiling_override() {
    let settings = ViewSettings {
        buffer_ceiling: Some(4096),
        ..ViewSettings::default()
    };
    assert_eq!(settings.buffer_ceiling(), 4096);
}

// ============================================
// Serialization Tests
// ============================================

#[test]
fn test_settings_deserialize_empty_object() {
    // All fields should use defaults for empty object
    let settings: ViewSettings = serde_json::from_str("{}").unwrap();
    assert_eq!(settings, ViewSettings::default());
}

#[test]
fn test_settings_deserialize_partial() {
    let json = r#"{"parallel_traces":true,"buffer_ceiling":1000000}"#;
    let settings: ViewSettings = serde_json::from_str(json).unwrap();

    assert!(settings.parallel_traces);
    assert_eq!(settings.buffer_ceiling, Some(1_000_000));
    assert_eq!(settings.version, 1);
    assert_eq!(settings.default_page_time, 10 * TICKS_PER_SECOND);
}

#[test]
fn test_settings_roundtrip() {
    let original = ViewSettings {
        version: 1,
        default_page_time: 30 * TICKS_PER_SECOND,
        fallback_page_time: TICKS_PER_SECOND / 2,
        buffer_ceiling: Some(1 << 20),
        parallel_traces: true,
    };

    let json = serde_json::to_string_pretty(&original).unwrap();
    assert!(json.contains('\n'));
    let restored: ViewSettings = serde_json::from_str(&json).unwrap();
    assert_eq!(original, restored);
}

// ============================================
// File Tests
// ============================================

#[test]
fn test_save_and_load_file() {
    let path = temp_path("settings_roundtrip").with_extension("json");
    let settings = ViewSettings {
        parallel_traces: true,
        ..ViewSettings::default()
    };

    settings.save_to(&path).unwrap();
    let loaded = ViewSettings::load_from(&path);
    std::fs::remove_file(&path).ok();

    assert_eq!(loaded, settings);
}

#[test]
fn test_load_missing_file_gives_defaults() {
    let path = temp_path("settings_missing").with_extension("json");
    std::fs::remove_file(&path).ok();
    assert_eq!(ViewSettings::load_from(&path), ViewSettings::default());
}

#[test]
fn test_load_malformed_file_gives_defaults() {
    let path = temp_path("settings_malformed").with_extension("json");
    std::fs::write(&path, "{ not json").unwrap();
    let loaded = ViewSettings::load_from(&path);
    std::fs::remove_file(&path).ok();

    assert_eq!(loaded, ViewSettings::default());
}

// ============================================
// Config Path Tests
// ============================================

#[test]
fn test_settings_path_filename() {
    if let Some(path) = ViewSettings::get_settings_path() {
        let filename = path.file_name().unwrap().to_string_lossy();
        assert_eq!(filename, "view_settings.json");
    }
}

#[test]
fn test_config_dir_contains_edfview() {
    if let Some(path) = ViewSettings::get_config_dir() {
        let path_str = path.to_string_lossy().to_lowercase();
        assert!(path_str.contains("edfview"), "Config dir should contain 'edfview'");
    }
}
