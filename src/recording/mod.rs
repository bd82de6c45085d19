//! Open recordings and record-granular access to their sample data.
//!
//! A recording is a header followed by a sequence of fixed-size data
//! records. Each record holds, channel after channel, `samples_per_record`
//! little-endian samples for every channel. The [`RecordStore`] trait is the
//! only way the view-buffer code touches the data: it reads whole records,
//! and any failed seek or short read surfaces as an error.

pub mod edf;
pub mod store;

pub use store::{FileStore, MappedStore, MemoryStore};

use serde::Serialize;
use thiserror::Error;

use crate::clock::TICKS_PER_SECOND;

/// Labels that mark an annotation channel rather than a signal
pub const ANNOTATION_LABELS: &[&str] = &["EDF Annotations", "BDF Annotations"];

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while opening or reading a recording
#[derive(Debug, Error)]
pub enum RecordError {
    /// Seek or read failed at the OS level
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fewer bytes were available than the requested records occupy
    #[error("Short read at record {record}: expected {expected} bytes, got {got}")]
    ShortRead {
        record: u64,
        expected: usize,
        got: usize,
    },

    /// The requested record range is not inside the recording
    #[error("Records {start}..{end} are outside the recording ({total} records)")]
    OutOfRange { start: u64, end: u64, total: u64 },

    /// The header could not be parsed
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// The file is shorter than the header declares
    #[error("File is truncated: header declares {declared} records, file holds {available}")]
    Truncated { declared: u64, available: u64 },
}

// ============================================================================
// Sample decoding
// ============================================================================

/// On-disk sample encoding
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SampleFormat {
    /// 16-bit little-endian two's complement (EDF, EDF+)
    Edf16,
    /// 24-bit little-endian two's complement (BDF, BDF+)
    Bdf24,
}

impl SampleFormat {
    /// Size of one sample in bytes
    #[inline]
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::Edf16 => 2,
            SampleFormat::Bdf24 => 3,
        }
    }
}

/// Decode one sample from the start of `bytes`.
///
/// The 24-bit case is sign-extended into 32 bits from the high bit of the
/// third byte. `bytes` must hold at least [`SampleFormat::bytes_per_sample`]
/// bytes.
#[inline]
pub fn decode_sample(format: SampleFormat, bytes: &[u8]) -> i32 {
    match format {
        SampleFormat::Edf16 => i16::from_le_bytes([bytes[0], bytes[1]]) as i32,
        SampleFormat::Bdf24 => {
            let raw = bytes[0] as u32 | (bytes[1] as u32) << 8 | (bytes[2] as u32) << 16;
            if bytes[2] & 0x80 != 0 {
                (raw | 0xFF00_0000) as i32
            } else {
                raw as i32
            }
        }
    }
}

// ============================================================================
// Header types
// ============================================================================

/// One channel of a recording
#[derive(Clone, Debug, Serialize)]
pub struct ChannelInfo {
    pub label: String,
    pub physical_dimension: String,
    pub samples_per_record: usize,
    /// Byte offset of this channel's first sample within a data record
    pub byte_offset: usize,
    /// Physical units per digital step
    pub gain: f64,
    /// Digital offset added before scaling
    pub offset: f64,
    pub is_annotation: bool,
}

impl ChannelInfo {
    /// Channel with unit scaling and no offset
    pub fn new(label: impl Into<String>, samples_per_record: usize) -> Self {
        let label = label.into();
        let is_annotation = ANNOTATION_LABELS.contains(&label.trim());
        Self {
            label,
            physical_dimension: String::new(),
            samples_per_record,
            byte_offset: 0,
            gain: 1.0,
            offset: 0.0,
            is_annotation,
        }
    }

    /// Set the digital-to-physical conversion
    pub fn with_scaling(mut self, gain: f64, offset: f64) -> Self {
        self.gain = gain;
        self.offset = offset;
        self
    }

    /// Set the physical dimension (e.g. "uV")
    pub fn with_dimension(mut self, dimension: impl Into<String>) -> Self {
        self.physical_dimension = dimension.into();
        self
    }

    /// Convert a digital sample to physical units
    #[inline]
    pub fn to_physical(&self, digital: i32) -> f64 {
        self.gain * (digital as f64 + self.offset)
    }
}

/// Immutable description of an open recording
#[derive(Clone, Debug, Serialize)]
pub struct RecordingHeader {
    pub format: SampleFormat,
    pub patient_id: String,
    pub recording_id: String,
    /// Byte offset of the first data record
    pub header_bytes: u64,
    pub record_count: u64,
    /// Duration of one data record in ticks
    pub record_duration: i64,
    /// Recording start in ticks since 1970-01-01 00:00:00
    pub start_time: i64,
    pub channels: Vec<ChannelInfo>,
    record_size: usize,
}

impl RecordingHeader {
    /// Build a header, laying out channel byte offsets in declaration order
    pub fn new(
        format: SampleFormat,
        header_bytes: u64,
        record_count: u64,
        record_duration: i64,
        start_time: i64,
        mut channels: Vec<ChannelInfo>,
    ) -> Self {
        let bps = format.bytes_per_sample();
        let mut offset = 0;
        for channel in &mut channels {
            channel.byte_offset = offset;
            offset += channel.samples_per_record * bps;
        }

        Self {
            format,
            patient_id: String::new(),
            recording_id: String::new(),
            header_bytes,
            record_count,
            record_duration,
            start_time,
            channels,
            record_size: offset,
        }
    }

    /// Size of one data record in bytes
    #[inline]
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Duration of one data record in ticks
    #[inline]
    pub fn record_duration(&self) -> i64 {
        self.record_duration
    }

    /// Number of data records in the recording
    #[inline]
    pub fn total_records(&self) -> u64 {
        self.record_count
    }

    /// Total duration in ticks
    pub fn duration(&self) -> i64 {
        self.record_duration.saturating_mul(self.record_count as i64)
    }

    /// Sample rate of a channel in Hz
    pub fn sample_rate(&self, channel: usize) -> Option<f64> {
        let info = self.channels.get(channel)?;
        Some(info.samples_per_record as f64 * TICKS_PER_SECOND as f64 / self.record_duration as f64)
    }

    /// Byte offset of a channel within a data record
    pub fn byte_offset(&self, channel: usize) -> Option<usize> {
        self.channels.get(channel).map(|c| c.byte_offset)
    }

    /// Channels that carry signal data
    pub fn signal_channels(&self) -> impl Iterator<Item = (usize, &ChannelInfo)> {
        self.channels.iter().enumerate().filter(|(_, c)| !c.is_annotation)
    }

    /// Find a channel index by label (case-insensitive, trimmed)
    pub fn find_channel(&self, label: &str) -> Option<usize> {
        self.channels
            .iter()
            .position(|c| c.label.trim().eq_ignore_ascii_case(label.trim()))
    }
}

// ============================================================================
// Store trait
// ============================================================================

/// Record-granular access to one open recording.
///
/// Implementations perform no retries: a failed seek or a short read is
/// returned to the caller, which abandons the current frame.
pub trait RecordStore: Send {
    /// The recording's header
    fn header(&self) -> &RecordingHeader;

    /// Read `count` consecutive records starting at `start_record` into
    /// `out`, which must be exactly `count * record_size` bytes long.
    fn read_records(&mut self, start_record: u64, count: usize, out: &mut [u8]) -> Result<(), RecordError>;
}

/// Check a read request against the header bounds
pub(crate) fn check_range(header: &RecordingHeader, start_record: u64, count: usize, out_len: usize) -> Result<(), RecordError> {
    let end = start_record + count as u64;
    if end > header.record_count {
        return Err(RecordError::OutOfRange {
            start: start_record,
            end,
            total: header.record_count,
        });
    }
    let expected = count * header.record_size();
    if out_len != expected {
        return Err(RecordError::ShortRead {
            record: start_record,
            expected,
            got: out_len,
        });
    }
    Ok(())
}
