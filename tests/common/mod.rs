//! Common test utilities shared across all test modules
//!
//! This module provides synthetic recordings, store doubles that observe
//! or break I/O, and assertion helpers.

#![allow(dead_code)]

use std::path::PathBuf;

/// Path for a scratch file unique to this test process
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("edfview_it_{}_{}.edf", name, std::process::id()))
}

/// Test data generators for synthetic recordings
pub mod synthetic {
    use edfview::clock::TICKS_PER_SECOND;
    use edfview::recording::edf::write_header;
    use edfview::recording::{ChannelInfo, MemoryStore, RecordingHeader, SampleFormat};

    /// Encode one digital sample in the given format
    pub fn encode(format: SampleFormat, value: i32) -> Vec<u8> {
        match format {
            SampleFormat::Edf16 => (value as i16).to_le_bytes().to_vec(),
            SampleFormat::Bdf24 => value.to_le_bytes()[..3].to_vec(),
        }
    }

    /// Header with one-second records and unit-scaled channels
    pub fn header(format: SampleFormat, records: u64, channels: &[(&str, usize)]) -> RecordingHeader {
        let channels: Vec<ChannelInfo> = channels
            .iter()
            .map(|(label, spr)| ChannelInfo::new(*label, *spr).with_dimension("uV"))
            .collect();
        let header_bytes = 256 * (channels.len() as u64 + 1);
        RecordingHeader::new(format, header_bytes, records, TICKS_PER_SECOND, 0, channels)
    }

    /// Data records for `header`, with sample `n` of channel `c` equal to
    /// `value(c, n)`; `n` counts from the recording start
    pub fn records(header: &RecordingHeader, value: impl Fn(usize, u64) -> i32) -> Vec<u8> {
        let mut data = Vec::with_capacity(header.record_size() * header.total_records() as usize);
        for record in 0..header.total_records() {
            for (c, channel) in header.channels.iter().enumerate() {
                let spr = channel.samples_per_record as u64;
                for i in 0..spr {
                    data.extend(encode(header.format, value(c, record * spr + i)));
                }
            }
        }
        data
    }

    /// In-memory recording filled by `value`
    pub fn store(
        format: SampleFormat,
        records_count: u64,
        channels: &[(&str, usize)],
        value: impl Fn(usize, u64) -> i32,
    ) -> MemoryStore {
        let header = header(format, records_count, channels);
        let data = records(&header, value);
        MemoryStore::new(header, data)
    }

    /// Digital value of sample `n` of a sine wave sampled `spr` times a second
    pub fn sine_value(n: u64, spr: usize, hz: f64, dc: i32) -> i32 {
        let t = n as f64 / spr as f64;
        dc + (1000.0 * (2.0 * std::f64::consts::PI * hz * t).sin()).round() as i32
    }

    /// Single-channel recording of a sine wave plus a DC offset
    pub fn sine_store(format: SampleFormat, records_count: u64, spr: usize, hz: f64, dc: i32) -> MemoryStore {
        store(format, records_count, &[("EEG", spr)], |_, n| sine_value(n, spr, hz, dc))
    }

    /// Complete file image: header followed by data records
    pub fn file_image(header: &RecordingHeader, value: impl Fn(usize, u64) -> i32) -> Vec<u8> {
        let mut image = write_header(header);
        image.extend(records(header, value));
        image
    }
}

/// Record store doubles
pub mod doubles {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use edfview::recording::{MemoryStore, RecordError, RecordStore, RecordingHeader};

    /// Observations shared between a [`CountingStore`] and the test
    #[derive(Clone, Default)]
    pub struct ReadLog {
        calls: Arc<AtomicUsize>,
        ranges: Arc<Mutex<Vec<(u64, usize)>>>,
    }

    impl ReadLog {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// `(start_record, count)` of every read, in order
        pub fn ranges(&self) -> Vec<(u64, usize)> {
            self.ranges.lock().unwrap().clone()
        }

        pub fn clear(&self) {
            self.calls.store(0, Ordering::SeqCst);
            self.ranges.lock().unwrap().clear();
        }
    }

    /// Store that records every read it serves
    pub struct CountingStore {
        inner: MemoryStore,
        log: ReadLog,
    }

    impl CountingStore {
        pub fn new(inner: MemoryStore) -> (Self, ReadLog) {
            let log = ReadLog::default();
            (
                Self {
                    inner,
                    log: log.clone(),
                },
                log,
            )
        }
    }

    impl RecordStore for CountingStore {
        fn header(&self) -> &RecordingHeader {
            self.inner.header()
        }

        fn read_records(&mut self, start: u64, count: usize, out: &mut [u8]) -> Result<(), RecordError> {
            self.log.calls.fetch_add(1, Ordering::SeqCst);
            self.log.ranges.lock().unwrap().push((start, count));
            self.inner.read_records(start, count, out)
        }
    }

    /// Store whose reads fail once `fail` is set
    pub struct FailingStore {
        pub inner: MemoryStore,
        pub fail: Arc<AtomicBool>,
    }

    impl RecordStore for FailingStore {
        fn header(&self) -> &RecordingHeader {
            self.inner.header()
        }

        fn read_records(&mut self, start: u64, count: usize, out: &mut [u8]) -> Result<(), RecordError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(RecordError::ShortRead {
                    record: start,
                    expected: out.len(),
                    got: 0,
                });
            }
            self.inner.read_records(start, count, out)
        }
    }
}

/// Assertion helpers for common test patterns
pub mod assertions {
    /// Assert two floats agree within `tolerance`
    pub fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "Expected {} within {} of {}",
            actual,
            tolerance,
            expected
        );
    }
}
