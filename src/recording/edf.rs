//! EDF/EDF+ and BDF/BDF+ header parsing.
//!
//! The header is 256 bytes of fixed-width ASCII fields followed by 256 bytes
//! per signal, stored field-major (all labels, then all transducer types,
//! and so on).

use super::{ChannelInfo, RecordError, RecordingHeader, SampleFormat};
use crate::clock;

/// Size of the fixed part of the header
pub const FIXED_HEADER_LEN: usize = 256;

/// Size of the per-signal part of the header
pub const SIGNAL_HEADER_LEN: usize = 256;

/// Signal header field widths, in storage order
const SIGNAL_FIELDS: [usize; 10] = [16, 80, 8, 8, 8, 8, 8, 80, 8, 32];

/// Detect the sample format from the version field
pub fn detect_format(bytes: &[u8]) -> Option<SampleFormat> {
    if bytes.len() < 8 {
        return None;
    }
    if bytes[0] == 0xFF && &bytes[1..8] == b"BIOSEMI" {
        Some(SampleFormat::Bdf24)
    } else if &bytes[0..8] == b"0       " {
        Some(SampleFormat::Edf16)
    } else {
        None
    }
}

/// Total header length declared by the fixed part, validated against the
/// number of signals
pub fn header_len(fixed: &[u8]) -> Result<usize, RecordError> {
    if fixed.len() < FIXED_HEADER_LEN {
        return Err(RecordError::InvalidHeader(format!(
            "header is {} bytes, need at least {}",
            fixed.len(),
            FIXED_HEADER_LEN
        )));
    }
    let signals: usize = parse_field(fixed, 252, 4, "number of signals")?;
    let declared: usize = parse_field(fixed, 184, 8, "header bytes")?;
    let expected = FIXED_HEADER_LEN + signals * SIGNAL_HEADER_LEN;
    if declared != expected {
        return Err(RecordError::InvalidHeader(format!(
            "header bytes field is {}, expected {} for {} signals",
            declared, expected, signals
        )));
    }
    Ok(expected)
}

fn field(bytes: &[u8], start: usize, len: usize) -> String {
    String::from_utf8_lossy(&bytes[start..start + len]).trim().to_string()
}

fn parse_field<T: std::str::FromStr>(bytes: &[u8], start: usize, len: usize, name: &str) -> Result<T, RecordError> {
    let text = field(bytes, start, len);
    text.parse()
        .map_err(|_| RecordError::InvalidHeader(format!("invalid {} '{}'", name, text)))
}

/// Parse a complete header.
///
/// `file_len` resolves a record count of `-1` (recording still in
/// progress) from the file size; without it such headers are rejected.
pub fn parse_header(bytes: &[u8], file_len: Option<u64>) -> Result<RecordingHeader, RecordError> {
    let format = detect_format(bytes)
        .ok_or_else(|| RecordError::InvalidHeader("unknown version field".to_string()))?;
    let total_len = header_len(bytes)?;
    if bytes.len() < total_len {
        return Err(RecordError::InvalidHeader(format!(
            "header is {} bytes, declared {}",
            bytes.len(),
            total_len
        )));
    }

    let patient_id = field(bytes, 8, 80);
    let recording_id = field(bytes, 88, 80);
    let start = clock::parse_header_datetime(&field(bytes, 168, 8), &field(bytes, 176, 8));
    let declared_records: i64 = parse_field(bytes, 236, 8, "number of data records")?;
    let duration_text = field(bytes, 244, 8);
    let record_duration = clock::parse_seconds_exact(&duration_text)
        .filter(|&d| d > 0)
        .ok_or_else(|| RecordError::InvalidHeader(format!("invalid record duration '{}'", duration_text)))?;
    let signals: usize = parse_field(bytes, 252, 4, "number of signals")?;
    if signals == 0 {
        return Err(RecordError::InvalidHeader("recording has no signals".to_string()));
    }

    let channels = parse_signal_headers(&bytes[FIXED_HEADER_LEN..total_len], signals)?;

    let mut header = RecordingHeader::new(
        format,
        total_len as u64,
        0,
        record_duration,
        clock::datetime_to_ticks(start),
        channels,
    );
    header.patient_id = patient_id;
    header.recording_id = recording_id;

    if header.record_size() == 0 {
        return Err(RecordError::InvalidHeader("data record size is zero".to_string()));
    }

    header.record_count = match (declared_records, file_len) {
        (n, _) if n >= 0 => n as u64,
        (-1, Some(len)) => len.saturating_sub(total_len as u64) / header.record_size() as u64,
        _ => {
            return Err(RecordError::InvalidHeader(format!(
                "invalid number of data records {}",
                declared_records
            )))
        }
    };

    tracing::debug!(
        "Parsed {:?} header: {} signals, {} records of {}",
        format,
        signals,
        header.record_count,
        clock::format_offset(record_duration)
    );

    Ok(header)
}

fn parse_signal_headers(bytes: &[u8], signals: usize) -> Result<Vec<ChannelInfo>, RecordError> {
    // Start offset of each field block
    let mut starts = [0usize; SIGNAL_FIELDS.len()];
    let mut acc = 0;
    for (i, width) in SIGNAL_FIELDS.iter().enumerate() {
        starts[i] = acc;
        acc += width * signals;
    }
    let at = |field_idx: usize, signal: usize| -> (usize, usize) {
        let width = SIGNAL_FIELDS[field_idx];
        (starts[field_idx] + signal * width, width)
    };

    let mut channels = Vec::with_capacity(signals);
    for s in 0..signals {
        let (o, w) = at(0, s);
        let label = field(bytes, o, w);
        let (o, w) = at(2, s);
        let dimension = field(bytes, o, w);
        let (o, w) = at(3, s);
        let phys_min: f64 = parse_field(bytes, o, w, "physical minimum")?;
        let (o, w) = at(4, s);
        let phys_max: f64 = parse_field(bytes, o, w, "physical maximum")?;
        let (o, w) = at(5, s);
        let dig_min: i64 = parse_field(bytes, o, w, "digital minimum")?;
        let (o, w) = at(6, s);
        let dig_max: i64 = parse_field(bytes, o, w, "digital maximum")?;
        let (o, w) = at(8, s);
        let samples_per_record: usize = parse_field(bytes, o, w, "samples per record")?;

        let mut channel = ChannelInfo::new(label, samples_per_record).with_dimension(dimension);
        if !channel.is_annotation {
            if dig_max <= dig_min {
                return Err(RecordError::InvalidHeader(format!(
                    "signal '{}': digital maximum {} not above minimum {}",
                    channel.label, dig_max, dig_min
                )));
            }
            if phys_max == phys_min {
                return Err(RecordError::InvalidHeader(format!(
                    "signal '{}': physical maximum equals minimum",
                    channel.label
                )));
            }
            let gain = (phys_max - phys_min) / (dig_max - dig_min) as f64;
            let offset = phys_max / gain - dig_max as f64;
            channel = channel.with_scaling(gain, offset);
        }
        channels.push(channel);
    }
    Ok(channels)
}

/// Number of whole records a file of `file_len` bytes holds
pub fn available_records(header: &RecordingHeader, file_len: u64) -> u64 {
    file_len.saturating_sub(header.header_bytes) / header.record_size().max(1) as u64
}

/// Reject files shorter than the header declares
pub fn check_file_len(header: &RecordingHeader, file_len: u64) -> Result<(), RecordError> {
    let available = available_records(header, file_len);
    if available < header.record_count {
        return Err(RecordError::Truncated {
            declared: header.record_count,
            available,
        });
    }
    Ok(())
}

/// Write a header for the given layout.
///
/// Used by tests and tools that synthesize recordings; physical and digital
/// ranges are derived from each channel's scaling over the full digital
/// range of the format.
pub fn write_header(header: &RecordingHeader) -> Vec<u8> {
    let signals = header.channels.len();
    let mut out = Vec::with_capacity(FIXED_HEADER_LEN + signals * SIGNAL_HEADER_LEN);

    let put = |out: &mut Vec<u8>, text: &str, width: usize| {
        let mut bytes: Vec<u8> = text.bytes().take(width).collect();
        bytes.resize(width, b' ');
        out.extend_from_slice(&bytes);
    };

    match header.format {
        SampleFormat::Edf16 => put(&mut out, "0", 8),
        SampleFormat::Bdf24 => {
            out.push(0xFF);
            put(&mut out, "BIOSEMI", 7);
        }
    }
    put(&mut out, &header.patient_id, 80);
    put(&mut out, &header.recording_id, 80);
    let start = clock::ticks_to_datetime(header.start_time);
    put(&mut out, &start.format("%d.%m.%y").to_string(), 8);
    put(&mut out, &start.format("%H.%M.%S").to_string(), 8);
    put(&mut out, &(FIXED_HEADER_LEN + signals * SIGNAL_HEADER_LEN).to_string(), 8);
    let reserved = match header.format {
        SampleFormat::Edf16 => "",
        SampleFormat::Bdf24 => "24BIT",
    };
    put(&mut out, reserved, 44);
    put(&mut out, &header.record_count.to_string(), 8);
    put(&mut out, &format_duration(header.record_duration), 8);
    put(&mut out, &signals.to_string(), 4);

    let (dig_min, dig_max): (i64, i64) = match header.format {
        SampleFormat::Edf16 => (-32768, 32767),
        SampleFormat::Bdf24 => (-8_388_608, 8_388_607),
    };

    for c in &header.channels {
        put(&mut out, &c.label, 16);
    }
    for _ in &header.channels {
        put(&mut out, "", 80);
    }
    for c in &header.channels {
        put(&mut out, &c.physical_dimension, 8);
    }
    for c in &header.channels {
        put(&mut out, &format_number(c.to_physical(dig_min as i32)), 8);
    }
    for c in &header.channels {
        put(&mut out, &format_number(c.to_physical(dig_max as i32)), 8);
    }
    for _ in &header.channels {
        put(&mut out, &dig_min.to_string(), 8);
    }
    for _ in &header.channels {
        put(&mut out, &dig_max.to_string(), 8);
    }
    for _ in &header.channels {
        put(&mut out, "", 80);
    }
    for c in &header.channels {
        put(&mut out, &c.samples_per_record.to_string(), 8);
    }
    for _ in &header.channels {
        put(&mut out, "", 32);
    }

    out
}

fn format_duration(ticks: i64) -> String {
    let whole = ticks / clock::TICKS_PER_SECOND;
    let frac = ticks % clock::TICKS_PER_SECOND;
    if frac == 0 {
        whole.to_string()
    } else {
        let digits = format!("{:07}", frac);
        format!("{}.{}", whole, digits.trim_end_matches('0'))
    }
}

fn format_number(value: f64) -> String {
    let mut text = format!("{}", value);
    if text.len() > 8 {
        text = format!("{:.0}", value);
    }
    text
}
