//! [`RecordStore`] implementations: buffered file access, memory-mapped
//! access and an in-memory store.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use memmap2::Mmap;

use super::{check_range, edf, RecordError, RecordStore, RecordingHeader};

/// Read and parse the header at the start of `file`
fn read_header(file: &mut File) -> Result<RecordingHeader, RecordError> {
    let file_len = file.metadata()?.len();

    let mut fixed = vec![0u8; edf::FIXED_HEADER_LEN];
    file.seek(SeekFrom::Start(0))?;
    read_fully(file, &mut fixed, 0)?;
    let total = edf::header_len(&fixed)?;

    let mut bytes = fixed;
    bytes.resize(total, 0);
    read_fully(file, &mut bytes[edf::FIXED_HEADER_LEN..], 0)?;

    let header = edf::parse_header(&bytes, Some(file_len))?;
    edf::check_file_len(&header, file_len)?;
    Ok(header)
}

/// Fill `buf` from the current position; a premature end of file is a
/// [`RecordError::ShortRead`]
fn read_fully(file: &mut File, buf: &mut [u8], record: u64) -> Result<(), RecordError> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(RecordError::ShortRead {
                    record,
                    expected: buf.len(),
                    got: filled,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

// ============================================================================
// File store
// ============================================================================

/// Seek-and-read access to a recording on disk
pub struct FileStore {
    file: File,
    header: RecordingHeader,
}

impl FileStore {
    /// Open a recording and parse its header
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecordError> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let header = read_header(&mut file)?;
        tracing::info!(
            "Opened {}: {} channels, {} records",
            path.display(),
            header.channels.len(),
            header.record_count
        );
        Ok(Self { file, header })
    }
}

impl RecordStore for FileStore {
    fn header(&self) -> &RecordingHeader {
        &self.header
    }

    fn read_records(&mut self, start_record: u64, count: usize, out: &mut [u8]) -> Result<(), RecordError> {
        check_range(&self.header, start_record, count, out.len())?;
        if count == 0 {
            return Ok(());
        }
        let pos = self.header.header_bytes + start_record * self.header.record_size() as u64;
        self.file.seek(SeekFrom::Start(pos))?;
        read_fully(&mut self.file, out, start_record)
    }
}

// ============================================================================
// Memory-mapped store
// ============================================================================

/// Memory-mapped access to a recording on disk
pub struct MappedStore {
    map: Mmap,
    header: RecordingHeader,
}

impl MappedStore {
    /// Map a recording read-only and parse its header
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecordError> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let header = read_header(&mut file)?;
        // SAFETY: the mapping is read-only; a file truncated underneath us
        // is caught by the length check in read_records.
        let map = unsafe { Mmap::map(&file)? };
        tracing::info!("Mapped {} ({} bytes)", path.display(), map.len());
        Ok(Self { map, header })
    }
}

impl RecordStore for MappedStore {
    fn header(&self) -> &RecordingHeader {
        &self.header
    }

    fn read_records(&mut self, start_record: u64, count: usize, out: &mut [u8]) -> Result<(), RecordError> {
        check_range(&self.header, start_record, count, out.len())?;
        let start = (self.header.header_bytes + start_record * self.header.record_size() as u64) as usize;
        let end = start + out.len();
        if end > self.map.len() {
            return Err(RecordError::ShortRead {
                record: start_record,
                expected: out.len(),
                got: self.map.len().saturating_sub(start),
            });
        }
        out.copy_from_slice(&self.map[start..end]);
        Ok(())
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// A recording held entirely in memory.
///
/// `data` holds the data records only, without the header.
#[derive(Clone)]
pub struct MemoryStore {
    header: RecordingHeader,
    data: Vec<u8>,
}

impl MemoryStore {
    pub fn new(header: RecordingHeader, data: Vec<u8>) -> Self {
        Self { header, data }
    }

    /// Parse a complete file image (header followed by records)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        let header = edf::parse_header(bytes, Some(bytes.len() as u64))?;
        edf::check_file_len(&header, bytes.len() as u64)?;
        let data = bytes[header.header_bytes as usize..].to_vec();
        Ok(Self { header, data })
    }
}

impl RecordStore for MemoryStore {
    fn header(&self) -> &RecordingHeader {
        &self.header
    }

    fn read_records(&mut self, start_record: u64, count: usize, out: &mut [u8]) -> Result<(), RecordError> {
        check_range(&self.header, start_record, count, out.len())?;
        let start = start_record as usize * self.header.record_size();
        let end = start + out.len();
        if end > self.data.len() {
            return Err(RecordError::ShortRead {
                record: start_record,
                expected: out.len(),
                got: self.data.len().saturating_sub(start),
            });
        }
        out.copy_from_slice(&self.data[start..end]);
        Ok(())
    }
}
