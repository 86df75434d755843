//! Efficient output formatting for interval streams.
//!
//! Uses itoa for integer formatting to avoid allocation in the hot path.

use crate::bed::BedError;
use crate::interval::BedRecord;
use std::io::{BufWriter, Write};

/// Buffer size for BedWriter (1MB default).
const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Buffered BED output writer.
pub struct BedWriter<W: Write> {
    writer: BufWriter<W>,
    itoa_buf: itoa::Buffer,
}

impl<W: Write> BedWriter<W> {
    /// Create a new BedWriter with the default buffer.
    pub fn new(output: W) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE, output)
    }

    /// Create a new BedWriter with specified buffer size.
    pub fn with_capacity(capacity: usize, output: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(capacity, output),
            itoa_buf: itoa::Buffer::new(),
        }
    }

    /// Write the columns of a record without a trailing newline.
    pub fn write_fields(&mut self, record: &BedRecord) -> Result<(), BedError> {
        self.write_bytes(record.chrom().as_bytes())?;
        self.write_tab()?;
        self.write_int(record.start())?;
        self.write_tab()?;
        self.write_int(record.end())?;
        self.write_tab()?;
        self.write_bytes(record.name.as_bytes())?;
        self.write_tab()?;
        self.write_int(record.score)?;
        self.write_tab()?;
        let strand = [record.strand.as_char() as u8];
        self.write_bytes(&strand)?;
        for field in &record.extra_fields {
            self.write_tab()?;
            self.write_bytes(field.as_bytes())?;
        }
        Ok(())
    }

    /// Write a full record followed by newline.
    #[inline]
    pub fn write_record(&mut self, record: &BedRecord) -> Result<(), BedError> {
        self.write_fields(record)?;
        self.write_newline()
    }

    /// Write raw bytes.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), BedError> {
        self.writer.write_all(bytes).map_err(BedError::Io)
    }

    /// Write a tab character.
    #[inline]
    pub fn write_tab(&mut self) -> Result<(), BedError> {
        self.write_bytes(b"\t")
    }

    /// Write a newline character.
    #[inline]
    pub fn write_newline(&mut self) -> Result<(), BedError> {
        self.write_bytes(b"\n")
    }

    /// Write an integer using itoa.
    #[inline]
    pub fn write_int<I: itoa::Integer>(&mut self, n: I) -> Result<(), BedError> {
        self.writer
            .write_all(self.itoa_buf.format(n).as_bytes())
            .map_err(BedError::Io)
    }

    /// Flush the output buffer.
    pub fn flush(&mut self) -> Result<(), BedError> {
        self.writer.flush().map_err(BedError::Io)
    }
}
