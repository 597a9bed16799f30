//! Buffered CSV row writer for filter and annotation output.
//!
//! Uses itoa for integer formatting and ryu for float formatting to avoid
//! allocation in the hot path.

use std::io::{BufWriter, Write};

use crate::counts::{Result, StreamError};

/// Buffer size for CsvWriter (1MB default).
const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Comma-delimited row writer.
///
/// Fields are written left to right; `end_row` terminates the record.
pub struct CsvWriter<W: Write> {
    writer: BufWriter<W>,
    itoa_buf: itoa::Buffer,
    ryu_buf: ryu::Buffer,
    at_row_start: bool,
}

impl<W: Write> CsvWriter<W> {
    /// Create a writer with the default buffer.
    pub fn new(output: W) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE, output)
    }

    /// Create a writer with a specific buffer size.
    pub fn with_capacity(capacity: usize, output: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(capacity, output),
            itoa_buf: itoa::Buffer::new(),
            ryu_buf: ryu::Buffer::new(),
            at_row_start: true,
        }
    }

    #[inline]
    fn write_separator(&mut self) -> Result<()> {
        if self.at_row_start {
            self.at_row_start = false;
        } else {
            self.writer.write_all(b",").map_err(StreamError::Io)?;
        }
        Ok(())
    }

    /// Write a string field.
    #[inline]
    pub fn field(&mut self, value: &str) -> Result<()> {
        self.write_separator()?;
        self.writer.write_all(value.as_bytes()).map_err(StreamError::Io)?;
        Ok(())
    }

    /// Write an integer field using itoa.
    #[inline]
    pub fn int_field<I: itoa::Integer>(&mut self, value: I) -> Result<()> {
        self.write_separator()?;
        self.writer
            .write_all(self.itoa_buf.format(value).as_bytes())
            .map_err(StreamError::Io)?;
        Ok(())
    }

    /// Write a float field using ryu. Integral values print without the
    /// trailing `.0` so a zero score reads `0`.
    #[inline]
    pub fn float_field(&mut self, value: f64) -> Result<()> {
        self.write_separator()?;
        let text = self.ryu_buf.format(value);
        let text = text.strip_suffix(".0").unwrap_or(text);
        self.writer.write_all(text.as_bytes()).map_err(StreamError::Io)?;
        Ok(())
    }

    /// Terminate the current row.
    #[inline]
    pub fn end_row(&mut self) -> Result<()> {
        self.writer.write_all(b"\n").map_err(StreamError::Io)?;
        self.at_row_start = true;
        Ok(())
    }

    /// Write a whole row of string fields.
    pub fn row<'a, I>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for field in fields {
            self.field(field)?;
        }
        self.end_row()
    }

    /// Flush the output buffer.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(StreamError::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_fields() {
        let mut output = Vec::new();
        {
            let mut writer = CsvWriter::new(&mut output);
            writer.field("ACGT").unwrap();
            writer.int_field(1u64).unwrap();
            writer.int_field(42u64).unwrap();
            writer.end_row().unwrap();
            writer.flush().unwrap();
        }
        assert_eq!(output, b"ACGT,1,42\n");
    }

    #[test]
    fn test_float_formatting() {
        let mut output = Vec::new();
        {
            let mut writer = CsvWriter::new(&mut output);
            writer.float_field(0.0).unwrap();
            writer.float_field(0.25).unwrap();
            writer.float_field(1.0).unwrap();
            writer.end_row().unwrap();
            writer.flush().unwrap();
        }
        assert_eq!(output, b"0,0.25,1\n");
    }

    #[test]
    fn test_row_helper() {
        let mut output = Vec::new();
        {
            let mut writer = CsvWriter::new(&mut output);
            writer.row(["kmer", "filter", "score"]).unwrap();
            writer.flush().unwrap();
        }
        assert_eq!(output, b"kmer,filter,score\n");
    }
}
