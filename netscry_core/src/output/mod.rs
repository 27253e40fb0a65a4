//! Output formatting.
//!
//! Every admitted record passes through exactly one writer, which is the
//! single ordering point for the run: concurrent providers hand records to
//! the engine's channel, and the consumer loop feeds them here one at a
//! time. Both formats emit exactly one line per record, so record counts
//! are identical across formats by construction.

use crate::error::Result;
use crate::types::{AssetRecord, OutputFormat};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Line-oriented sink over stdout or a file.
pub struct OutputWriter {
    sink: Box<dyn Write + Send>,
    format: OutputFormat,
    written: usize,
}

impl OutputWriter {
    pub fn stdout(format: OutputFormat) -> Self {
        Self {
            sink: Box::new(io::stdout()),
            format,
            written: 0,
        }
    }

    pub fn file(path: &Path, format: OutputFormat) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            sink: Box::new(BufWriter::new(file)),
            format,
            written: 0,
        })
    }

    /// Writer over any sink, used by tests to capture output.
    pub fn new(sink: Box<dyn Write + Send>, format: OutputFormat) -> Self {
        Self {
            sink,
            format,
            written: 0,
        }
    }

    /// Serialize one record as a single line in the configured format.
    pub fn write_record(&mut self, record: &AssetRecord) -> Result<()> {
        match self.format {
            OutputFormat::HostPort => writeln!(self.sink, "{record}")?,
            OutputFormat::Json => {
                let json = serde_json::to_string(record)?;
                writeln!(self.sink, "{json}")?;
            }
        }
        self.written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }

    /// Number of records written so far.
    pub fn written(&self) -> usize {
        self.written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn sample_records() -> Vec<AssetRecord> {
        vec![
            AssetRecord::new("shodan")
                .with_ip("93.184.216.34".parse().unwrap())
                .with_port(443)
                .with_host("example.com"),
            AssetRecord::new("google").with_host("bounty.example.org"),
        ]
    }

    #[test]
    fn host_port_format_is_one_line_per_record() {
        let capture = Capture::default();
        let mut writer = OutputWriter::new(Box::new(capture.clone()), OutputFormat::HostPort);
        for record in sample_records() {
            writer.write_record(&record).unwrap();
        }
        writer.flush().unwrap();

        let text = capture.text();
        assert_eq!(text, "93.184.216.34:443\nbounty.example.org\n");
        assert_eq!(writer.written(), 2);
    }

    #[test]
    fn json_format_emits_parseable_lines() {
        let capture = Capture::default();
        let mut writer = OutputWriter::new(Box::new(capture.clone()), OutputFormat::Json);
        for record in sample_records() {
            writer.write_record(&record).unwrap();
        }

        let text = capture.text();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["ip"], "93.184.216.34");
        assert_eq!(first["port"], 443);
        assert_eq!(first["source"], "shodan");
    }

    #[test]
    fn record_count_is_format_invariant() {
        let records = sample_records();
        let mut counts = Vec::new();
        for format in [OutputFormat::HostPort, OutputFormat::Json] {
            let capture = Capture::default();
            let mut writer = OutputWriter::new(Box::new(capture.clone()), format);
            for record in &records {
                writer.write_record(record).unwrap();
            }
            counts.push((writer.written(), capture.text().lines().count()));
        }
        assert_eq!(counts[0], counts[1]);
    }
}
