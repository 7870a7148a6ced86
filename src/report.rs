//! Per-pair CSV summaries

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::matches::{MatchReport, PairStats};

/// CSV header
pub fn csv_header() -> &'static str {
    "pair,match_count,m,ctm,min_depth,complete"
}

/// Format one pair as a CSV row. An unmatched pair has an empty min_depth
/// and a ctm of `inf`.
pub fn csv_row(pair: usize, stats: &PairStats) -> String {
    let min_depth = stats.min_depth().map(|d| d.to_string()).unwrap_or_default();
    format!(
        "{},{},{:.9},{:.6},{},{}",
        pair,
        stats.match_count(),
        stats.m,
        stats.ctm,
        min_depth,
        stats.complete,
    )
}

/// Buffered CSV writer for match reports
pub struct CsvReport {
    writer: BufWriter<File>,
    rows: usize,
}

impl CsvReport {
    /// Create (or truncate) the file and write the header
    pub fn create<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", csv_header())?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn write_pair(&mut self, pair: usize, stats: &PairStats) -> std::io::Result<()> {
        writeln!(self.writer, "{}", csv_row(pair, stats))?;
        self.rows += 1;
        Ok(())
    }

    pub fn write_report(&mut self, report: &MatchReport) -> std::io::Result<()> {
        for (i, stats) in report.pairs.iter().enumerate() {
            self.write_pair(i, stats)?;
        }
        Ok(())
    }

    /// Rows written so far, header excluded
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}
