//! CSV and JSON-log renderings of samples.
//!
//! Both formats are consumed by existing tooling and must stay byte-for-byte
//! stable.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::metrics::{timestamp_format, Sample};
use crate::error::Result;

pub const CSV_HEADER: &str =
    "Timestamp,CPU (%),Memory (MB),Disk (MB/s),Network (KB/s),Threads,Processes";

/// One CSV row, without line terminator
pub fn sample_to_csv(sample: &Sample) -> String {
    format!(
        "{},{},{},{},{},{},{}",
        sample.timestamp.format(timestamp_format::FORMAT),
        sample.cpu_usage,
        sample.memory_usage,
        sample.disk_io,
        sample.network_usage,
        sample.thread_count,
        sample.process_count
    )
}

/// Compact JSON of one sample
pub fn sample_to_json(sample: &Sample) -> Result<String> {
    Ok(serde_json::to_string(sample)?)
}

/// Header plus one row per sample
pub fn write_csv<'a, W, I>(writer: &mut W, samples: I) -> Result<usize>
where
    W: Write,
    I: IntoIterator<Item = &'a Sample>,
{
    writeln!(writer, "{}", CSV_HEADER)?;
    let mut rows = 0;
    for sample in samples {
        writeln!(writer, "{}", sample_to_csv(sample))?;
        rows += 1;
    }
    writer.flush()?;
    Ok(rows)
}

pub fn export_csv<'a, I>(path: &Path, samples: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a Sample>,
{
    let mut writer = BufWriter::new(File::create(path)?);
    write_csv(&mut writer, samples)
}

/// Append-only JSON log.
///
/// Every line is one sample followed by a literal `,`. The file is therefore
/// neither a JSON array nor JSON Lines; readers of the existing logs expect
/// exactly this layout.
pub struct JsonLogWriter<W: Write> {
    writer: W,
}

impl JsonLogWriter<BufWriter<File>> {
    pub fn append_to(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> JsonLogWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn append(&mut self, sample: &Sample) -> Result<()> {
        writeln!(self.writer, "{},", sample_to_json(sample)?)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Default file name for a CSV export of `process_name`
pub fn default_csv_path(dir: &Path, process_name: &str) -> PathBuf {
    dir.join(format!("ProfilerData_{}.csv", process_name))
}
