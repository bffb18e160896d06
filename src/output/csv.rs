//! CSV file sink
//!
//! Each target is one file, `<dir>/<sanitized name>.csv`. Full rewrites go
//! through a temporary sibling file and a rename, so readers observe either
//! the previous content or the complete new content.

use async_trait::async_trait;
use csv::{ReaderBuilder, StringRecord, Writer, WriterBuilder};
use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{Row, Sink, SinkError, SinkResult};
use crate::cancel::CancelSignal;

const DEFAULT_BUFFER_SIZE: usize = 8192; // 8KB buffer

/// Characters replaced when turning a target name into a file name.
const RESERVED_FILENAME_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Sink writing one CSV file per target into a directory.
#[derive(Debug, Clone)]
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    /// Create a sink rooted at `dir`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> SinkResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| SinkError::from_io("failed to create output directory", &e))?;
        info!("CSV sink ready: dir={}", dir.display());
        Ok(Self { dir })
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing the target `name`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", sanitize_file_stem(name)))
    }

    fn temp_path_for(&self, name: &str) -> PathBuf {
        self.dir
            .join(format!(".{}.csv.tmp", sanitize_file_stem(name)))
    }

    /// Read every record of an existing target.
    fn read_records(&self, path: &Path) -> SinkResult<Vec<StringRecord>> {
        let file = File::open(path).map_err(|e| SinkError::from_io("failed to open target", &e))?;
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SinkError::Csv(format!("failed to read {}: {e}", path.display())))
    }

    /// Write `records` to a temporary file and rename it over `name`.
    fn replace_atomically<I, R>(&self, name: &str, records: I) -> SinkResult<usize>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator,
        R::Item: AsRef<[u8]>,
    {
        let target = self.path_for(name);
        let temp = self.temp_path_for(name);

        let file =
            File::create(&temp).map_err(|e| SinkError::from_io("failed to create temp file", &e))?;
        let mut writer = csv_writer(file);
        let mut written = 0;
        for record in records {
            writer
                .write_record(record)
                .map_err(|e| SinkError::Csv(format!("failed to write row: {e}")))?;
            written += 1;
        }
        finish(writer)?;

        std::fs::rename(&temp, &target)
            .map_err(|e| SinkError::from_io("failed to replace target", &e))?;
        Ok(written)
    }
}

#[async_trait]
impl Sink for CsvSink {
    async fn ensure_target_exists(&self, cancel: &CancelSignal, name: &str) -> SinkResult<()> {
        check_cancel(cancel)?;
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| SinkError::from_io("failed to create output directory", &e))?;

        let path = self.path_for(name);
        if path.exists() {
            return Ok(());
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| SinkError::from_io("failed to create target", &e))?;
        info!(target = name, path = %path.display(), "Created CSV target");
        Ok(())
    }

    async fn clear(&self, cancel: &CancelSignal, name: &str) -> SinkResult<()> {
        check_cancel(cancel)?;
        OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(self.path_for(name))
            .map_err(|e| SinkError::from_io("failed to clear target", &e))?;
        debug!(target = name, "Cleared CSV target");
        Ok(())
    }

    async fn set_headers(
        &self,
        cancel: &CancelSignal,
        name: &str,
        headers: &[String],
    ) -> SinkResult<()> {
        check_cancel(cancel)?;
        let mut records = self.read_records(&self.path_for(name))?;
        let header_record = StringRecord::from(headers.to_vec());
        match records.first_mut() {
            Some(first) => *first = header_record,
            None => records.push(header_record),
        }
        self.replace_atomically(name, records.iter())?;
        debug!(target = name, columns = headers.len(), "Headers written");
        Ok(())
    }

    async fn append_rows(&self, cancel: &CancelSignal, name: &str, rows: &[Row]) -> SinkResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        check_cancel(cancel)?;

        let file = OpenOptions::new()
            .append(true)
            .open(self.path_for(name))
            .map_err(|e| SinkError::from_io("failed to open target for append", &e))?;
        let mut writer = csv_writer(file);
        for row in rows {
            writer
                .write_record(row.iter().map(|cell| cell.to_string()))
                .map_err(|e| SinkError::Csv(format!("failed to append row: {e}")))?;
        }
        finish(writer)?;

        debug!(target = name, rows = rows.len(), "Rows appended");
        Ok(())
    }

    async fn overwrite_all(
        &self,
        cancel: &CancelSignal,
        name: &str,
        headers: &[String],
        rows: &[Row],
    ) -> SinkResult<()> {
        check_cancel(cancel)?;
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| SinkError::from_io("failed to create output directory", &e))?;

        let header = std::iter::once(headers.to_vec());
        let body = rows
            .iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect::<Vec<_>>());
        let written = self.replace_atomically(name, header.chain(body))?;

        info!(
            target = name,
            rows = written.saturating_sub(1),
            path = %self.path_for(name).display(),
            "Target overwritten"
        );
        Ok(())
    }
}

fn check_cancel(cancel: &CancelSignal) -> SinkResult<()> {
    if cancel.is_cancelled() {
        Err(SinkError::Cancelled)
    } else {
        Ok(())
    }
}

fn csv_writer(file: File) -> Writer<BufWriter<File>> {
    WriterBuilder::new()
        .flexible(true)
        .from_writer(BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file))
}

/// Flush buffered rows and sync the file to disk.
fn finish(writer: Writer<BufWriter<File>>) -> SinkResult<()> {
    let buffered = writer
        .into_inner()
        .map_err(|e| SinkError::Io(format!("failed to flush: {}", e.error())))?;
    let file = buffered
        .into_inner()
        .map_err(|e| SinkError::from_io("failed to flush", e.error()))?;
    file.sync_all()
        .map_err(|e| SinkError::from_io("failed to sync", &e))
}

/// Replace characters that are not valid in file names.
pub fn sanitize_file_stem(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| {
            if RESERVED_FILENAME_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    if stem.is_empty() || stem.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        stem
    }
}
