//! Time-bucketed append-only files for offline pickup.
//!
//! Each line lands in `<directory>/<name>.<bucket>`, where the bucket is the local date
//! (`YYYY-MM-DD`) or date and hour (`YYYY-MM-DD-HH`). A new file is opened as soon as a
//! write falls into a different bucket; old files are left untouched for the collector.
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use time::format_description::FormatItem;
use time::macros::format_description;
use tracing::info;

use crate::time::TimeSource;

const DAILY_BUCKET: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const HOURLY_BUCKET: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]-[hour]");

/// A sink accepting one line of text at a time.
pub trait LineWriter {
    fn write_line(&mut self, line: &str) -> io::Result<()>;
    /// Flush and release the underlying resources. Writing after close reopens the sink.
    fn close(&mut self) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RotationInterval {
    #[default]
    Daily,
    Hourly,
}

impl RotationInterval {
    fn format(&self) -> &'static [FormatItem<'static>] {
        match self {
            RotationInterval::Daily => DAILY_BUCKET,
            RotationInterval::Hourly => HOURLY_BUCKET,
        }
    }
}

pub struct RotatingFileWriter {
    directory: PathBuf,
    file_name: String,
    interval: RotationInterval,
    timesource: Arc<dyn TimeSource + Send + Sync>,
    current: Option<(String, File)>,
}

impl RotatingFileWriter {
    /// Prepare a writer in `directory`, creating it if needed. Files are named `log.<bucket>`,
    /// or `<prefix>.log.<bucket>` when a prefix is given.
    pub fn new(
        directory: impl AsRef<Path>,
        file_prefix: Option<&str>,
        interval: RotationInterval,
        timesource: Arc<dyn TimeSource + Send + Sync>,
    ) -> io::Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;

        let file_name = match file_prefix.filter(|p| !p.is_empty()) {
            Some(prefix) => format!("{}.log", prefix),
            None => "log".to_owned(),
        };

        Ok(Self {
            directory,
            file_name,
            interval,
            timesource,
            current: None,
        })
    }

    fn bucket(&self) -> io::Result<String> {
        self.timesource
            .now()
            .format(self.interval.format())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Path of the file the next line will be appended to.
    pub fn current_path(&self) -> io::Result<PathBuf> {
        Ok(self.path_for(&self.bucket()?))
    }

    fn path_for(&self, bucket: &str) -> PathBuf {
        self.directory.join(format!("{}.{}", self.file_name, bucket))
    }

    fn file_for_bucket(&mut self, bucket: String) -> io::Result<&mut File> {
        let stale = !matches!(&self.current, Some((current, _)) if *current == bucket);
        if stale {
            if let Some((_, mut previous)) = self.current.take() {
                previous.flush()?;
            }
            let path = self.path_for(&bucket);
            info!(path = %path.display(), "opening log file");
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            self.current = Some((bucket, file));
        }

        match self.current.as_mut() {
            Some((_, file)) => Ok(file),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "no log file open")),
        }
    }
}

impl LineWriter for RotatingFileWriter {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let bucket = self.bucket()?;
        let file = self.file_for_bucket(bucket)?;

        let mut buffer = Vec::with_capacity(line.len() + 1);
        buffer.extend_from_slice(line.as_bytes());
        buffer.push(b'\n');
        file.write_all(&buffer)
    }

    fn close(&mut self) -> io::Result<()> {
        match self.current.take() {
            Some((_, mut file)) => {
                file.flush()?;
                file.sync_all()
            }
            None => Ok(()),
        }
    }
}
