//! Writes rendered pages to disk incrementally. Every [`Page`] carries the
//! timestamp of the newest entry it shows; a page whose file already has that
//! timestamp as its modification time is left alone without being rendered.

use chrono::{DateTime, Utc};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// An output file waiting to be written.
pub struct Page<F> {
    /// The target location relative to the output directory.
    pub file_path: PathBuf,

    /// The newest `last_modified` of the entries the page depends on.
    pub last_modified: DateTime<Utc>,

    /// Produces the file contents. Only called when the page is stale.
    pub render: F,
}

/// Counts of what a run did, reported at the end of a build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub written: usize,
    pub skipped: usize,
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} pages written, {} unchanged", self.written, self.skipped)
    }
}

/// Writes [`Page`]s into an output directory, skipping up-to-date ones.
pub struct PageWriter {
    output_directory: PathBuf,
    set_last_modified: bool,
    report: BuildReport,
}

impl PageWriter {
    pub fn new(output_directory: &Path, set_last_modified: bool) -> PageWriter {
        PageWriter {
            output_directory: output_directory.to_owned(),
            set_last_modified,
            report: BuildReport::default(),
        }
    }

    /// Writes `page` unless its file is up to date. Returns whether the file
    /// was written.
    pub fn write<F, E>(&mut self, page: Page<F>) -> Result<bool>
    where
        F: FnOnce() -> std::result::Result<String, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let Page {
            file_path,
            last_modified,
            render,
        } = page;
        let path = self.output_directory.join(&file_path);
        if is_up_to_date(&path, last_modified)? {
            debug!(path = %file_path.display(), "unchanged");
            self.report.skipped += 1;
            return Ok(false);
        }

        let contents = render().map_err(|err| Error::Render {
            path: file_path.clone(),
            err: Box::new(err),
        })?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|err| Error::Io {
                path: dir.to_owned(),
                err,
            })?;
        }
        std::fs::write(&path, contents).map_err(|err| Error::Io {
            path: path.clone(),
            err,
        })?;
        if self.set_last_modified {
            set_modified(&path, last_modified)?;
        }

        debug!(path = %file_path.display(), "written");
        self.report.written += 1;
        Ok(true)
    }

    /// What has been written and skipped so far.
    pub fn report(&self) -> BuildReport {
        self.report
    }
}

// Compares whole seconds: filesystems differ in the precision they store.
fn is_up_to_date(path: &Path, last_modified: DateTime<Utc>) -> Result<bool> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => {
            return Err(Error::Io {
                path: path.to_owned(),
                err,
            })
        }
    };
    let modified = metadata.modified().map_err(|err| Error::Io {
        path: path.to_owned(),
        err,
    })?;
    Ok(epoch_seconds(modified) == Some(last_modified.timestamp()))
}

fn epoch_seconds(time: SystemTime) -> Option<i64> {
    match time.duration_since(UNIX_EPOCH) {
        Ok(duration) => Some(duration.as_secs() as i64),
        Err(err) => Some(-(err.duration().as_secs_f64().ceil() as i64)),
    }
}

/// Sets the modification time of `path`.
pub fn set_modified(path: &Path, time: DateTime<Utc>) -> Result<()> {
    File::options()
        .write(true)
        .open(path)
        .and_then(|file| file.set_modified(SystemTime::from(time)))
        .map_err(|err| Error::Io {
            path: path.to_owned(),
            err,
        })
}

/// The result of a fallible page-writing operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error in a page-writing operation.
#[derive(Debug)]
pub enum Error {
    /// An error producing a page's contents.
    Render {
        path: PathBuf,
        err: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An error reading or writing the output files.
    Io { path: PathBuf, err: io::Error },
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as presentable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Render { path, err } => {
                write!(f, "Rendering '{}': {}", path.display(), err)
            }
            Error::Io { path, err } => write!(f, "Writing '{}': {}", path.display(), err),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Render { path: _, err } => Some(err.as_ref()),
            Error::Io { path: _, err } => Some(err),
        }
    }
}
