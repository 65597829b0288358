//! Copies static directories (images, theme, scripts) into the output tree.
//! Each destination is rebuilt from scratch on every run; copied files keep
//! the modification time of their source.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Directories that are never copied.
const IGNORED_DIRECTORIES: &[&str] = &[".svn", ".git"];

/// Replaces `destination` with the merged contents of `sources`. Missing
/// sources are skipped; when none exists `destination` is only removed.
/// Returns the number of files copied.
pub fn publish(sources: &[PathBuf], destination: &Path) -> Result<usize> {
    rmdir(destination)?;
    let mut copied = 0;
    for source in sources {
        if source.is_dir() {
            copied += copy_dir(source, destination)?;
        } else {
            debug!(source = %source.display(), "no such directory, skipped");
        }
    }
    Ok(copied)
}

fn copy_dir(src: &Path, dst: &Path) -> Result<usize> {
    let mut copied = 0;
    let walker = WalkDir::new(src).into_iter().filter_entry(|entry| {
        !(entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .map_or(false, |name| IGNORED_DIRECTORIES.contains(&name)))
    });
    for entry in walker {
        let entry = entry?;
        let relative = match entry.path().strip_prefix(src) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|err| Error::Io {
                path: target.clone(),
                err,
            })?;
        } else {
            copy_file(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    std::fs::copy(src, dst).map_err(io_error(dst))?;
    let modified = std::fs::metadata(src)
        .and_then(|metadata| metadata.modified())
        .map_err(io_error(src))?;
    File::options()
        .write(true)
        .open(dst)
        .and_then(|file| file.set_modified(modified))
        .map_err(io_error(dst))
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> Error {
    let path = path.to_owned();
    move |err| Error::Io { path, err }
}

fn rmdir(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(x) => Ok(x),
        Err(e) => match e.kind() {
            std::io::ErrorKind::NotFound => Ok(()),
            _ => Err(Error::Clean {
                path: dir.to_owned(),
                err: e,
            }),
        },
    }
}

/// The result of a fallible asset copy.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a failed asset copy.
#[derive(Debug)]
pub enum Error {
    /// Returned for I/O problems while removing the old destination.
    Clean { path: PathBuf, err: std::io::Error },

    /// Returned for I/O problems while copying.
    Io { path: PathBuf, err: std::io::Error },

    /// Returned when a source directory can't be traversed.
    Walk(walkdir::Error),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Clean { path, err } => {
                write!(f, "Cleaning directory '{}': {}", path.display(), err)
            }
            Error::Io { path, err } => write!(f, "Copying '{}': {}", path.display(), err),
            Error::Walk(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Clean { path: _, err } => Some(err),
            Error::Io { path: _, err } => Some(err),
            Error::Walk(err) => Some(err),
        }
    }
}

impl From<walkdir::Error> for Error {
    /// Converts [`walkdir::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator while walking directories.
    fn from(err: walkdir::Error) -> Error {
        Error::Walk(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::{Duration, SystemTime};

    #[test]
    fn test_publish() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let root = tempfile::tempdir()?;
        let js = root.path().join("js");
        let contrib = root.path().join("contrib");
        std::fs::create_dir_all(js.join("lib"))?;
        std::fs::create_dir_all(js.join(".svn"))?;
        std::fs::create_dir_all(&contrib)?;
        std::fs::write(js.join("lib/a.js"), "a")?;
        std::fs::write(js.join(".svn/entries"), "x")?;
        std::fs::write(contrib.join("b.js"), "b")?;
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_609_632_000);
        File::options()
            .write(true)
            .open(contrib.join("b.js"))?
            .set_modified(mtime)?;

        let output = root.path().join("output/js");
        std::fs::create_dir_all(&output)?;
        std::fs::write(output.join("stale.js"), "old")?;

        let sources = vec![js, contrib, root.path().join("missing")];
        assert_eq!(publish(&sources, &output)?, 2);
        assert_eq!(std::fs::read_to_string(output.join("lib/a.js"))?, "a");
        assert_eq!(std::fs::read_to_string(output.join("b.js"))?, "b");
        assert!(!output.join(".svn").exists());
        assert!(!output.join("stale.js").exists());
        assert_eq!(std::fs::metadata(output.join("b.js"))?.modified()?, mtime);
        Ok(())
    }

    #[test]
    fn test_missing_source_is_noop() -> Result<()> {
        let root = tempfile::tempdir().map_err(|err| Error::Io {
            path: PathBuf::new(),
            err,
        })?;
        let output = root.path().join("images");
        assert_eq!(publish(&[root.path().join("nope")], &output)?, 0);
        assert!(!output.exists());
        Ok(())
    }
}
