//! Exports the diary as Jekyll posts: one `YYYY-MM-DD-index.md` file with YAML
//! front matter per entry.

use crate::convert::{self, Converter};
use crate::entry::Entry;
use crate::plugin::{ImageIndex, Target};
use crate::td2;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The post file name of a converted entry.
pub fn post_file_name(entry: &Entry, slug: &str) -> String {
    format!("{}-{}.md", entry.date.format("%Y-%m-%d"), slug)
}

/// Converts every entry under `data_directory` into a post in
/// `output_directory`. Returns the number of posts written.
pub fn export(data_directory: &Path, output_directory: &Path) -> Result<usize> {
    let images = ImageIndex::default();
    let converter = Converter::new(Target::Jekyll, &images);
    std::fs::create_dir_all(output_directory).map_err(|err| Error::Io {
        path: output_directory.to_owned(),
        err,
    })?;

    let mut written = 0;
    for file in td2::data_files(data_directory)? {
        info!(file = %file.display(), "exporting");
        for entry in td2::read_file(&file)? {
            let document = converter.convert(&entry).map_err(|err| Error::Convert {
                key: entry.key(),
                err,
            })?;
            let contents = document.to_jekyll().map_err(|err| Error::Convert {
                key: entry.key(),
                err,
            })?;
            let path = output_directory.join(post_file_name(&entry, &document.slug));
            std::fs::write(&path, contents).map_err(|err| Error::Io {
                path: path.clone(),
                err,
            })?;
            debug!(path = %path.display(), "written");
            written += 1;
        }
    }
    Ok(written)
}

/// The result of a fallible export.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a failed export.
#[derive(Debug)]
pub enum Error {
    /// Returned when the diary data can't be read.
    Load(td2::Error),

    /// Returned when an entry can't be converted.
    Convert { key: String, err: convert::Error },

    /// Returned for I/O problems while writing posts.
    Io { path: PathBuf, err: std::io::Error },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Load(err) => err.fmt(f),
            Error::Convert { key, err } => write!(f, "Converting entry {}: {}", key, err),
            Error::Io { path, err } => write!(f, "Writing '{}': {}", path.display(), err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Load(err) => Some(err),
            Error::Convert { key: _, err } => Some(err),
            Error::Io { path: _, err } => Some(err),
        }
    }
}

impl From<td2::Error> for Error {
    fn from(err: td2::Error) -> Error {
        Error::Load(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_export() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let root = tempfile::tempdir()?;
        let data = root.path().join("data");
        std::fs::create_dir_all(data.join("2021"))?;
        std::fs::write(
            data.join("2021/202101.td2"),
            concat!(
                "TDIARY2.01.00\n",
                "Date: 20210102\nTitle: hidden\nLast-Modified: 0\nVisible: false\nFormat: Markdown\n\n",
                "# [Misc] Secret\n\ntext\n.\n",
                "Date: 20210103\nTitle: day\nLast-Modified: 0\nVisible: true\nFormat: RD\n\n",
                "= [Rust] Hello\nSee ((<20210102>)).\n.\n",
            ),
        )?;
        let output = root.path().join("jekyll");

        assert_eq!(export(&data, &output)?, 2);

        let hidden = std::fs::read_to_string(output.join("2021-01-02-index.md"))?;
        assert!(hidden.starts_with("---\n"));
        assert!(hidden.contains("title: Secret"));
        assert!(hidden.contains("published: false"));

        let post = std::fs::read_to_string(output.join("2021-01-03-index.md"))?;
        assert!(post.contains("title: Hello"));
        assert!(post.contains("- Rust"));
        assert!(!post.contains("published"));
        assert!(post.contains("{% post_url 2021-01-02-index %}"));
        Ok(())
    }
}
