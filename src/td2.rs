//! Reads tDiary's `TDIARY2.01.00` data files. A data directory holds one
//! subdirectory per year, each with one `YYYYMM.td2` file per month:
//!
//! ```text
//! TDIARY2.01.00
//! Date: 20210103
//! Title: a day
//! Last-Modified: 1609632000
//! Visible: true
//! Format: Markdown
//!
//! # [Rust] Section
//! ..a body line that starts with a dot
//! .
//! ```
//!
//! Each entry is a block of `Key: value` headers, a blank line, and body lines
//! terminated by a line holding a single `.`. Body lines that start with `.`
//! have that dot stuffed in front of them.

use crate::entry::{parse_date_key, Entry, Format, UnknownFormatError};
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// The first line of every supported data file.
pub const MAGIC: &str = "TDIARY2.01.00";

const EXTENSION: &str = "td2";

/// Parses every entry in the contents of one data file.
pub fn parse(input: &str) -> Result<Vec<Entry>> {
    let mut lines = input.lines();
    match lines.next() {
        Some(MAGIC) => {}
        Some(other) => return Err(Error::UnsupportedVersion(other.to_owned())),
        None => return Err(Error::UnsupportedVersion(String::new())),
    }

    let mut entries = Vec::new();
    let mut in_header = true;
    let mut headers: HashMap<String, String> = HashMap::new();
    let mut body = String::new();

    for line in lines {
        if in_header {
            if line.is_empty() {
                in_header = false;
            } else {
                let mut parts = line.splitn(2, ':');
                let key = parts.next().unwrap_or_default();
                let value = parts.next().unwrap_or_default().trim_start();
                headers.insert(key.to_owned(), value.to_owned());
            }
        } else if line == "." {
            entries.push(entry(&headers, &body)?);
            in_header = true;
            headers.clear();
            body.clear();
        } else {
            body.push_str(line.strip_prefix('.').unwrap_or(line));
            body.push('\n');
        }
    }

    if !headers.is_empty() || !body.is_empty() {
        return Err(Error::UnterminatedEntry);
    }
    Ok(entries)
}

fn entry(headers: &HashMap<String, String>, body: &str) -> Result<Entry> {
    let header = |name: &'static str| {
        headers
            .get(name)
            .map(String::as_str)
            .ok_or(Error::MissingHeader(name))
    };
    let invalid = |name: &'static str, value: &str| Error::InvalidHeader {
        name,
        value: value.to_owned(),
    };

    let date = header("Date")?;
    let date = parse_date_key(date).ok_or_else(|| invalid("Date", date))?;

    let last_modified = header("Last-Modified")?;
    let last_modified = last_modified
        .parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .ok_or_else(|| invalid("Last-Modified", last_modified))?;

    let visible = match headers.get("Visible").map(String::as_str) {
        None | Some("true") => true,
        Some("false") => false,
        Some(other) => return Err(invalid("Visible", other)),
    };

    // tDiary's own default style is not supported, so a missing header is
    // reported as that style.
    let format: Format = headers
        .get("Format")
        .map(String::as_str)
        .unwrap_or("tDiary")
        .parse()?;

    Ok(Entry::new(
        date,
        headers.get("Title").map(String::as_str).unwrap_or_default(),
        last_modified,
        visible,
        format,
        body,
    ))
}

/// Reads a single data file.
pub fn read_file(path: &Path) -> Result<Vec<Entry>> {
    let annotate = |err| Error::Annotated(format!("reading `{}`", path.display()), Box::new(err));
    let contents = std::fs::read_to_string(path).map_err(|e| annotate(Error::Io(e)))?;
    parse(&contents).map_err(annotate)
}

/// Finds every `YYYY/*.td2` file under `data_directory`, sorted by path.
pub fn data_files(data_directory: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for result in WalkDir::new(data_directory).min_depth(2).max_depth(2) {
        let entry = result?;
        let path = entry.path();
        let in_year_directory = path
            .parent()
            .and_then(Path::file_name)
            .and_then(|name| name.to_str())
            .map_or(false, |name| name.len() == 4 && name.bytes().all(|b| b.is_ascii_digit()));
        if entry.file_type().is_file()
            && in_year_directory
            && path.extension().map_or(false, |ext| ext == EXTENSION)
        {
            files.push(path.to_owned());
        }
    }
    files.sort();
    Ok(files)
}

/// Reads every entry of every data file under `data_directory`.
pub fn read_directory(data_directory: &Path) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for path in data_files(data_directory)? {
        entries.extend(read_file(&path)?);
    }
    Ok(entries)
}

/// The result of a fallible data-file operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem reading diary data.
#[derive(Debug)]
pub enum Error {
    /// Returned when the first line isn't [`MAGIC`].
    UnsupportedVersion(String),

    /// Returned when an entry lacks a required header.
    MissingHeader(&'static str),

    /// Returned when a header value can't be parsed.
    InvalidHeader { name: &'static str, value: String },

    /// Returned when an entry's `Format` isn't supported.
    Format(UnknownFormatError),

    /// Returned when the file ends in the middle of an entry.
    UnterminatedEntry,

    /// Returned for I/O errors.
    Io(std::io::Error),

    /// Returned for directory traversal errors.
    WalkDir(walkdir::Error),

    /// An error with an annotation.
    Annotated(String, Box<Error>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnsupportedVersion(found) => {
                write!(f, "unsupported format: `{}` (wanted `{}`)", found, MAGIC)
            }
            Error::MissingHeader(name) => write!(f, "missing `{}` header", name),
            Error::InvalidHeader { name, value } => {
                write!(f, "invalid `{}` header: `{}`", name, value)
            }
            Error::Format(err) => err.fmt(f),
            Error::UnterminatedEntry => write!(f, "entry is missing its closing `.`"),
            Error::Io(err) => err.fmt(f),
            Error::WalkDir(err) => err.fmt(f),
            Error::Annotated(annotation, err) => write!(f, "{}: {}", annotation, err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Format(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::WalkDir(err) => Some(err),
            Error::Annotated(_, err) => Some(err),
            _ => None,
        }
    }
}

impl From<UnknownFormatError> for Error {
    fn from(err: UnknownFormatError) -> Error {
        Error::Format(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Error {
        Error::WalkDir(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::NaiveDate;

    const SAMPLE: &str = "TDIARY2.01.00
Date: 20210103
Title: third
Last-Modified: 1609632000
Visible: true
Format: Markdown

# [Rust] Section
..starts with a dot
.
Date: 20210104
Last-Modified: 1609718400
Visible: false
Format: RD

= hidden
.
";

    #[test]
    fn test_parse_entries() -> Result<()> {
        let entries = parse(SAMPLE)?;
        assert_eq!(entries.len(), 2);

        let first = &entries[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2021, 1, 3).unwrap());
        assert_eq!(first.title, "third");
        assert_eq!(first.last_modified.timestamp(), 1_609_632_000);
        assert!(first.visible);
        assert_eq!(first.format, Format::Markdown);
        assert_eq!(first.body, "# [Rust] Section\n.starts with a dot\n");
        assert_eq!(first.sections[0].categories, vec!["Rust".to_owned()]);

        let second = &entries[1];
        assert!(!second.visible);
        assert_eq!(second.format, Format::Rd);
        assert_eq!(second.title, "");
        Ok(())
    }

    #[test]
    fn test_rejects_unknown_version() {
        match parse("TDIARY1\n") {
            Err(Error::UnsupportedVersion(found)) => assert_eq!(found, "TDIARY1"),
            other => panic!("unexpected result: {:?}", other.map(|e| e.len())),
        }
    }

    #[test]
    fn test_rejects_unterminated_entry() {
        let input = "TDIARY2.01.00\nDate: 20210103\nLast-Modified: 0\nFormat: RD\n\nbody\n";
        assert!(matches!(parse(input), Err(Error::UnterminatedEntry)));
    }

    #[test]
    fn test_rejects_bad_headers() {
        let input = "TDIARY2.01.00\nDate: 2021-01-03\nLast-Modified: 0\nFormat: RD\n\n.\n";
        assert!(matches!(
            parse(input),
            Err(Error::InvalidHeader { name: "Date", .. })
        ));

        let input = "TDIARY2.01.00\nDate: 20210103\nLast-Modified: 0\n\n.\n";
        assert!(matches!(parse(input), Err(Error::Format(_))));
    }

    #[test]
    fn test_read_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir_all(dir.path().join("2021"))?;
        std::fs::write(dir.path().join("2021").join("202101.td2"), SAMPLE)?;
        std::fs::write(dir.path().join("2021").join("notes.txt"), "ignored")?;
        std::fs::write(dir.path().join("stray.td2"), "ignored")?;

        let entries = read_directory(dir.path())?;
        assert_eq!(entries.len(), 2);
        Ok(())
    }
}
