//! Defines the [`Entry`] and [`Section`] types, which represent a single
//! diary day and the titled parts it is split into. Entries are created by
//! [`crate::td2`] and owned by [`crate::diary::Diary`]; everything else in the
//! crate only reads them.

use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;

/// The markup dialect an entry's body is written in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    /// CommonMark with tDiary's `{{plugin}}` calls. Sections start with `# `.
    Markdown,

    /// RD with tDiary's `((%plugin%))` calls. Sections start with `= `.
    Rd,
}

impl Format {
    /// The line prefix that opens a new section in this format.
    fn section_marker(self) -> &'static str {
        match self {
            Format::Markdown => "# ",
            Format::Rd => "= ",
        }
    }
}

impl FromStr for Format {
    type Err = UnknownFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Markdown" | "GFM" | "CommonMark" => Ok(Format::Markdown),
            "RD" => Ok(Format::Rd),
            _ => Err(UnknownFormatError(s.to_owned())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Format::Markdown => f.write_str("Markdown"),
            Format::Rd => f.write_str("RD"),
        }
    }
}

/// Returned when a diary declares a `Format` this crate can't render.
#[derive(Debug)]
pub struct UnknownFormatError(pub String);

impl fmt::Display for UnknownFormatError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unsupported diary format `{}`", self.0)
    }
}

impl std::error::Error for UnknownFormatError {}

/// A titled part of an [`Entry`].
#[derive(Clone, Debug, PartialEq)]
pub struct Section {
    /// The section title with its leading `[category]` groups removed. `None`
    /// for text that precedes the first section heading.
    pub subtitle: Option<String>,

    /// The categories from the leading `[category]` groups of the heading, in
    /// source order.
    pub categories: Vec<String>,

    /// The section body in the entry's [`Format`], without the heading line.
    pub body: String,
}

/// A single diary day.
#[derive(Clone, Debug)]
pub struct Entry {
    /// The day this entry belongs to. Entries are keyed by date.
    pub date: NaiveDate,

    /// The day title (may be empty).
    pub title: String,

    /// When the entry was last edited. Pages derived from the entry carry
    /// this as their timestamp.
    pub last_modified: DateTime<Utc>,

    /// Hidden entries stay in the store but are never published.
    pub visible: bool,

    /// The markup dialect of `body`.
    pub format: Format,

    /// The raw body.
    pub body: String,

    /// `body` split into sections.
    pub sections: Vec<Section>,
}

impl Entry {
    /// Builds an entry, splitting `body` into [`Section`]s according to
    /// `format`.
    pub fn new(
        date: NaiveDate,
        title: &str,
        last_modified: DateTime<Utc>,
        visible: bool,
        format: Format,
        body: &str,
    ) -> Entry {
        Entry {
            date,
            title: title.to_owned(),
            last_modified,
            visible,
            format,
            body: body.to_owned(),
            sections: split_sections(format, body),
        }
    }

    /// The `YYYYMMDD` key of this entry.
    pub fn key(&self) -> String {
        date_key(self.date)
    }

    /// All categories of all sections, deduplicated, in first-seen order.
    pub fn categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> = Vec::new();
        for category in self.sections.iter().flat_map(|s| s.categories.iter()) {
            if !categories.contains(&category.as_str()) {
                categories.push(category);
            }
        }
        categories
    }
}

/// Formats a date as its `YYYYMMDD` key.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Parses a `YYYYMMDD` key. Returns `None` for anything else.
pub fn parse_date_key(key: &str) -> Option<NaiveDate> {
    if key.len() != 8 || !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year = key[..4].parse().ok()?;
    let month = key[4..6].parse().ok()?;
    let day = key[6..].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Splits the leading `[category]` groups off a heading. Returns the
/// categories and the remaining title with leading whitespace removed.
pub fn split_categories(heading: &str) -> (Vec<String>, String) {
    let mut categories = Vec::new();
    let mut rest = heading;
    while rest.starts_with('[') {
        match rest.find(']') {
            Some(close) if close > 1 => {
                categories.push(rest[1..close].to_owned());
                rest = &rest[close + 1..];
            }
            _ => break,
        }
    }
    (categories, rest.trim_start().to_owned())
}

fn split_sections(format: Format, body: &str) -> Vec<Section> {
    let marker = format.section_marker();
    let mut sections = Vec::new();
    let mut current = Section {
        subtitle: None,
        categories: Vec::new(),
        body: String::new(),
    };
    let mut fence: Option<&str> = None;

    for line in body.lines() {
        if format == Format::Markdown {
            let trimmed = line.trim_start();
            match fence {
                Some(open) if trimmed.starts_with(open) => fence = None,
                None if trimmed.starts_with("```") => fence = Some("```"),
                None if trimmed.starts_with("~~~") => fence = Some("~~~"),
                _ => {}
            }
        }

        if fence.is_none() && line.starts_with(marker) {
            push_section(&mut sections, current);
            let (categories, subtitle) = split_categories(line[marker.len()..].trim());
            current = Section {
                subtitle: Some(subtitle),
                categories,
                body: String::new(),
            };
        } else {
            current.body.push_str(line);
            current.body.push('\n');
        }
    }
    push_section(&mut sections, current);
    sections
}

fn push_section(sections: &mut Vec<Section>, mut section: Section) {
    if section.subtitle.is_none() && section.body.trim().is_empty() {
        return;
    }
    section.body = section.body.trim_matches('\n').to_owned();
    sections.push(section);
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    fn entry(format: Format, body: &str) -> Entry {
        Entry::new(
            NaiveDate::from_ymd_opt(2021, 1, 3).unwrap(),
            "",
            Utc.timestamp_opt(1_609_632_000, 0).unwrap(),
            true,
            format,
            body,
        )
    }

    #[test]
    fn test_split_markdown_sections() {
        let e = entry(
            Format::Markdown,
            "# [Ruby][Rust] First\n\nhello\n\n# Second\n\nworld\n",
        );
        assert_eq!(
            e.sections,
            vec![
                Section {
                    subtitle: Some("First".to_owned()),
                    categories: vec!["Ruby".to_owned(), "Rust".to_owned()],
                    body: "hello".to_owned(),
                },
                Section {
                    subtitle: Some("Second".to_owned()),
                    categories: Vec::new(),
                    body: "world".to_owned(),
                },
            ]
        );
    }

    #[test]
    fn test_heading_inside_fence_does_not_split() {
        let e = entry(Format::Markdown, "# Shell\n\n```sh\n# comment\n```\n");
        assert_eq!(e.sections.len(), 1);
        assert_eq!(e.sections[0].body, "```sh\n# comment\n```");
    }

    #[test]
    fn test_split_rd_sections_with_preamble() {
        let e = entry(Format::Rd, "intro\n= [Diary] Today\nbody\n");
        assert_eq!(e.sections.len(), 2);
        assert_eq!(e.sections[0].subtitle, None);
        assert_eq!(e.sections[0].body, "intro");
        assert_eq!(e.sections[1].subtitle.as_deref(), Some("Today"));
        assert_eq!(e.categories(), vec!["Diary"]);
    }

    #[test]
    fn test_categories_are_deduplicated() {
        let e = entry(Format::Markdown, "# [a][b] x\n# [b][c] y\n");
        assert_eq!(e.categories(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_date_keys() {
        let date = NaiveDate::from_ymd_opt(2021, 1, 3).unwrap();
        assert_eq!(date_key(date), "20210103");
        assert_eq!(parse_date_key("20210103"), Some(date));
        assert_eq!(parse_date_key("2021013"), None);
        assert_eq!(parse_date_key("20211340"), None);
    }

    #[test]
    fn test_unknown_format() {
        assert!("Wiki".parse::<Format>().is_err());
        assert_eq!("RD".parse::<Format>().unwrap(), Format::Rd);
    }
}
