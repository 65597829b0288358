//! Support for creating the RSS 1.0 feed (`index.rdf`) from the newest
//! visible entries. Each item shows the first section of an entry.

use crate::anchor::day_url;
use crate::category::Category;
use crate::entry::Entry;
use crate::links::absolutize;
use crate::markdown::{self, section_html, subtitle_html};
use crate::plugin::ImageIndex;
use chrono::{DateTime, Local, SecondsFormat, TimeZone, Timelike};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;
use url::Url;

/// The feed's file name in the output directory.
pub const FILE_NAME: &str = "index.rdf";

/// The most entries a feed carries.
pub const MAX_ITEMS: usize = 16;

const RSS_NS: &str = "http://purl.org/rss/1.0/";
const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
const CONTENT_NS: &str = "http://purl.org/rss/1.0/modules/content/";
const TAXO_NS: &str = "http://purl.org/rss/1.0/modules/taxonomy/";

/// Bundled configuration for creating a feed.
pub struct FeedConfig<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub author_name: &'a str,
    pub copyright: &'a str,
    pub base_url: &'a Url,
    pub banner: Option<&'a str>,
    pub category_table: &'a HashMap<String, String>,
}

/// One feed item.
#[derive(Debug, PartialEq)]
pub struct Item {
    pub link: String,
    pub title: String,

    /// The first section as plain text.
    pub description: String,

    /// The first section as HTML with absolute links.
    pub content: String,

    /// The W3CDTF `dc:date`.
    pub date: String,

    /// The first section's categories.
    pub subjects: Vec<String>,

    /// The category page URL of each subject.
    pub topics: Vec<String>,
}

/// Picks the entries for the feed from `latest` (visible entries, newest
/// first).
pub fn select<'a>(latest: &[&'a Entry]) -> Vec<&'a Entry> {
    latest.iter().take(MAX_ITEMS).copied().collect()
}

/// Builds feed items. `current_hour` is the wall-clock hour of the run; see
/// [`normalize_last_modified`].
pub fn items(
    config: &FeedConfig,
    entries: &[&Entry],
    images: &ImageIndex,
    current_hour: u32,
) -> Result<Vec<Item>> {
    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        let section = match entry.sections.first() {
            Some(section) => section,
            None => continue,
        };
        let body = section_html(entry, 0, images)?;
        let subtitle = match &section.subtitle {
            Some(subtitle) => remove_tags(&subtitle_html(entry, subtitle, images)?),
            None => String::new(),
        };
        let description = remove_tags(&body);
        let last_modified = entry.last_modified.with_timezone(&Local);

        items.push(Item {
            link: config.base_url.join(&day_url(entry.date))?.to_string(),
            title: match subtitle.is_empty() {
                true => shorten(&description, 20),
                false => subtitle,
            },
            content: absolutize(&body, config.base_url).into_owned(),
            description,
            date: normalize_last_modified(last_modified, current_hour)
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            subjects: section.categories.clone(),
            topics: section
                .categories
                .iter()
                .map(|name| {
                    let category = Category::new(name, config.category_table);
                    config.base_url.join(&category.url(0)).map(String::from)
                })
                .collect::<std::result::Result<_, _>>()?,
        });
    }
    Ok(items)
}

/// Feed readers sort by `dc:date` and would show entries edited around
/// midnight out of order, so outside of 01:00–22:59 item dates are moved to
/// the last second of their day.
pub fn normalize_last_modified<Tz: TimeZone>(
    last_modified: DateTime<Tz>,
    current_hour: u32,
) -> DateTime<Tz> {
    if (1..=22).contains(&current_hour) {
        return last_modified;
    }
    let end_of_day = last_modified.date_naive().and_hms_opt(23, 59, 59);
    match end_of_day.and_then(|end| last_modified.timezone().from_local_datetime(&end).earliest()) {
        Some(normalized) => normalized,
        None => last_modified,
    }
}

/// The current wall-clock hour in local time.
pub fn current_hour() -> u32 {
    Local::now().hour()
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"))
}

/// Strips HTML tags and decodes the entities the renderer produces.
pub fn remove_tags(html: &str) -> String {
    tag_pattern()
        .replace_all(html, "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_owned()
}

/// Collapses whitespace and cuts `text` to `length` characters, marking the
/// cut with `...`.
pub fn shorten(text: &str, length: usize) -> String {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match text.chars().count() > length {
        true => format!("{}...", text.chars().take(length).collect::<String>()),
        false => text,
    }
}

struct FeedWriter {
    writer: Writer<Vec<u8>>,
}

impl FeedWriter {
    fn event(&mut self, event: Event) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|err| Error::Xml(err.to_string()))
    }

    fn start(&mut self, tag: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let mut elem = BytesStart::new(tag);
        for attr in attrs {
            elem.push_attribute(*attr);
        }
        self.event(Event::Start(elem))
    }

    fn end(&mut self, tag: &str) -> Result<()> {
        self.event(Event::End(BytesEnd::new(tag)))
    }

    fn empty(&mut self, tag: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let mut elem = BytesStart::new(tag);
        for attr in attrs {
            elem.push_attribute(*attr);
        }
        self.event(Event::Empty(elem))
    }

    fn text_element(&mut self, tag: &str, text: &str) -> Result<()> {
        self.start(tag, &[])?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.end(tag)
    }
}

/// Renders the feed document.
pub fn render(config: &FeedConfig, items: &[Item]) -> Result<String> {
    let about = config.base_url.join(FILE_NAME)?.to_string();
    let banner = match config.banner {
        Some(banner) => Some(config.base_url.join(banner)?.to_string()),
        None => None,
    };

    let mut w = FeedWriter {
        writer: Writer::new_with_indent(Vec::new(), b' ', 2),
    };
    w.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    w.start(
        "rdf:RDF",
        &[
            ("xmlns", RSS_NS),
            ("xmlns:rdf", RDF_NS),
            ("xmlns:dc", DC_NS),
            ("xmlns:content", CONTENT_NS),
            ("xmlns:taxo", TAXO_NS),
        ],
    )?;

    w.start("channel", &[("rdf:about", &about)])?;
    w.text_element("title", config.title)?;
    w.text_element("link", config.base_url.as_str())?;
    if !config.description.is_empty() {
        w.text_element("description", config.description)?;
    }
    w.text_element("dc:creator", config.author_name)?;
    w.text_element("dc:rights", config.copyright)?;
    if let Some(banner) = &banner {
        w.empty("image", &[("rdf:resource", banner)])?;
    }
    w.start("items", &[])?;
    w.start("rdf:Seq", &[])?;
    for item in items {
        w.empty("rdf:li", &[("rdf:resource", &item.link)])?;
    }
    w.end("rdf:Seq")?;
    w.end("items")?;
    w.end("channel")?;

    if let Some(banner) = &banner {
        w.start("image", &[("rdf:about", banner)])?;
        w.text_element("title", config.title)?;
        w.text_element("url", banner)?;
        w.text_element("link", config.base_url.as_str())?;
        w.end("image")?;
    }

    for item in items {
        w.start("item", &[("rdf:about", &item.link)])?;
        w.text_element("title", &item.title)?;
        w.text_element("link", &item.link)?;
        w.text_element("description", &item.description)?;
        w.text_element("content:encoded", &item.content)?;
        w.text_element("dc:date", &item.date)?;
        w.text_element("dc:creator", config.author_name)?;
        for subject in &item.subjects {
            w.text_element("dc:subject", subject)?;
        }
        if !item.topics.is_empty() {
            w.start("taxo:topics", &[])?;
            w.start("rdf:Bag", &[])?;
            for topic in &item.topics {
                w.empty("rdf:li", &[("rdf:resource", topic)])?;
            }
            w.end("rdf:Bag")?;
            w.end("taxo:topics")?;
        }
        w.end("item")?;
    }
    w.end("rdf:RDF")?;

    String::from_utf8(w.writer.into_inner()).map_err(|err| Error::Xml(err.to_string()))
}

/// The result of a fallible feed operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem creating the feed.
#[derive(Debug)]
pub enum Error {
    /// Returned when an entry can't be rendered.
    Render(markdown::Error),

    /// Returned when a feed URL can't be built.
    Url(url::ParseError),

    /// Returned when the XML can't be written.
    Xml(String),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Render(err) => err.fmt(f),
            Error::Url(err) => err.fmt(f),
            Error::Xml(err) => write!(f, "Writing feed: {}", err),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Render(err) => Some(err),
            Error::Url(err) => Some(err),
            Error::Xml(_) => None,
        }
    }
}

impl From<markdown::Error> for Error {
    /// Converts [`markdown::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator in fallible feed operations.
    fn from(err: markdown::Error) -> Error {
        Error::Render(err)
    }
}

impl From<url::ParseError> for Error {
    /// Converts [`url::ParseError`]s into [`Error`]. This allows us to use
    /// the `?` operator in fallible feed operations.
    fn from(err: url::ParseError) -> Error {
        Error::Url(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::diary::Diary;
    use crate::entry::Format;
    use chrono::{FixedOffset, NaiveDate, Utc};

    fn entry(day: u32, visible: bool, body: &str) -> Entry {
        Entry::new(
            NaiveDate::from_ymd_opt(2021, 1, day).unwrap(),
            "",
            Utc.timestamp_opt(1_609_459_200 + i64::from(day) * 86_400, 0).unwrap(),
            visible,
            Format::Markdown,
            body,
        )
    }

    #[test]
    fn test_normalize_last_modified() {
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        let t = tz.with_ymd_and_hms(2021, 1, 3, 0, 30, 0).unwrap();
        assert_eq!(normalize_last_modified(t, 12), t);
        assert_eq!(normalize_last_modified(t, 1), t);
        assert_eq!(normalize_last_modified(t, 22), t);
        let end = tz.with_ymd_and_hms(2021, 1, 3, 23, 59, 59).unwrap();
        assert_eq!(normalize_last_modified(t, 0), end);
        assert_eq!(normalize_last_modified(t, 23), end);
    }

    #[test]
    fn test_select_caps_visible_entries() {
        let diary = Diary::from_entries((1..=20).map(|d| entry(d, d % 5 != 0, "# x\n\ny")));
        let latest = diary.latest();
        let selected = select(&latest);
        assert_eq!(selected.len(), MAX_ITEMS);
        assert!(selected.iter().all(|e| e.visible));
        assert!(selected.windows(2).all(|w| w[0].date > w[1].date));
        assert_eq!(selected[0].date, NaiveDate::from_ymd_opt(2021, 1, 19).unwrap());
    }

    #[test]
    fn test_items_and_render() -> Result<()> {
        let base_url = Url::parse("https://example.org/diary/")?;
        let table = HashMap::new();
        let config = FeedConfig {
            title: "Diary & Notes",
            description: "",
            author_name: "me",
            copyright: "(c) me",
            base_url: &base_url,
            banner: Some("theme/banner.png"),
            category_table: &table,
        };
        let entries = vec![
            entry(3, true, "# [Rust] Hello\n\nSee [yesterday](2021/1/2.html).\n"),
            entry(2, true, "# [Misc]\n\nA rather long paragraph without a title.\n"),
        ];
        let refs: Vec<&Entry> = entries.iter().collect();
        let images = ImageIndex::default();
        let items = items(&config, &refs, &images, 12)?;

        assert_eq!(items[0].title, "Hello");
        assert_eq!(items[0].link, "https://example.org/diary/2021/1/3.html");
        assert_eq!(items[0].description, "See yesterday.");
        assert!(items[0]
            .content
            .contains(r#"href="https://example.org/diary/2021/1/2.html""#));
        assert_eq!(items[0].subjects, vec!["Rust"]);
        assert_eq!(
            items[0].topics,
            vec!["https://example.org/diary/category/rust.html"]
        );
        assert_eq!(items[1].title, "A rather long paragr...");

        let rdf = render(&config, &items)?;
        assert!(rdf.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(rdf.contains(r#"<channel rdf:about="https://example.org/diary/index.rdf">"#));
        assert!(rdf.contains("<title>Diary &amp; Notes</title>"));
        assert!(rdf.contains(r#"<image rdf:resource="https://example.org/diary/theme/banner.png"/>"#));
        assert!(rdf.contains("<dc:subject>Rust</dc:subject>"));
        let channel = &rdf[rdf.find("<channel").unwrap()..rdf.find("</channel>").unwrap()];
        assert!(!channel.contains("<description>"));
        assert!(rdf.contains("<description>See yesterday.</description>"));
        Ok(())
    }
}
