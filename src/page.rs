//! Renders archive pages. Every page is the `layout.html` template wrapped
//! around one or more entries rendered with `entry.html`. Links are produced
//! root-relative and rewritten for the page's depth at the end.

use crate::anchor::{anchor, day_url, month_url, section_id};
use crate::category::Category;
use crate::config::Config;
use crate::diary::Diary;
use crate::entry::Entry;
use crate::links::{relativize, root_prefix};
use crate::markdown::{self, section_html, subtitle_html};
use crate::paginate::{latest_file_path, PathTable, Window};
use crate::plugin::ImageIndex;
use crate::similar::{self, SimilarArticles};
use crate::template::{self, escape, object, render, Templates};
use chrono::NaiveDate;
use gtmpl::Value;
use std::fmt;
use std::fmt::Write;
use std::path::Path;

/// The state shared by all pages of one run.
pub struct Context<'a> {
    pub config: &'a Config,
    pub templates: &'a Templates,
    pub images: &'a ImageIndex,
    pub diary: &'a Diary,

    /// Every category of a visible entry, sorted by name.
    pub categories: &'a [Category],

    /// Where each latest window lives.
    pub latest: &'a PathTable,

    /// `None` when the similar articles list is disabled.
    pub similar: Option<&'a SimilarArticles>,
}

/// A navigation link.
#[derive(Clone, Debug, PartialEq)]
pub struct Link {
    /// Root-relative.
    pub url: String,

    /// Plain text.
    pub label: String,
}

impl From<&Link> for Value {
    /// Converts [`Link`]s into [`Value`]s for templating.
    fn from(link: &Link) -> Value {
        object(vec![
            ("url", Value::String(link.url.clone())),
            ("label", Value::String(escape(&link.label))),
        ])
    }
}

/// The older (`prev`) and newer (`next`) neighbours of a page.
#[derive(Debug, Default, PartialEq)]
pub struct Navigation {
    pub prev: Option<Link>,
    pub next: Option<Link>,
}

fn link_value(link: &Option<Link>) -> Value {
    match link {
        Some(link) => Value::from(link),
        None => Value::Nil,
    }
}

impl<'a> Context<'a> {
    fn format_date(&self, date: NaiveDate) -> Result<String> {
        let mut out = String::new();
        write!(out, "{}", date.format(&self.config.date_format))
            .map_err(|_| Error::DateFormat(self.config.date_format.clone()))?;
        Ok(out)
    }

    fn category(&self, name: &str) -> Category {
        Category::new(name, &self.config.category_normalize_table)
    }

    fn entry_value(&self, entry: &Entry) -> Result<Value> {
        let url = day_url(entry.date);
        let mut sections = Vec::with_capacity(entry.sections.len());
        for (i, section) in entry.sections.iter().enumerate() {
            let id = section_id(i);
            let subtitle = match &section.subtitle {
                Some(subtitle) if !subtitle.is_empty() => {
                    subtitle_html(entry, subtitle, self.images)?
                }
                _ => String::new(),
            };
            let categories: Vec<Value> = section
                .categories
                .iter()
                .map(|name| Value::from(&self.category(name)))
                .collect();
            sections.push(object(vec![
                ("url", Value::String(format!("{}#{}", url, id))),
                ("id", Value::String(id)),
                ("subtitle", Value::String(subtitle)),
                ("categories", Value::Array(categories)),
                ("body", Value::String(section_html(entry, i, self.images)?)),
            ]));
        }

        Ok(object(vec![
            ("key", Value::String(entry.key())),
            ("url", Value::String(url)),
            ("date", Value::String(escape(&self.format_date(entry.date)?))),
            ("title", Value::String(escape(&entry.title))),
            ("sections", Value::Array(sections)),
        ]))
    }

    fn entries_html(&self, entries: &[&Entry]) -> Result<String> {
        let mut html = String::new();
        for entry in entries {
            html.push_str(&render(&self.templates.entry, self.entry_value(entry)?)?);
        }
        Ok(html)
    }

    fn categories_value(&self, current: Option<&Category>) -> Value {
        let categories = self
            .categories
            .iter()
            .map(|category| {
                object(vec![
                    ("name", Value::String(escape(&category.name))),
                    ("url", Value::String(category.url(0))),
                    ("current", Value::Bool(Some(category) == current)),
                ])
            })
            .collect();
        Value::Array(categories)
    }

    fn similar_value(&self, entry: &Entry) -> Result<Value> {
        let similar = match self.similar {
            Some(similar) => similar,
            None => return Ok(Value::Array(Vec::new())),
        };
        let mut items = Vec::new();
        for hit in similar.similar(&entry.key())? {
            let related = match self.diary.get_key(&hit.key) {
                Some(related) if related.visible => related,
                _ => continue,
            };
            let title = match related.title.is_empty() {
                true => self.format_date(related.date)?,
                false => related.title.clone(),
            };
            items.push(object(vec![
                ("score", Value::String(format!("{:.3}", hit.score))),
                ("source", Value::String(entry.key())),
                ("url", Value::String(day_url(related.date))),
                ("title", Value::String(escape(&title))),
            ]));
        }
        Ok(Value::Array(items))
    }

    fn layout(
        &self,
        file_path: &Path,
        title: &str,
        content: String,
        navigation: &Navigation,
        similar: Value,
        current: Option<&Category>,
    ) -> Result<String> {
        let config = self.config;
        let value = object(vec![
            ("title", Value::String(escape(title))),
            ("html_title", Value::String(escape(&config.html_title))),
            ("author_name", Value::String(escape(&config.author_name))),
            ("description", Value::String(escape(&config.description))),
            ("copyright", Value::String(escape(&config.copyright))),
            (
                "banner",
                Value::String(escape(config.banner.as_deref().unwrap_or_default())),
            ),
            ("prev", link_value(&navigation.prev)),
            ("next", link_value(&navigation.next)),
            ("content", Value::String(content)),
            ("similar", similar),
            ("categories", self.categories_value(current)),
        ]);
        let html = render(&self.templates.layout, value)?;
        Ok(relativize(&html, &root_prefix(file_path)).into_owned())
    }

    /// Renders the page of a single day. `older` and `newer` are the
    /// neighbouring visible entries.
    pub fn day_page(
        &self,
        entry: &Entry,
        older: Option<&Entry>,
        newer: Option<&Entry>,
    ) -> Result<String> {
        let day_link = |entry: &Entry| -> Result<Link> {
            Ok(Link {
                url: day_url(entry.date),
                label: self.format_date(entry.date)?,
            })
        };
        let navigation = Navigation {
            prev: older.map(day_link).transpose()?,
            next: newer.map(day_link).transpose()?,
        };
        let date = self.format_date(entry.date)?;
        let title = match entry.title.is_empty() {
            true => format!("{}({})", self.config.html_title, date),
            false => format!("{}({} {})", self.config.html_title, date, entry.title),
        };
        self.layout(
            Path::new(&day_url(entry.date)),
            &title,
            self.entries_html(&[entry])?,
            &navigation,
            self.similar_value(entry)?,
            None,
        )
    }

    /// Renders the page of a month with its visible `entries`, oldest first.
    /// `older` and `newer` are the neighbouring months that have pages.
    pub fn month_page(
        &self,
        (year, month): (i32, u32),
        entries: &[&Entry],
        older: Option<(i32, u32)>,
        newer: Option<(i32, u32)>,
    ) -> Result<String> {
        let month_link = |(year, month): (i32, u32)| Link {
            url: month_url(year, month),
            label: format!("{}-{:02}", year, month),
        };
        let navigation = Navigation {
            prev: older.map(month_link),
            next: newer.map(month_link),
        };
        self.layout(
            Path::new(&month_url(year, month)),
            &format!("{}({}-{:02})", self.config.html_title, year, month),
            self.entries_html(entries)?,
            &navigation,
            Value::Array(Vec::new()),
            None,
        )
    }

    /// Renders a latest page, one of `windows`. Window 0 is `index.html`.
    pub fn latest_page(
        &self,
        windows: &[Window<&Entry>],
        window: &Window<&Entry>,
    ) -> Result<String> {
        let link = |index: usize, label: &str| {
            let first = windows.get(index).and_then(|window| window.items.first());
            let key = first.map(|entry| entry.key()).unwrap_or_default();
            let url = anchor(&format!("{}-{}", key, self.config.latest_limit), self.latest);
            match url.is_empty() {
                true => None,
                false => Some(Link {
                    url,
                    label: label.to_owned(),
                }),
            }
        };
        let navigation = Navigation {
            prev: window.next().and_then(|i| link(i, "Older")),
            next: window.prev().and_then(|i| link(i, "Newer")),
        };
        self.layout(
            &latest_file_path(window.index),
            &self.config.html_title,
            self.entries_html(window.items)?,
            &navigation,
            Value::Array(Vec::new()),
            None,
        )
    }

    /// Renders a page of the entries of `category`.
    pub fn category_page(&self, category: &Category, window: &Window<&Entry>) -> Result<String> {
        let link = |index: usize, label: &str| Link {
            url: category.url(index),
            label: label.to_owned(),
        };
        let navigation = Navigation {
            prev: window.next().map(|i| link(i, "Older")),
            next: window.prev().map(|i| link(i, "Newer")),
        };
        self.layout(
            &category.file_path(window.index),
            &format!("{} - {}", self.config.html_title, category.name),
            self.entries_html(window.items)?,
            &navigation,
            Value::Array(Vec::new()),
            Some(category),
        )
    }
}

/// The result of a fallible page rendering.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a page that can't be rendered.
#[derive(Debug)]
pub enum Error {
    /// Returned when a section can't be rendered.
    Markdown(markdown::Error),

    /// Returned when a template fails.
    Template(template::Error),

    /// Returned when similar articles can't be looked up.
    Similar(similar::Error),

    /// Returned for an invalid `date_format`.
    DateFormat(String),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Markdown(err) => err.fmt(f),
            Error::Template(err) => err.fmt(f),
            Error::Similar(err) => err.fmt(f),
            Error::DateFormat(format) => write!(f, "Invalid date format '{}'", format),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Markdown(err) => Some(err),
            Error::Template(err) => Some(err),
            Error::Similar(err) => Some(err),
            Error::DateFormat(_) => None,
        }
    }
}

impl From<markdown::Error> for Error {
    /// Converts [`markdown::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator while rendering.
    fn from(err: markdown::Error) -> Error {
        Error::Markdown(err)
    }
}

impl From<template::Error> for Error {
    /// Converts [`template::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator while rendering.
    fn from(err: template::Error) -> Error {
        Error::Template(err)
    }
}

impl From<similar::Error> for Error {
    /// Converts [`similar::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator while rendering.
    fn from(err: similar::Error) -> Error {
        Error::Similar(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entry::Format;
    use crate::paginate::paginate;
    use crate::similar::{Hit, SimilarityEngine};
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use url::Url;

    fn config() -> Config {
        Config {
            data_directory: PathBuf::from("data"),
            output_directory: PathBuf::from("output"),
            html_title: "My Diary".to_owned(),
            author_name: "me".to_owned(),
            author_mail: String::new(),
            description: String::new(),
            copyright: "(c) me".to_owned(),
            base_url: Url::parse("http://localhost/").unwrap(),
            banner: None,
            latest_limit: 2,
            category_limit: 2,
            category_normalize_table: HashMap::new(),
            set_last_modified: true,
            date_format: "%Y-%m-%d".to_owned(),
            images_directory: PathBuf::from("images"),
            theme_directory: PathBuf::from("theme"),
            js_directories: Vec::new(),
            templates_directory: None,
            similar_articles: None,
        }
    }

    fn entry(day: u32, body: &str) -> Entry {
        Entry::new(
            NaiveDate::from_ymd_opt(2021, 1, day).unwrap(),
            "",
            Utc.timestamp_opt(1_609_459_200, 0).unwrap(),
            true,
            Format::Markdown,
            body,
        )
    }

    struct Fixed;

    impl SimilarityEngine for Fixed {
        fn contains(&self, _key: &str) -> similar::Result<bool> {
            Ok(true)
        }

        fn more_like(&self, _key: &str, _limit: usize) -> similar::Result<Vec<Hit>> {
            Ok(vec![
                Hit {
                    key: "20210103".to_owned(),
                    score: 2.5,
                },
                Hit {
                    key: "20210101".to_owned(),
                    score: 1.0,
                },
            ])
        }
    }

    #[test]
    fn test_day_page() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let config = config();
        let templates = Templates::load(None)?;
        let images = ImageIndex::default();
        let diary = Diary::from_entries(vec![
            entry(1, "# [Rust] Old\n\nold"),
            entry(3, "# [Rust] Now\n\nSee [the old one](2021/1/1.html)."),
        ]);
        let categories = vec![Category::new("Rust", &config.category_normalize_table)];
        let similar = SimilarArticles::new(Box::new(Fixed), 5);
        let ctx = Context {
            config: &config,
            templates: &templates,
            images: &images,
            diary: &diary,
            categories: &categories,
            latest: &PathTable::default(),
            similar: Some(&similar),
        };

        let day = diary.get_key("20210103").unwrap();
        let html = ctx.day_page(day, diary.get_key("20210101"), None)?;
        assert!(html.contains("<title>My Diary(2021-01-03)</title>"));
        assert!(html.contains(r#"href="../../2021/1/1.html" title="">the old one</a>"#));
        assert!(html.contains(r#"<a href="../../2021/1/1.html">&laquo; 2021-01-01</a>"#));
        assert!(!html.contains("navi-next"));
        assert!(html.contains(r#"<div class="section" id="p01">"#));
        assert!(html.contains(r#"<li><a href="../../category/rust.html">Rust</a></li>"#));
        assert!(html.contains(
            r#"<li data-score="1.000" data-source="20210103"><a href="../../2021/1/1.html">2021-01-01</a></li>"#
        ));
        assert!(!html.contains(r#"data-score="2.500""#));
        assert!(html.contains(r#"href="../../theme/base.css""#));
        Ok(())
    }

    #[test]
    fn test_window_pages() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let config = config();
        let templates = Templates::load(None)?;
        let images = ImageIndex::default();
        let diary = Diary::from_entries((1..=3).map(|d| entry(d, "# [Rust] x\n\ny")));
        let categories = vec![Category::new("Rust", &config.category_normalize_table)];
        let latest = diary.latest();
        let windows = paginate(&latest, 2);
        let table = PathTable::new(&windows);
        let ctx = Context {
            config: &config,
            templates: &templates,
            images: &images,
            diary: &diary,
            categories: &categories,
            latest: &table,
            similar: None,
        };

        let index = ctx.latest_page(&windows, &windows[0])?;
        assert!(index.contains(r#"id="20210103""#));
        assert!(index.contains(r#"id="20210102""#));
        assert!(!index.contains(r#"id="20210101""#));
        assert!(index.contains(r#"<a href="latest/1.html">&laquo; Older</a>"#));
        let older = ctx.latest_page(&windows, &windows[1])?;
        assert!(older.contains(r#"<a href=".././">Newer &raquo;</a>"#));

        let page = ctx.category_page(&categories[0], &windows[1])?;
        assert!(page.contains(r#"<li class="current">Rust</li>"#));
        assert!(page.contains(r#"<a href="../../category/rust.html">Newer &raquo;</a>"#));
        assert!(page.contains(r#"href="../../2021/1/1.html""#));
        Ok(())
    }
}
