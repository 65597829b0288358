//! Exports the [`build_archive`] function which stitches together the
//! high-level steps of building the archive: loading the diary
//! ([`crate::td2`]), rendering month, day, category and latest pages
//! ([`crate::page`]) through the incremental [`PageWriter`], generating the RSS
//! feed ([`crate::feed`]), and copying the static directories
//! ([`crate::assets`]).

use crate::anchor::{day_url, month_url};
use crate::assets::{self, publish};
use crate::category::{self, htaccess, Category};
use crate::config::Config;
use crate::diary::Diary;
use crate::entry::Entry;
use crate::feed::{self, FeedConfig};
use crate::page::Context;
use crate::paginate::{latest_file_path, paginate, PathTable};
use crate::plugin::ImageIndex;
use crate::similar::{self, SimilarArticles, TantivyEngine};
use crate::td2;
use crate::template::{self, Templates};
use crate::write::{self, BuildReport, Page, PageWriter};
use chrono::{DateTime, Datelike, Utc};
use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use tracing::info;

/// Builds the archive from a [`Config`] object. Pages whose output file is
/// already up to date are skipped; see [`crate::write`].
pub fn build_archive(config: &Config) -> Result<BuildReport> {
    info!(data = %config.data_directory.display(), "loading diary");
    let diary = Diary::open(&config.data_directory)?;
    let templates = Templates::load(config.templates_directory.as_deref())?;
    let images = ImageIndex::scan(&config.images_directory).map_err(|err| Error::Images {
        path: config.images_directory.clone(),
        err,
    })?;

    let visible: Vec<&Entry> = diary.visible().collect();
    let latest = diary.latest();
    info!(entries = diary.len(), visible = visible.len(), "diary loaded");
    let categories = collect_categories(&visible, config);
    let latest_windows = paginate(&latest, config.latest_limit);
    let latest_table = PathTable::new(&latest_windows);
    let similar = match config.similar_articles {
        Some(limit) => {
            info!("indexing entries for similar articles");
            let engine = TantivyEngine::build(visible.iter().copied())?;
            Some(SimilarArticles::new(Box::new(engine), limit))
        }
        None => None,
    };

    let ctx = Context {
        config,
        templates: &templates,
        images: &images,
        diary: &diary,
        categories: &categories,
        latest: &latest_table,
        similar: similar.as_ref(),
    };
    let mut writer = PageWriter::new(&config.output_directory, config.set_last_modified);

    info!(entries = visible.len(), "writing month and day pages");
    let months = month_groups(&visible);
    for (i, group) in months.iter().enumerate() {
        let older = i.checked_sub(1).and_then(|i| months.get(i)).map(|g| g.month);
        let newer = months.get(i + 1).map(|g| g.month);
        writer.write(Page {
            file_path: PathBuf::from(month_url(group.month.0, group.month.1)),
            last_modified: newest(group.entries),
            render: || ctx.month_page(group.month, group.entries, older, newer),
        })?;

        for (j, entry) in group.entries.iter().enumerate() {
            let position = group.start + j;
            let older = position.checked_sub(1).and_then(|p| visible.get(p)).copied();
            let newer = visible.get(position + 1).copied();
            writer.write(Page {
                file_path: PathBuf::from(day_url(entry.date)),
                last_modified: entry.last_modified,
                render: || ctx.day_page(entry, older, newer),
            })?;
        }
    }

    info!(categories = categories.len(), "writing category pages");
    for category in &categories {
        let entries: Vec<&Entry> = latest
            .iter()
            .filter(|entry| entry.categories().contains(&category.name.as_str()))
            .copied()
            .collect();
        for window in paginate(&entries, config.category_limit) {
            writer.write(Page {
                file_path: category.file_path(window.index),
                last_modified: newest(window.items),
                render: || ctx.category_page(category, &window),
            })?;
        }
    }
    if !categories.is_empty() {
        writer.write(Page {
            file_path: PathBuf::from(category::DIRECTORY).join(".htaccess"),
            last_modified: newest(&visible),
            render: || Ok::<_, Infallible>(htaccess(&categories)),
        })?;
    }

    info!(pages = latest_windows.len(), "writing latest pages");
    for window in &latest_windows {
        writer.write(Page {
            file_path: latest_file_path(window.index),
            last_modified: newest(window.items),
            render: || ctx.latest_page(&latest_windows, window),
        })?;
    }

    info!("writing feed");
    let feed_entries = feed::select(&latest);
    if !feed_entries.is_empty() {
        let feed_config = FeedConfig {
            title: &config.html_title,
            description: &config.description,
            author_name: &config.author_name,
            copyright: &config.copyright,
            base_url: &config.base_url,
            banner: config.banner.as_deref(),
            category_table: &config.category_normalize_table,
        };
        writer.write(Page {
            file_path: PathBuf::from(feed::FILE_NAME),
            last_modified: newest(&feed_entries),
            render: || {
                let hour = feed::current_hour();
                let items = feed::items(&feed_config, &feed_entries, &images, hour)?;
                feed::render(&feed_config, &items)
            },
        })?;
    }

    info!("copying static files");
    let output = &config.output_directory;
    publish(&[config.images_directory.clone()], &output.join("images"))?;
    publish(&[config.theme_directory.clone()], &output.join("theme"))?;
    publish(&config.js_directories, &output.join("js"))?;

    let report = writer.report();
    info!(written = report.written, skipped = report.skipped, "done");
    Ok(report)
}

// Every category used by a visible entry, sorted by name.
fn collect_categories(visible: &[&Entry], config: &Config) -> Vec<Category> {
    let mut names: Vec<&str> = visible.iter().flat_map(|e| e.categories()).collect();
    names.sort_unstable();
    names.dedup();
    names
        .into_iter()
        .map(|name| Category::new(name, &config.category_normalize_table))
        .collect()
}

// A run of date-ordered entries from the same month.
struct MonthGroup<'e, 'a> {
    month: (i32, u32),

    /// The position of the first entry in the whole sequence.
    start: usize,
    entries: &'e [&'a Entry],
}

fn month_groups<'e, 'a>(entries: &'e [&'a Entry]) -> Vec<MonthGroup<'e, 'a>> {
    let mut groups: Vec<MonthGroup> = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        let month = (entry.date.year(), entry.date.month());
        if let Some(group) = groups.last_mut().filter(|group| group.month == month) {
            group.entries = &entries[group.start..=i];
            continue;
        }
        groups.push(MonthGroup {
            month,
            start: i,
            entries: &entries[i..=i],
        });
    }
    groups
}

fn newest(entries: &[&Entry]) -> DateTime<Utc> {
    entries
        .iter()
        .map(|entry| entry.last_modified)
        .max()
        .unwrap_or_default()
}

type Result<T> = std::result::Result<T, Error>;

/// The error type for building an archive.
#[derive(Debug)]
pub enum Error {
    /// Returned for errors reading the diary data.
    Load(td2::Error),

    /// Returned for errors loading templates.
    Template(template::Error),

    /// Returned for I/O problems while scanning the images directory.
    Images { path: PathBuf, err: std::io::Error },

    /// Returned when the similar articles index can't be built.
    Similar(similar::Error),

    /// Returned for errors rendering or writing pages.
    Write(write::Error),

    /// Returned for errors copying static directories.
    Assets(assets::Error),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Load(err) => err.fmt(f),
            Error::Template(err) => err.fmt(f),
            Error::Images { path, err } => {
                write!(f, "Scanning images directory '{}': {}", path.display(), err)
            }
            Error::Similar(err) => err.fmt(f),
            Error::Write(err) => err.fmt(f),
            Error::Assets(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Load(err) => Some(err),
            Error::Template(err) => Some(err),
            Error::Images { path: _, err } => Some(err),
            Error::Similar(err) => Some(err),
            Error::Write(err) => Some(err),
            Error::Assets(err) => Some(err),
        }
    }
}

impl From<td2::Error> for Error {
    /// Converts [`td2::Error`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: td2::Error) -> Error {
        Error::Load(err)
    }
}

impl From<template::Error> for Error {
    /// Converts [`template::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: template::Error) -> Error {
        Error::Template(err)
    }
}

impl From<similar::Error> for Error {
    /// Converts [`similar::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: similar::Error) -> Error {
        Error::Similar(err)
    }
}

impl From<write::Error> for Error {
    /// Converts [`write::Error`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: write::Error) -> Error {
        Error::Write(err)
    }
}

impl From<assets::Error> for Error {
    /// Converts [`assets::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: assets::Error) -> Error {
        Error::Assets(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::path::Path;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    fn day(date: &str, last_modified: i64, body: &str) -> String {
        format!(
            "Date: {}\nTitle: \nLast-Modified: {}\nVisible: true\nFormat: Markdown\n\n{}\n.\n",
            date, last_modified, body
        )
    }

    fn write_data(root: &Path, days: &[String]) -> std::io::Result<()> {
        let year = root.join("data/2021");
        std::fs::create_dir_all(&year)?;
        std::fs::write(
            year.join("202101.td2"),
            format!("{}\n{}", td2::MAGIC, days.concat()),
        )
    }

    fn setup(first_modified: i64) -> std::io::Result<(tempfile::TempDir, Config)> {
        let root = tempfile::tempdir()?;
        std::fs::write(
            root.path().join(crate::config::FILE_NAME),
            "html_title: Diary\nbase_url: https://example.org/\nlatest_limit: 2\n",
        )?;
        write_data(
            root.path(),
            &[
                day("20210101", first_modified, "# [Rust] one\n\nfirst"),
                day("20210102", 1_609_545_600, "# [Misc] two\n\nsecond"),
                day("20210103", 1_609_632_000, "# [Rust] three\n\nthird"),
            ],
        )?;
        let config = Config::from_directory(root.path(), None, None)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))?;
        Ok((root, config))
    }

    #[test]
    fn test_latest_windows() -> TestResult {
        let (_root, config) = setup(1_609_459_200)?;
        build_archive(&config)?;

        let index = std::fs::read_to_string(config.output_directory.join("index.html"))?;
        assert!(index.contains(r#"id="20210103""#));
        assert!(index.contains(r#"id="20210102""#));
        assert!(!index.contains(r#"id="20210101""#));

        let older = std::fs::read_to_string(config.output_directory.join("latest/1.html"))?;
        assert!(older.contains(r#"id="20210101""#));
        assert!(!older.contains(r#"id="20210102""#));

        for path in &[
            "2021/1.html",
            "2021/1/1.html",
            "2021/1/3.html",
            "category/rust.html",
            "category/misc.html",
            "category/.htaccess",
            "index.rdf",
        ] {
            assert!(config.output_directory.join(path).is_file(), "{}", path);
        }
        Ok(())
    }

    #[test]
    fn test_rerun_writes_nothing() -> TestResult {
        let (_root, config) = setup(1_609_459_200)?;
        let first = build_archive(&config)?;
        assert!(first.written > 0);
        assert_eq!(first.skipped, 0);

        let second = build_archive(&config)?;
        assert_eq!(second.written, 0);
        assert_eq!(second.skipped, first.written);
        Ok(())
    }

    #[test]
    fn test_update_rewrites_dependent_pages() -> TestResult {
        let (root, config) = setup(1_609_459_200)?;
        let first = build_archive(&config)?;

        // 2021-01-01 is edited after everything else.
        write_data(
            root.path(),
            &[
                day("20210101", 1_609_700_000, "# [Rust] one, edited\n\nfirst"),
                day("20210102", 1_609_545_600, "# [Misc] two\n\nsecond"),
                day("20210103", 1_609_632_000, "# [Rust] three\n\nthird"),
            ],
        )?;
        let second = build_archive(&config)?;

        // Its day page, the month page, `category/rust.html`,
        // `category/.htaccess`, `latest/1.html` and the feed.
        assert_eq!(second.written, 6);
        assert_eq!(second.skipped, first.written - 6);
        let day = std::fs::read_to_string(config.output_directory.join("2021/1/1.html"))?;
        assert!(day.contains("one, edited"));
        Ok(())
    }

    #[test]
    fn test_category_windows() -> TestResult {
        let (root, _) = setup(1_609_459_200)?;
        std::fs::write(
            root.path().join(crate::config::FILE_NAME),
            "html_title: Diary\nbase_url: https://example.org/\nlatest_limit: 2\ncategory_limit: 1\n",
        )?;
        let config = Config::from_directory(root.path(), None, None)?;
        build_archive(&config)?;

        let output = &config.output_directory;
        let newest = std::fs::read_to_string(output.join("category/rust.html"))?;
        assert!(newest.contains(r#"id="20210103""#));
        assert!(!newest.contains(r#"id="20210101""#));
        assert!(newest.contains(r#"category/rust/1.html""#));

        let older = std::fs::read_to_string(output.join("category/rust/1.html"))?;
        assert!(older.contains(r#"id="20210101""#));
        assert!(!older.contains(r#"id="20210103""#));
        assert!(older.contains(r#"category/rust.html""#));
        assert!(!output.join("category/rust/2.html").exists());

        let misc = std::fs::read_to_string(output.join("category/misc.html"))?;
        assert!(misc.contains(r#"id="20210102""#));
        assert!(!output.join("category/misc").exists());

        let htaccess = std::fs::read_to_string(output.join("category/.htaccess"))?;
        assert!(htaccess.contains(r#""(.*)/Rust\.html$" "$1/rust.html""#));
        assert!(htaccess.contains(r#""(.*)/Misc\.html$" "$1/misc.html""#));
        Ok(())
    }

    #[test]
    fn test_month_groups() {
        use crate::entry::Format;
        use chrono::{NaiveDate, TimeZone};
        let entries: Vec<Entry> = [(1, 30), (1, 31), (2, 1), (4, 2)]
            .iter()
            .map(|(m, d)| {
                Entry::new(
                    NaiveDate::from_ymd_opt(2021, *m, *d).unwrap(),
                    "",
                    Utc.timestamp_opt(0, 0).unwrap(),
                    true,
                    Format::Markdown,
                    "",
                )
            })
            .collect();
        let refs: Vec<&Entry> = entries.iter().collect();
        let groups: Vec<((i32, u32), usize, usize)> = month_groups(&refs)
            .iter()
            .map(|group| (group.month, group.start, group.entries.len()))
            .collect();
        assert_eq!(
            groups,
            vec![((2021, 1), 0, 2), ((2021, 2), 2, 1), ((2021, 4), 3, 1)]
        );
    }
}
