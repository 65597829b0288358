//! Renders entry sections into HTML for the archive. Markdown sections go
//! straight through pulldown-cmark; RD sections are first converted to
//! Markdown with [`crate::convert`]. Either way the result is rendered by
//! [`crate::htmlrenderer`] with root-relative links.

use crate::anchor::section_id;
use crate::convert::{self, markdown_options, Converter};
use crate::entry::{Entry, Format};
use crate::htmlrenderer;
use crate::plugin::{self, split_braced, ImageIndex, Segment, Target};
use chrono::NaiveDate;
use pulldown_cmark::*;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::OnceLock;

/// Renders the `index`th section of `entry` into HTML. Footnote anchors are
/// prefixed with `<entry key>-<section id>` so sections can share a page, and
/// a Markdown section carries the definitions of every footnote it references
/// wherever in the entry they were written.
pub fn section_html(
    entry: &Entry,
    index: usize,
    images: &ImageIndex,
) -> Result<String, Error> {
    let section = match entry.sections.get(index) {
        Some(section) => section,
        None => return Ok(String::new()),
    };
    let footnote_prefix = format!("{}-{}", entry.key(), section_id(index));
    let mut html = String::new();
    match entry.format {
        Format::Markdown => to_html(
            &mut html,
            &with_footnotes(entry, index, &section.body),
            &Settings {
                date: entry.date,
                images,
                expand_plugins: true,
                heading_offset: 2,
                footnote_prefix: &footnote_prefix,
            },
        )?,
        Format::Rd => {
            let converter = Converter::new(Target::Archive, images);
            let markdown = converter.rd_to_markdown(entry.date, &section.body)?.body;
            to_html(
                &mut html,
                &markdown,
                &Settings {
                    date: entry.date,
                    images,
                    expand_plugins: false,
                    heading_offset: 1,
                    footnote_prefix: &footnote_prefix,
                },
            )?
        }
    }
    Ok(html)
}

// Moves footnote definitions to the sections that reference them. A
// definition referenced by several sections is repeated in each of them.
fn with_footnotes(entry: &Entry, index: usize, body: &str) -> String {
    let mut definitions = HashMap::new();
    let mut own = String::new();
    for (i, section) in entry.sections.iter().enumerate() {
        let (rest, found) = split_footnote_definitions(&section.body);
        if i == index {
            own = rest;
        }
        for (label, text) in found {
            definitions.entry(label).or_insert(text);
        }
    }
    if definitions.is_empty() {
        return body.to_owned();
    }

    let mut labels: Vec<String> = Vec::new();
    for event in Parser::new_ext(&own, markdown_options()) {
        if let Event::FootnoteReference(label) = event {
            if !labels.iter().any(|l| *l == *label) {
                labels.push(label.to_string());
            }
        }
    }
    for label in labels {
        if let Some(text) = definitions.get(&label) {
            own.push_str("\n\n");
            own.push_str(text);
        }
    }
    own
}

fn footnote_definition_start(line: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^ {0,3}\[\^([^\]\s]+)\]:").expect("footnote pattern is valid")
        })
        .captures(line)
        .map(|caps| caps[1].to_owned())
}

// Splits `body` into the text outside footnote definitions and the
// definitions themselves, keyed by label. A definition runs until the first
// non-blank line that isn't indented.
fn split_footnote_definitions(body: &str) -> (String, Vec<(String, String)>) {
    let mut rest = String::new();
    let mut definitions = Vec::new();
    let mut current: Option<(String, String)> = None;
    let mut blanks = String::new();
    let mut in_fence = false;
    for line in body.split_inclusive('\n') {
        if current.is_none() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_fence = !in_fence;
            }
        }
        if !in_fence {
            if let Some(label) = footnote_definition_start(line) {
                definitions.extend(current.take());
                blanks.clear();
                current = Some((label, line.to_owned()));
                continue;
            }
        }
        if let Some((_, text)) = &mut current {
            if line.trim().is_empty() {
                blanks.push_str(line);
                continue;
            }
            if line.starts_with(' ') || line.starts_with('\t') {
                text.push_str(&blanks);
                text.push_str(line);
                blanks.clear();
                continue;
            }
        }
        definitions.extend(current.take());
        rest.push_str(&blanks);
        rest.push_str(line);
        blanks.clear();
    }
    definitions.extend(current);
    rest.push_str(&blanks);
    (
        rest,
        definitions
            .into_iter()
            .map(|(label, text)| (label, text.trim_end().to_owned()))
            .collect(),
    )
}

/// Renders a section subtitle (a single line of markup) into inline HTML.
pub fn subtitle_html(
    entry: &Entry,
    subtitle: &str,
    images: &ImageIndex,
) -> Result<String, Error> {
    let (markdown, expand_plugins) = match entry.format {
        Format::Markdown => (subtitle.to_owned(), true),
        Format::Rd => (
            Converter::new(Target::Archive, images)
                .rd_inline_to_markdown(entry.date, subtitle)?,
            false,
        ),
    };
    let mut html = String::new();
    to_html(
        &mut html,
        &markdown,
        &Settings {
            date: entry.date,
            images,
            expand_plugins,
            heading_offset: 0,
            footnote_prefix: &entry.key(),
        },
    )?;
    let html = html.trim();
    let html = html.strip_prefix("<p>").unwrap_or(html);
    Ok(html.strip_suffix("</p>").unwrap_or(html).to_owned())
}

/// How [`to_html`] treats its input.
pub struct Settings<'a> {
    /// The day the text was written on, for plugin calls.
    pub date: NaiveDate,
    pub images: &'a ImageIndex,

    /// Whether `{{plugin}}` calls in text are expanded.
    pub expand_plugins: bool,

    /// How many levels headings are demoted by. Sections sit below the site
    /// title (h1) and the day title (h2).
    pub heading_offset: u32,

    /// The prefix of footnote anchors.
    pub footnote_prefix: &'a str,
}

/// Converts markdown to HTML, appending the result to `out`.
pub fn to_html(out: &mut String, markdown: &str, settings: &Settings) -> Result<(), Error> {
    let event_converter = EventConverter { settings };
    let events = event_converter.convert(Parser::new_ext(markdown, markdown_options()))?;
    htmlrenderer::push_html(out, events.into_iter(), settings.footnote_prefix)?;
    Ok(())
}

struct EventConverter<'s, 'a> {
    settings: &'s Settings<'a>,
}

impl<'s, 'a> EventConverter<'s, 'a> {
    fn convert_tag<'b>(&self, tag: Tag<'b>) -> Tag<'b> {
        match tag {
            Tag::Heading(s) => Tag::Heading((s + self.settings.heading_offset).min(6)),
            _ => tag,
        }
    }

    // Merges adjacent text events (pulldown-cmark splits text at characters
    // that might start markup) and expands the plugin calls in them.
    fn convert<'b, I>(&self, events: I) -> Result<Vec<Event<'b>>, Error>
    where
        I: Iterator<Item = Event<'b>>,
    {
        let mut out = Vec::new();
        let mut text = String::new();
        let mut in_code_block = false;
        for ev in events {
            if let Event::Text(t) = &ev {
                text.push_str(t);
                continue;
            }
            self.flush(&mut out, &mut text, in_code_block)?;
            match ev {
                Event::Start(tag) => {
                    in_code_block |= matches!(tag, Tag::CodeBlock(_));
                    out.push(Event::Start(self.convert_tag(tag)));
                }
                Event::End(tag) => {
                    in_code_block &= !matches!(tag, Tag::CodeBlock(_));
                    out.push(Event::End(self.convert_tag(tag)));
                }
                _ => out.push(ev),
            }
        }
        self.flush(&mut out, &mut text, in_code_block)?;
        Ok(out)
    }

    fn flush<'b>(
        &self,
        out: &mut Vec<Event<'b>>,
        text: &mut String,
        in_code_block: bool,
    ) -> Result<(), Error> {
        if text.is_empty() {
            return Ok(());
        }
        let text = std::mem::take(text);
        if in_code_block || !self.settings.expand_plugins {
            out.push(Event::Text(CowStr::from(text)));
            return Ok(());
        }
        let context = plugin::Context {
            date: self.settings.date,
            images: self.settings.images,
        };
        for segment in split_braced(&text) {
            out.push(match segment {
                Segment::Text(t) => Event::Text(CowStr::from(t.to_owned())),
                Segment::Call(call) => Event::Html(CowStr::from(plugin::expand(
                    call,
                    Target::Archive,
                    &context,
                )?)),
            });
        }
        Ok(())
    }
}

/// Represents an error converting markdown to HTML.
#[derive(Debug)]
pub enum Error {
    /// Returned for other I/O errors.
    Io(std::io::Error),

    /// Returned when an RD section can't be converted to Markdown.
    Convert(convert::Error),

    /// Returned when a plugin call can't be expanded.
    Plugin(plugin::Error),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => err.fmt(f),
            Error::Convert(err) => err.fmt(f),
            Error::Plugin(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Convert(err) => Some(err),
            Error::Plugin(err) => Some(err),
        }
    }
}

impl From<convert::Error> for Error {
    /// Converts a [`convert::Error`] into an [`Error`].
    fn from(err: convert::Error) -> Error {
        Error::Convert(err)
    }
}

impl From<plugin::Error> for Error {
    /// Converts a [`plugin::Error`] into an [`Error`].
    fn from(err: plugin::Error) -> Error {
        Error::Plugin(err)
    }
}

impl From<io::Error> for Error {
    /// Converts a [`io::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for IO operations.
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}
