//! Converts diary entries into Markdown documents. RD bodies are parsed with
//! [`crate::rd`] and Markdown bodies are re-emitted from the pulldown-cmark
//! event stream; both expand plugin calls, rewrite references and collect
//! footnotes the same way. The [`Target`] decides the Markdown dialect:
//! Jekyll posts, or the Markdown the static archive renders to HTML.

use chrono::NaiveDate;
use pulldown_cmark::{Alignment, CodeBlockKind, Event, LinkType, Options, Parser, Tag};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::anchor::day_url;
use crate::entry::{parse_date_key, split_categories, Entry, Format};
use crate::plugin::{self, split_braced, ImageIndex, Segment, Target};
use crate::rd::{self, Block, Inline};

const WIKIPEDIA_URL: &str = "https://ja.wikipedia.org/wiki/";

/// The front matter of a converted [`Document`].
#[derive(Debug, Default, PartialEq, Serialize)]
pub struct Metadata {
    /// The text of the last heading, or the entry title if there is none.
    pub title: String,

    /// The `[category]` groups of all headings, in source order.
    pub categories: Vec<String>,

    /// `Some(false)` for hidden entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
}

/// A converted entry.
#[derive(Debug)]
pub struct Document {
    pub metadata: Metadata,

    /// The file name stem. Entries have no slug of their own, so this is
    /// always `index`.
    pub slug: String,

    pub body: String,
}

impl Document {
    /// Serializes the document as a Jekyll post: YAML front matter between
    /// `---` lines, then the body.
    pub fn to_jekyll(&self) -> Result<String> {
        let yaml = serde_yaml::to_string(&self.metadata).map_err(Error::Yaml)?;
        let yaml = yaml.trim_start_matches("---").trim();
        Ok(format!("---\n{}\n---\n{}\n", yaml, self.body.trim()))
    }
}

/// The Markdown body of a converted text along with what its headings
/// declared.
#[derive(Debug, Default)]
pub struct Converted {
    pub title: Option<String>,
    pub categories: Vec<String>,
    pub body: String,
}

/// Converts entries for one [`Target`].
pub struct Converter<'a> {
    target: Target,
    images: &'a ImageIndex,
}

impl<'a> Converter<'a> {
    pub fn new(target: Target, images: &'a ImageIndex) -> Converter<'a> {
        Converter { target, images }
    }

    /// Converts a whole entry.
    pub fn convert(&self, entry: &Entry) -> Result<Document> {
        let converted = match entry.format {
            Format::Rd => self.rd_to_markdown(entry.date, &entry.body)?,
            Format::Markdown => self.markdown_to_markdown(entry.date, &entry.body)?,
        };
        Ok(Document {
            metadata: Metadata {
                title: converted.title.unwrap_or_else(|| entry.title.clone()),
                categories: converted.categories,
                published: match entry.visible {
                    true => None,
                    false => Some(false),
                },
            },
            slug: String::from("index"),
            body: converted.body,
        })
    }

    /// Converts an RD body written on `date`.
    pub fn rd_to_markdown(&self, date: NaiveDate, source: &str) -> Result<Converted> {
        let blocks = rd::parse(source)?;
        let mut writer = RdWriter::new(self, date);
        let mut parts = Vec::new();
        for block in &blocks {
            parts.push(writer.block(block)?);
        }
        parts.retain(|part| !part.is_empty());
        parts.extend(writer.footnotes.iter().enumerate().map(|(i, text)| format!("[^{}]: {}", i, text)));
        Ok(Converted {
            title: writer.title,
            categories: writer.categories,
            body: parts.join("\n\n"),
        })
    }

    /// Converts a line of RD inline markup (a section subtitle, say).
    pub fn rd_inline_to_markdown(&self, date: NaiveDate, source: &str) -> Result<String> {
        let inlines = rd::parse_inlines(source)?;
        RdWriter::new(self, date).inlines(&inlines)
    }

    /// Converts a Markdown body written on `date`.
    pub fn markdown_to_markdown(&self, date: NaiveDate, source: &str) -> Result<Converted> {
        let mut writer = MarkdownWriter::new(self, date);
        for event in Parser::new_ext(source, markdown_options()) {
            writer.on_event(event)?;
        }
        writer.finish()
    }

    fn expand_plugin(&self, date: NaiveDate, call: &str) -> Result<String> {
        let context = plugin::Context {
            date,
            images: self.images,
        };
        Ok(plugin::expand(call, self.target, &context)?)
    }

    // The URL of the day `date`, with `fragment` appended.
    fn post_url(&self, date: NaiveDate, fragment: Option<&str>) -> String {
        let url = match self.target {
            Target::Jekyll => format!("{{% post_url {}-index %}}", date.format("%Y-%m-%d")),
            Target::Archive => day_url(date),
        };
        match fragment {
            Some(fragment) => format!("{}#{}", url, fragment),
            None => url,
        }
    }

    fn code_block(&self, language: &str, content: &str) -> String {
        let fence = match content.contains("```") {
            true => "~~~~",
            false => "```",
        };
        let mut code = format!("{}{}\n{}", fence, normalize_language(language), content);
        if !content.is_empty() && !content.ends_with('\n') {
            code.push('\n');
        }
        code.push_str(fence);
        match self.target {
            Target::Jekyll => format!("{{% raw %}}\n{}\n{{% endraw %}}", code),
            Target::Archive => code,
        }
    }
}

pub(crate) fn markdown_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

fn normalize_language(language: &str) -> &str {
    match language.split_whitespace().next().unwrap_or_default() {
        "glibc" => "c",
        language => language,
    }
}

/// Escapes the characters Markdown would otherwise interpret.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '*' | '_' | '`' | '[' | ']' | '<' | '|') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn inline_code(code: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for c in code.chars() {
        run = match c {
            '`' => run + 1,
            _ => 0,
        };
        longest = longest.max(run);
    }
    let fence = "`".repeat(longest + 1);
    match code.starts_with('`') || code.ends_with('`') {
        true => format!("{} {} {}", fence, code, fence),
        false => format!("{}{}{}", fence, code, fence),
    }
}

// Prefixes the first line of `item` with `marker` and indents the rest to
// line up with it.
fn list_item(marker: &str, item: &str) -> String {
    let indent = " ".repeat(marker.chars().count());
    let mut out = String::new();
    for (i, line) in item.lines().enumerate() {
        match (i, line.is_empty()) {
            (0, _) => out.push_str(marker),
            (_, false) => {
                out.push('\n');
                out.push_str(&indent);
            }
            (_, true) => out.push('\n'),
        }
        out.push_str(line);
    }
    out
}

// The `(categories, title)` of a heading whose plain text is `plain` and
// whose rendered Markdown is `rendered`.
fn heading_text(plain: &str, rendered: &str) -> (Vec<String>, String, String) {
    let (categories, title) = split_categories(plain.trim());
    let text = match categories.is_empty() {
        true => rendered.trim().to_owned(),
        false => escape_markdown(&title),
    };
    (categories, title, text)
}

fn heading(level: usize, text: &str) -> String {
    format!("{} {}", "#".repeat((level + 1).min(6)), text)
}

struct RdWriter<'c, 'a> {
    converter: &'c Converter<'a>,
    date: NaiveDate,
    title: Option<String>,
    categories: Vec<String>,
    footnotes: Vec<String>,
}

impl<'c, 'a> RdWriter<'c, 'a> {
    fn new(converter: &'c Converter<'a>, date: NaiveDate) -> Self {
        RdWriter {
            converter,
            date,
            title: None,
            categories: Vec::new(),
            footnotes: Vec::new(),
        }
    }

    fn blocks(&mut self, blocks: &[Block]) -> Result<String> {
        let mut parts = Vec::new();
        for block in blocks {
            parts.push(self.block(block)?);
        }
        Ok(parts.join("\n"))
    }

    fn block(&mut self, block: &Block) -> Result<String> {
        Ok(match block {
            Block::Headline { level, title } => {
                let rendered = self.inlines(title)?;
                let (categories, title, text) = heading_text(&plain_text(title), &rendered);
                self.categories.extend(categories);
                self.title = Some(title);
                heading(*level, &text)
            }
            Block::TextBlock(inlines) => self.inlines(inlines)?.trim().to_owned(),
            Block::Verbatim { language, content } => self
                .converter
                .code_block(language.as_deref().unwrap_or_default(), content),
            Block::ItemList(items) => {
                let mut out = Vec::new();
                for item in items {
                    out.push(list_item("* ", &self.blocks(item)?));
                }
                out.join("\n")
            }
            Block::EnumList(items) => {
                let mut out = Vec::new();
                for (i, item) in items.iter().enumerate() {
                    out.push(list_item(&format!("{}. ", i + 1), &self.blocks(item)?));
                }
                out.join("\n")
            }
            Block::DescList(items) => {
                let mut out = Vec::new();
                for item in items {
                    let mut text = format!("**{}**", self.inlines(&item.term)?);
                    let description = self.blocks(&item.description)?;
                    if !description.is_empty() {
                        text.push('\n');
                        text.push_str(&description);
                    }
                    out.push(list_item("* ", &text));
                }
                out.join("\n")
            }
        })
    }

    fn inlines(&mut self, inlines: &[Inline]) -> Result<String> {
        let mut out = String::new();
        for inline in inlines {
            out.push_str(&self.inline(inline)?);
        }
        Ok(out)
    }

    fn inline(&mut self, inline: &Inline) -> Result<String> {
        Ok(match inline {
            Inline::Text(text) | Inline::Verb(text) => escape_markdown(text),
            Inline::Emphasis(children) | Inline::Var(children) => {
                format!("*{}*", self.inlines(children)?)
            }
            Inline::Code(children) => inline_code(&plain_text(children)),
            Inline::Index(children) => self.inlines(children)?,
            Inline::Footnote(children) => {
                let text = self.inlines(children)?;
                let index = match self.footnotes.iter().position(|t| *t == text) {
                    Some(index) => index,
                    None => {
                        self.footnotes.push(text);
                        self.footnotes.len() - 1
                    }
                };
                format!("[^{}]", index)
            }
            Inline::Plugin(call) => self.converter.expand_plugin(self.date, call)?,
            Inline::Reference { label, text } => self.reference(label, text.as_deref())?,
        })
    }

    fn reference(&self, label: &str, text: Option<&str>) -> Result<String> {
        if let Some(url) = label.strip_prefix("URL:") {
            return Ok(format!("[{}]({})", escape_markdown(text.unwrap_or(url)), url));
        }
        if let Some(title) = label.strip_prefix("wikipedia:") {
            return Ok(format!(
                "[{}]({}{})",
                escape_markdown(text.unwrap_or(title)),
                WIKIPEDIA_URL,
                urlencoding::encode(title)
            ));
        }

        let (key, fragment) = match label.find('#') {
            Some(i) => (&label[..i], Some(&label[i + 1..])),
            None => (label, None),
        };
        match parse_date_key(key) {
            Some(date) => Ok(format!(
                "[{}]({})",
                escape_markdown(text.unwrap_or(label)),
                self.converter.post_url(date, fragment)
            )),
            None => Err(Error::UnsupportedReference(label.to_owned())),
        }
    }
}

// The text of `inlines` without markup. Plugin calls and footnotes drop out.
fn plain_text(inlines: &[Inline]) -> String {
    let mut out = String::new();
    for inline in inlines {
        match inline {
            Inline::Text(text) | Inline::Verb(text) => out.push_str(text),
            Inline::Emphasis(children)
            | Inline::Code(children)
            | Inline::Var(children)
            | Inline::Index(children) => out.push_str(&plain_text(children)),
            Inline::Reference { label, text } => out.push_str(text.as_deref().unwrap_or(label)),
            Inline::Footnote(_) | Inline::Plugin(_) => {}
        }
    }
    out
}

struct Frame<'e> {
    /// `None` for the document itself.
    tag: Option<Tag<'e>>,

    /// Inline Markdown not yet closed into a block.
    inline: String,

    /// Finished child blocks.
    blocks: Vec<String>,

    /// The text content, for headings.
    plain: String,

    /// Set on items holding paragraphs, and on lists holding such items.
    loose: bool,

    rows: Vec<Vec<String>>,
    cells: Vec<String>,
}

impl<'e> Frame<'e> {
    fn new(tag: Option<Tag<'e>>) -> Self {
        Frame {
            tag,
            inline: String::new(),
            blocks: Vec::new(),
            plain: String::new(),
            loose: false,
            rows: Vec::new(),
            cells: Vec::new(),
        }
    }

    fn flush_inline(&mut self) {
        let inline = std::mem::take(&mut self.inline);
        let inline = inline.trim_end_matches('\n');
        if !inline.trim().is_empty() {
            self.blocks.push(inline.to_owned());
        }
    }

    fn push_block(&mut self, block: String) {
        self.flush_inline();
        self.blocks.push(block);
    }

    fn content(mut self, separator: &str) -> String {
        self.flush_inline();
        self.blocks.join(separator)
    }
}

// Re-emits a pulldown-cmark event stream as Markdown. Each open tag is a
// frame on `stack`; closing a tag renders its frame into the parent.
struct MarkdownWriter<'c, 'a, 'e> {
    converter: &'c Converter<'a>,
    date: NaiveDate,
    stack: Vec<Frame<'e>>,

    /// Consecutive text events, merged so plugin calls split across events
    /// are seen whole.
    text: String,

    title: Option<String>,
    categories: Vec<String>,

    /// Footnote names in order of first reference.
    footnotes: Vec<String>,
    definitions: HashMap<String, String>,
}

impl<'c, 'a, 'e> MarkdownWriter<'c, 'a, 'e> {
    fn new(converter: &'c Converter<'a>, date: NaiveDate) -> Self {
        MarkdownWriter {
            converter,
            date,
            stack: vec![Frame::new(None)],
            text: String::new(),
            title: None,
            categories: Vec::new(),
            footnotes: Vec::new(),
            definitions: HashMap::new(),
        }
    }

    fn top(&mut self) -> &mut Frame<'e> {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn in_code_block(&self) -> bool {
        self.stack
            .iter()
            .any(|frame| matches!(frame.tag, Some(Tag::CodeBlock(_))))
    }

    fn flush_text(&mut self) -> Result<()> {
        if self.text.is_empty() {
            return Ok(());
        }
        let text = std::mem::take(&mut self.text);
        let mut out = String::new();
        if self.in_code_block() {
            out = text;
        } else {
            for segment in split_braced(&text) {
                match segment {
                    Segment::Text(text) => out.push_str(&escape_markdown(text)),
                    Segment::Call(call) => {
                        out.push_str(&self.converter.expand_plugin(self.date, call)?)
                    }
                }
            }
        }
        self.top().inline.push_str(&out);
        Ok(())
    }

    fn on_event(&mut self, event: Event<'e>) -> Result<()> {
        if let Event::Text(text) = &event {
            self.text.push_str(text);
            for frame in self.stack.iter_mut() {
                frame.plain.push_str(text);
            }
            return Ok(());
        }
        self.flush_text()?;

        match event {
            Event::Start(tag) => {
                if let Tag::Paragraph = tag {
                    if let Some(Tag::Item) = self.top().tag {
                        self.top().loose = true;
                    }
                }
                self.stack.push(Frame::new(Some(tag)));
            }
            Event::End(_) => self.close()?,
            Event::Code(code) => {
                for frame in self.stack.iter_mut() {
                    frame.plain.push_str(&code);
                }
                self.top().inline.push_str(&inline_code(&code));
            }
            Event::Html(html) => self.top().inline.push_str(&html),
            Event::FootnoteReference(name) => {
                let name = name.to_string();
                let index = match self.footnotes.iter().position(|n| *n == name) {
                    Some(index) => index,
                    None => {
                        self.footnotes.push(name);
                        self.footnotes.len() - 1
                    }
                };
                self.top().inline.push_str(&format!("[^{}]", index));
            }
            Event::SoftBreak => self.top().inline.push('\n'),
            Event::HardBreak => self.top().inline.push_str("\\\n"),
            Event::Rule => self.top().push_block(String::from("* * *")),
            Event::TaskListMarker(checked) => self.top().inline.push_str(match checked {
                true => "[x] ",
                false => "[ ] ",
            }),
            Event::Text(_) => {}
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let frame = match self.stack.len() {
            0 | 1 => return Ok(()),
            _ => match self.stack.pop() {
                Some(frame) => frame,
                None => return Ok(()),
            },
        };
        let tag = match frame.tag.clone() {
            Some(tag) => tag,
            None => return Ok(()),
        };

        match tag {
            Tag::Paragraph => {
                let block = frame.inline.trim().to_owned();
                self.top().push_block(block);
            }
            Tag::Heading(level) => {
                let (categories, title, text) = heading_text(&frame.plain, &frame.inline);
                self.categories.extend(categories);
                self.title = Some(title);
                self.top().push_block(heading(level as usize, &text));
            }
            Tag::BlockQuote => {
                let content = frame.content("\n\n");
                let quoted: Vec<String> = content
                    .lines()
                    .map(|line| match line.is_empty() {
                        true => String::from(">"),
                        false => format!("> {}", line),
                    })
                    .collect();
                self.top().push_block(quoted.join("\n"));
            }
            Tag::CodeBlock(kind) => {
                let language = match &kind {
                    CodeBlockKind::Fenced(info) => info.to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                let block = self.converter.code_block(&language, &frame.inline);
                self.top().push_block(block);
            }
            Tag::List(start) => {
                let separator = match frame.loose {
                    true => "\n\n",
                    false => "\n",
                };
                let items: Vec<String> = frame
                    .blocks
                    .iter()
                    .enumerate()
                    .map(|(i, item)| match start {
                        Some(start) => list_item(&format!("{}. ", start + i as u64), item),
                        None => list_item("* ", item),
                    })
                    .collect();
                self.top().push_block(items.join(separator));
            }
            Tag::Item => {
                let loose = frame.loose;
                let item = frame.content(match loose {
                    true => "\n\n",
                    false => "\n",
                });
                let parent = self.top();
                parent.loose |= loose;
                parent.blocks.push(item);
            }
            Tag::FootnoteDefinition(name) => {
                let content = frame.content("\n\n");
                self.definitions.insert(name.to_string(), content);
            }
            Tag::Table(alignments) => {
                let mut lines = Vec::new();
                for (i, row) in frame.rows.iter().enumerate() {
                    lines.push(format!("| {} |", row.join(" | ")));
                    if i == 0 {
                        let separators: Vec<&str> = alignments
                            .iter()
                            .map(|alignment| match alignment {
                                Alignment::None => "---",
                                Alignment::Left => ":---",
                                Alignment::Center => ":---:",
                                Alignment::Right => "---:",
                            })
                            .collect();
                        lines.push(format!("| {} |", separators.join(" | ")));
                    }
                }
                self.top().push_block(lines.join("\n"));
            }
            Tag::TableHead | Tag::TableRow => {
                let cells = frame.cells;
                self.top().rows.push(cells);
            }
            Tag::TableCell => {
                let cell = frame.inline.trim().to_owned();
                self.top().cells.push(cell);
            }
            Tag::Emphasis => {
                let text = format!("*{}*", frame.inline);
                self.top().inline.push_str(&text);
            }
            Tag::Strong => {
                let text = format!("**{}**", frame.inline);
                self.top().inline.push_str(&text);
            }
            Tag::Strikethrough => {
                let text = format!("~~{}~~", frame.inline);
                self.top().inline.push_str(&text);
            }
            Tag::Link(LinkType::Autolink, url, _) | Tag::Link(LinkType::Email, url, _) => {
                let text = format!("<{}>", url);
                self.top().inline.push_str(&text);
            }
            Tag::Link(_, url, title) => {
                let text = format!("[{}]({}{})", frame.inline, url, link_title(&title));
                self.top().inline.push_str(&text);
            }
            Tag::Image(_, url, title) => {
                let text = format!("![{}]({}{})", frame.inline, url, link_title(&title));
                self.top().inline.push_str(&text);
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Converted> {
        self.flush_text()?;
        while self.stack.len() > 1 {
            self.close()?;
        }
        let mut parts = Vec::new();
        if let Some(root) = self.stack.pop() {
            parts.push(root.content("\n\n"));
        }
        for (i, name) in self.footnotes.iter().enumerate() {
            if let Some(definition) = self.definitions.get(name) {
                parts.push(format!("[^{}]: {}", i, definition));
            }
        }
        parts.retain(|part| !part.is_empty());
        Ok(Converted {
            title: self.title,
            categories: self.categories,
            body: parts.join("\n\n"),
        })
    }
}

fn link_title(title: &str) -> String {
    match title.is_empty() {
        true => String::new(),
        false => format!(" \"{}\"", title.replace('"', "\\\"")),
    }
}

/// The result of a conversion.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an entry that can't be converted.
#[derive(Debug)]
pub enum Error {
    /// Returned when an RD body is malformed.
    Rd(rd::Error),

    /// Returned for plugin calls that can't be converted.
    Plugin(plugin::Error),

    /// Returned for RD references other than URLs, Wikipedia articles and
    /// diary days.
    UnsupportedReference(String),

    /// Returned when the front matter can't be serialized.
    Yaml(serde_yaml::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Rd(err) => err.fmt(f),
            Error::Plugin(err) => err.fmt(f),
            Error::UnsupportedReference(label) => {
                write!(f, "unsupported reference `{}`", label)
            }
            Error::Yaml(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Rd(err) => Some(err),
            Error::Plugin(err) => Some(err),
            Error::UnsupportedReference(_) => None,
            Error::Yaml(err) => Some(err),
        }
    }
}

impl From<rd::Error> for Error {
    fn from(err: rd::Error) -> Error {
        Error::Rd(err)
    }
}

impl From<plugin::Error> for Error {
    fn from(err: plugin::Error) -> Error {
        Error::Plugin(err)
    }
}
