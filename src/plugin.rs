//! Embedded plugin calls. Diary bodies call tDiary plugins inline: RD bodies
//! as `((%isbn '4774142042'%))`, Markdown bodies as `{{isbn '4774142042'}}`.
//! A call is a name followed by positional arguments, either bare or in
//! parentheses. Only a fixed set of plugins is understood; see [`Plugin`].

use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::Path;

use crate::entry::date_key;

const AMAZON_URL: &str = "https://www.amazon.co.jp/dp/";
const YOUTUBE_URL: &str = "https://www.youtube.com/embed/";

/// A parsed plugin call: a name and its positional arguments with quotes
/// removed.
#[derive(Debug, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<String>,
}

impl Call {
    /// Parses `name arg, 'arg'` or `name('arg', arg)`.
    pub fn parse(source: &str) -> Result<Call> {
        let source = source.trim();
        let name_len = source
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or_else(|| source.len());
        if name_len == 0 {
            return Err(Error::Syntax(source.to_owned()));
        }
        let name = &source[..name_len];
        let mut rest = source[name_len..].trim();
        if rest.starts_with('(') {
            rest = rest
                .strip_prefix('(')
                .and_then(|r| r.strip_suffix(')'))
                .ok_or_else(|| Error::Syntax(source.to_owned()))?;
        }
        Ok(Call {
            name: name.to_owned(),
            args: split_args(rest).ok_or_else(|| Error::Syntax(source.to_owned()))?,
        })
    }

    fn arg(&self, position: usize) -> Result<&str> {
        self.args
            .get(position)
            .map(String::as_str)
            .ok_or_else(|| Error::MissingArgument {
                plugin: self.name.clone(),
                position,
            })
    }

    fn optional_arg(&self, position: usize) -> Option<&str> {
        self.args
            .get(position)
            .map(String::as_str)
            .filter(|arg| !arg.is_empty())
    }
}

// Splits comma-separated arguments, honoring single and double quotes and
// backslash escapes inside them. Returns `None` for an unterminated quote.
fn split_args(input: &str) -> Option<Vec<String>> {
    let mut args = Vec::new();
    let mut chars = input.trim().chars().peekable();
    if chars.peek().is_none() {
        return Some(args);
    }
    loop {
        while chars.peek().map_or(false, |c| c.is_whitespace()) {
            chars.next();
        }
        let mut arg = String::new();
        match chars.peek().copied() {
            Some(quote) if quote == '\'' || quote == '"' => {
                chars.next();
                loop {
                    match chars.next()? {
                        '\\' => arg.push(chars.next()?),
                        c if c == quote => break,
                        c => arg.push(c),
                    }
                }
                while chars.peek().map_or(false, |c| *c != ',') {
                    chars.next();
                }
            }
            _ => {
                while let Some(c) = chars.peek().copied() {
                    if c == ',' {
                        break;
                    }
                    arg.push(c);
                    chars.next();
                }
                arg = arg.trim().to_owned();
            }
        }
        args.push(arg);
        match chars.next() {
            Some(',') => continue,
            _ => return Some(args),
        }
    }
}

/// Horizontal placement of an embedded image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Align {
    Left,
    Right,
}

impl Align {
    fn class(self) -> &'static str {
        match self {
            Align::Left => "left",
            Align::Right => "right",
        }
    }
}

/// The plugins that can be converted.
#[derive(Debug, PartialEq)]
pub enum Plugin {
    /// `image N, 'alt'` and its `_left`/`_right` variants: the `N`th image
    /// uploaded for the day.
    Image {
        index: u32,
        alt: String,
        align: Option<Align>,
    },

    /// `isbn`, `isbn_image`, `isbn_image_left`, `isbn_image_right` and
    /// `isbn_detail`: a link to a book.
    Isbn {
        isbn: String,
        label: Option<String>,
        align: Option<Align>,
    },

    /// `youtube 'ID'`: an embedded video.
    Youtube { id: String },

    /// `bq 'text', 'cite'`: a block quote with an optional source.
    Quote { text: String, cite: Option<String> },
}

impl Plugin {
    /// Interprets a [`Call`]. Unknown plugin names are an error.
    pub fn from_call(call: &Call) -> Result<Plugin> {
        let image = |align| -> Result<Plugin> {
            let index = call.arg(0)?;
            Ok(Plugin::Image {
                index: index.parse().map_err(|_| Error::InvalidArgument {
                    plugin: call.name.clone(),
                    value: index.to_owned(),
                })?,
                alt: call.optional_arg(1).unwrap_or_default().to_owned(),
                align,
            })
        };
        let isbn = |align| -> Result<Plugin> {
            Ok(Plugin::Isbn {
                isbn: call.arg(0)?.replace('-', ""),
                label: call.optional_arg(1).map(str::to_owned),
                align,
            })
        };

        match call.name.as_str() {
            "image" => image(None),
            "image_left" => image(Some(Align::Left)),
            "image_right" => image(Some(Align::Right)),
            "isbn" | "isbn_image" | "isbn_detail" => isbn(None),
            "isbn_image_left" => isbn(Some(Align::Left)),
            "isbn_image_right" => isbn(Some(Align::Right)),
            "youtube" => Ok(Plugin::Youtube {
                id: call.arg(0)?.to_owned(),
            }),
            "bq" => Ok(Plugin::Quote {
                text: call.arg(0)?.to_owned(),
                cite: call.optional_arg(1).map(str::to_owned),
            }),
            _ => Err(Error::Unsupported(call.name.clone())),
        }
    }

    /// Renders the plugin as Jekyll-flavoured Markdown.
    pub fn to_markdown(&self, context: &Context) -> String {
        use crate::convert::escape_markdown;
        match self {
            Plugin::Image { index, alt, align } => {
                let file = context.images.file_name(context.date, *index);
                let image = format!(
                    "![{}]({{{{ \"/images/{}\" | relative_url }}}})",
                    escape_markdown(alt),
                    file
                );
                match align {
                    Some(align) => format!("{}{{: .{}}}", image, align.class()),
                    None => image,
                }
            }
            Plugin::Isbn { isbn, label, .. } => format!(
                "[{}]({}{})",
                escape_markdown(label.as_deref().unwrap_or(isbn)),
                AMAZON_URL,
                isbn
            ),
            Plugin::Youtube { .. } | Plugin::Quote { .. } => self.to_html(context),
        }
    }

    /// Renders the plugin as HTML with root-relative links.
    pub fn to_html(&self, context: &Context) -> String {
        use crate::template::escape;
        match self {
            Plugin::Image { index, alt, align } => format!(
                r#"<img class="{}" src="images/{}" alt="{}">"#,
                align.map_or("photo", Align::class),
                escape(&context.images.file_name(context.date, *index)),
                escape(alt),
            ),
            Plugin::Isbn { isbn, label, align } => format!(
                r#"<a class="{}" href="{}{}">{}</a>"#,
                align.map_or("amazon", Align::class),
                AMAZON_URL,
                escape(isbn),
                escape(label.as_deref().unwrap_or(isbn)),
            ),
            Plugin::Youtube { id } => format!(
                r#"<iframe class="youtube" width="560" height="315" src="{}{}" frameborder="0" allowfullscreen></iframe>"#,
                YOUTUBE_URL,
                escape(id),
            ),
            Plugin::Quote { text, cite } => match cite {
                Some(cite) => format!(
                    "<blockquote><p>{}</p><cite>{}</cite></blockquote>",
                    escape(text),
                    escape(cite)
                ),
                None => format!("<blockquote><p>{}</p></blockquote>", escape(text)),
            },
        }
    }
}

/// Where converted output is headed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Target {
    /// Markdown posts for Jekyll.
    Jekyll,

    /// Markdown with inline HTML that is rendered into the static archive.
    Archive,
}

/// Everything a plugin needs to know about the entry it appears in.
pub struct Context<'a> {
    pub date: NaiveDate,
    pub images: &'a ImageIndex,
}

/// Parses and renders the call in `source` (the text between the call
/// delimiters) for `target`.
pub fn expand(source: &str, target: Target, context: &Context) -> Result<String> {
    let plugin = Plugin::from_call(&Call::parse(source)?)?;
    Ok(match target {
        Target::Jekyll => plugin.to_markdown(context),
        Target::Archive => plugin.to_html(context),
    })
}

/// A piece of text that may contain `{{...}}` calls.
#[derive(Debug, PartialEq)]
pub enum Segment<'a> {
    Text(&'a str),
    Call(&'a str),
}

/// Splits `text` into literal text and the sources of `{{...}}` calls. An
/// unterminated `{{` is kept as text.
pub fn split_braced(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("{{") {
        let close = match rest[open + 2..].find("}}") {
            Some(close) => open + 2 + close,
            None => break,
        };
        if open > 0 {
            segments.push(Segment::Text(&rest[..open]));
        }
        segments.push(Segment::Call(&rest[open + 2..close]));
        rest = &rest[close + 2..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    segments
}

/// Maps diary images (`YYYYMMDD_N.ext`) to their file names so plugin calls,
/// which only know the day and `N`, can link the right extension.
#[derive(Debug, Default)]
pub struct ImageIndex {
    files: HashMap<String, String>,
}

impl ImageIndex {
    /// Scans `directory` for image files. A missing directory yields an empty
    /// index.
    pub fn scan(directory: &Path) -> io::Result<ImageIndex> {
        let mut index = ImageIndex::default();
        let entries = match std::fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(index),
            Err(e) => return Err(e),
        };
        for entry in entries {
            let file_name = entry?.file_name().to_string_lossy().into_owned();
            if let Some((stem, _)) = file_name.rsplit_once('.') {
                index.insert(stem.to_owned(), file_name.clone());
            }
        }
        Ok(index)
    }

    /// Registers `file_name` as the image with stem `stem` (`YYYYMMDD_N`).
    pub fn insert(&mut self, stem: String, file_name: String) {
        self.files.insert(stem, file_name);
    }

    /// The file name of the `index`th image of `date`, assuming `.jpg` when
    /// it wasn't found on disk.
    pub fn file_name(&self, date: NaiveDate, index: u32) -> String {
        let stem = format!("{}_{}", date_key(date), index);
        match self.files.get(&stem) {
            Some(file_name) => file_name.clone(),
            None => format!("{}.jpg", stem),
        }
    }
}

/// The result of a fallible plugin operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a plugin call that can't be converted.
#[derive(Debug)]
pub enum Error {
    /// Returned when a call can't be parsed.
    Syntax(String),

    /// Returned for plugins without a conversion rule.
    Unsupported(String),

    /// Returned when a required argument is absent.
    MissingArgument { plugin: String, position: usize },

    /// Returned when an argument has the wrong shape.
    InvalidArgument { plugin: String, value: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Syntax(source) => write!(f, "malformed plugin call `{}`", source),
            Error::Unsupported(name) => write!(f, "unsupported plugin `{}`", name),
            Error::MissingArgument { plugin, position } => {
                write!(f, "plugin `{}` is missing argument {}", plugin, position + 1)
            }
            Error::InvalidArgument { plugin, value } => {
                write!(f, "invalid argument `{}` for plugin `{}`", value, plugin)
            }
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod test {
    use super::*;

    fn context(images: &ImageIndex) -> Context {
        Context {
            date: NaiveDate::from_ymd_opt(2021, 1, 3).unwrap(),
            images,
        }
    }

    #[test]
    fn test_parse_call() -> Result<()> {
        assert_eq!(
            Call::parse(" image 0, 'a, \\'quoted\\' alt' ")?,
            Call {
                name: "image".to_owned(),
                args: vec!["0".to_owned(), "a, 'quoted' alt".to_owned()],
            }
        );
        assert_eq!(
            Call::parse("isbn_image_right(\"4774142042\", \"Book\")")?,
            Call {
                name: "isbn_image_right".to_owned(),
                args: vec!["4774142042".to_owned(), "Book".to_owned()],
            }
        );
        assert_eq!(Call::parse("navi")?.args, Vec::<String>::new());
        assert!(matches!(Call::parse("youtube 'abc"), Err(Error::Syntax(_))));
        assert!(matches!(Call::parse("'x'"), Err(Error::Syntax(_))));
        Ok(())
    }

    #[test]
    fn test_plugins() -> Result<()> {
        let mut images = ImageIndex::default();
        images.insert("20210103_1".to_owned(), "20210103_1.png".to_owned());
        let context = context(&images);

        assert_eq!(
            expand("image 1, 'cat'", Target::Jekyll, &context)?,
            "![cat]({{ \"/images/20210103_1.png\" | relative_url }})"
        );
        assert_eq!(
            expand("image_left 0", Target::Jekyll, &context)?,
            "![]({{ \"/images/20210103_0.jpg\" | relative_url }}){: .left}"
        );
        assert_eq!(
            expand("image 1, 'cat'", Target::Archive, &context)?,
            r#"<img class="photo" src="images/20210103_1.png" alt="cat">"#
        );
        assert_eq!(
            expand("isbn_image '4-7741-4204-2', 'Book'", Target::Jekyll, &context)?,
            "[Book](https://www.amazon.co.jp/dp/4774142042)"
        );
        assert_eq!(
            expand("youtube 'dQw4w9WgXcQ'", Target::Jekyll, &context)?,
            expand("youtube 'dQw4w9WgXcQ'", Target::Archive, &context)?
        );
        assert_eq!(
            expand("bq 'to be', 'Hamlet'", Target::Archive, &context)?,
            "<blockquote><p>to be</p><cite>Hamlet</cite></blockquote>"
        );
        Ok(())
    }

    #[test]
    fn test_jekyll_link_text_is_escaped() -> Result<()> {
        let images = ImageIndex::default();
        let context = context(&images);
        assert_eq!(
            expand("image 2, 'a [b]'", Target::Jekyll, &context)?,
            "![a \\[b\\]]({{ \"/images/20210103_2.jpg\" | relative_url }})"
        );
        assert_eq!(
            expand("isbn '4774142042', 'Rust [2nd ed.]'", Target::Jekyll, &context)?,
            "[Rust \\[2nd ed.\\]](https://www.amazon.co.jp/dp/4774142042)"
        );
        Ok(())
    }

    #[test]
    fn test_plugin_errors() {
        let images = ImageIndex::default();
        let context = context(&images);
        assert!(matches!(
            expand("navi_user", Target::Jekyll, &context),
            Err(Error::Unsupported(name)) if name == "navi_user"
        ));
        assert!(matches!(
            expand("image", Target::Jekyll, &context),
            Err(Error::MissingArgument { position: 0, .. })
        ));
        assert!(matches!(
            expand("image 'x'", Target::Jekyll, &context),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_split_braced() {
        assert_eq!(
            split_braced("see {{isbn '1'}} and {{youtube 'x'}}. {{ open"),
            vec![
                Segment::Text("see "),
                Segment::Call("isbn '1'"),
                Segment::Text(" and "),
                Segment::Call("youtube 'x'"),
                Segment::Text(". {{ open"),
            ]
        );
    }
}
