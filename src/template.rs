//! Loads and executes the gtmpl templates pages are rendered with. Two
//! templates are used: `entry.html` renders one diary day and `layout.html`
//! wraps rendered entries into a page. Built-in copies are compiled in; a file
//! of the same name in the configured templates directory replaces one.

use gtmpl::{Context, Template, Value};
use pulldown_cmark::escape::escape_html;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// The file name of the entry template.
pub const ENTRY_TEMPLATE: &str = "entry.html";

/// The file name of the page layout template.
pub const LAYOUT_TEMPLATE: &str = "layout.html";

const DEFAULT_ENTRY: &str = include_str!("templates/entry.html");
const DEFAULT_LAYOUT: &str = include_str!("templates/layout.html");

/// The parsed templates.
pub struct Templates {
    pub entry: Template,
    pub layout: Template,
}

impl Templates {
    /// Parses the templates, preferring files in `directory` over the
    /// built-in ones.
    pub fn load(directory: Option<&Path>) -> Result<Templates> {
        Ok(Templates {
            entry: load(directory, ENTRY_TEMPLATE, DEFAULT_ENTRY)?,
            layout: load(directory, LAYOUT_TEMPLATE, DEFAULT_LAYOUT)?,
        })
    }
}

fn load(directory: Option<&Path>, name: &str, default: &str) -> Result<Template> {
    let contents = match directory.map(|directory| directory.join(name)) {
        Some(path) if path.is_file() => match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) => return Err(Error::OpenTemplateFile { path, err }),
        },
        _ => default.to_owned(),
    };

    let mut template = Template::default();
    template
        .parse(contents)
        .map_err(|err| Error::ParseTemplate {
            name: name.to_owned(),
            err: err.to_string(),
        })?;
    Ok(template)
}

/// Executes `template` against `value`.
pub fn render(template: &Template, value: Value) -> Result<String> {
    let context = Context::from(value).map_err(|err| Error::Execute(err.to_string()))?;
    let mut out: Vec<u8> = Vec::new();
    template
        .execute(&mut out, &context)
        .map_err(|err| Error::Execute(err.to_string()))?;
    String::from_utf8(out).map_err(|err| Error::Execute(err.to_string()))
}

/// Builds a [`Value::Object`] from field names and values.
pub fn object<'a>(fields: impl IntoIterator<Item = (&'a str, Value)>) -> Value {
    let m: HashMap<String, Value> = fields
        .into_iter()
        .map(|(name, value)| (name.to_owned(), value))
        .collect();
    Value::Object(m)
}

/// Escapes text for inclusion in HTML. Templates print values verbatim, so
/// every plain-text value is escaped before it goes into a [`Value`].
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Writing to a `String` can't fail.
    let _ = escape_html(&mut out, text);
    out
}

/// The result of a fallible templating operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a template that can't be loaded or executed.
#[derive(Debug)]
pub enum Error {
    /// Returned for I/O problems while reading template files.
    OpenTemplateFile { path: PathBuf, err: std::io::Error },

    /// Returned for errors parsing templates.
    ParseTemplate { name: String, err: String },

    /// Returned for errors executing templates.
    Execute(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::OpenTemplateFile { path, err } => {
                write!(f, "Opening template file '{}': {}", path.display(), err)
            }
            Error::ParseTemplate { name, err } => {
                write!(f, "Parsing template '{}': {}", name, err)
            }
            Error::Execute(err) => write!(f, "Executing template: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::OpenTemplateFile { path: _, err } => Some(err),
            Error::ParseTemplate { .. } | Error::Execute(_) => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; 'Jerry'&lt;/a&gt;"
        );
    }

    #[test]
    fn test_override_template() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let directory = tempfile::tempdir()?;
        std::fs::write(directory.path().join(ENTRY_TEMPLATE), "day {{.key}}")?;
        let templates = Templates::load(Some(directory.path()))?;
        let value = object(vec![("key", Value::String("20210103".to_owned()))]);
        assert_eq!(render(&templates.entry, value)?, "day 20210103");
        Ok(())
    }

    #[test]
    fn test_default_layout() -> Result<()> {
        let templates = Templates::load(None)?;
        let category = |name: &str, current: bool| {
            object(vec![
                ("name", Value::String(name.to_owned())),
                ("url", Value::String(format!("category/{}.html", name))),
                ("current", Value::Bool(current)),
            ])
        };
        let value = object(vec![
            ("title", Value::String("Diary".to_owned())),
            ("html_title", Value::String("Diary".to_owned())),
            ("author_name", Value::String("me".to_owned())),
            ("description", Value::String(String::new())),
            ("banner", Value::String(String::new())),
            ("copyright", Value::String(String::new())),
            ("content", Value::String("<p>hello</p>".to_owned())),
            ("prev", Value::Nil),
            (
                "next",
                object(vec![
                    ("url", Value::String("latest/1.html".to_owned())),
                    ("label", Value::String("Older".to_owned())),
                ]),
            ),
            ("similar", Value::Array(Vec::new())),
            (
                "categories",
                Value::Array(vec![category("rust", true), category("ruby", false)]),
            ),
        ]);
        let html = render(&templates.layout, value)?;
        assert!(html.contains("<p>hello</p>"));
        assert!(html.contains(r#"<a href="latest/1.html">Older &raquo;</a>"#));
        assert!(!html.contains("navi-prev"));
        assert!(html.contains(r#"<li class="current">rust</li>"#));
        assert!(html.contains(r#"<li><a href="category/ruby.html">ruby</a></li>"#));
        assert!(!html.contains("similar-articles"));
        Ok(())
    }
}
