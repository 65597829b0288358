//! Defines the [`Category`] type, which represents a section tag, and the
//! mapping from display names to the slugs used in output paths.

use gtmpl::Value;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

/// The output directory (and URL prefix) for category pages.
pub const DIRECTORY: &str = "category";

/// Represents a category. Categories are compared by display name.
#[derive(Clone, Debug)]
pub struct Category {
    /// The name as written in section headings.
    pub name: String,

    /// The URL-safe name used for output files. See [`normalize_name`].
    pub slug: String,
}

impl Category {
    /// Creates a category, normalizing `name` with `table`.
    pub fn new(name: &str, table: &HashMap<String, String>) -> Category {
        Category {
            name: name.to_owned(),
            slug: normalize_name(table, name),
        }
    }

    /// The root-relative URL of the category's `index`th page. Page 0 is
    /// `category/<slug>.html`; the others are `category/<slug>/<index>.html`.
    pub fn url(&self, index: usize) -> String {
        let slug = urlencoding::encode(&self.slug);
        match index {
            0 => format!("{}/{}.html", DIRECTORY, slug),
            _ => format!("{}/{}/{}.html", DIRECTORY, slug, index),
        }
    }

    /// The output path of the category's `index`th page, relative to the
    /// output directory. Unlike [`Category::url`] the slug isn't
    /// percent-encoded.
    pub fn file_path(&self, index: usize) -> PathBuf {
        let directory = PathBuf::from(DIRECTORY);
        match index {
            0 => directory.join(format!("{}.html", self.slug)),
            _ => directory.join(&self.slug).join(format!("{}.html", index)),
        }
    }
}

impl Hash for Category {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state)
    }
}

impl PartialEq for Category {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for Category {}

impl From<&Category> for Value {
    /// Converts [`Category`]s into [`Value`]s for templating.
    fn from(c: &Category) -> Value {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("name".to_owned(), Value::String(crate::template::escape(&c.name)));
        m.insert("url".to_owned(), Value::String(c.url(0)));
        Value::Object(m)
    }
}

/// Maps a category name to its slug: an explicit entry in `table` wins,
/// otherwise the name is lowercased and spaces and underscores become `-`.
/// Either way the slug is a single path component: path separators become
/// `-`, as do the dots of a slug made only of dots.
pub fn normalize_name(table: &HashMap<String, String>, name: &str) -> String {
    let slug = match table.get(name) {
        Some(slug) => slug.clone(),
        None => name.to_lowercase().replace(|c: char| c == ' ' || c == '_', "-"),
    };
    let slug = slug.replace(|c: char| c == '/' || c == '\\', "-");
    match slug.chars().all(|c| c == '.') {
        true => slug.replace('.', "-"),
        false => slug,
    }
}

/// Builds the `.htaccess` redirect map that sends requests for a category's
/// display-name page to its slug page. Categories whose display name already
/// is their slug get no rule.
pub fn htaccess(categories: &[Category]) -> String {
    let mut out = String::new();
    for category in categories {
        let original = format!("{}.html", category.name);
        let normalized = format!("{}.html", category.slug);
        if original == normalized {
            continue;
        }
        out.push_str(&format!(
            "RedirectMatch permanent \"(.*)/{}$\" \"$1/{}\"\n",
            regex::escape(&original),
            normalized
        ));
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_slugs_stay_inside_the_category_directory() {
        let mut table = HashMap::new();
        table.insert("Up".to_owned(), "../up".to_owned());
        assert_eq!(
            Category::new("a/../../x", &table).file_path(1),
            PathBuf::from("category/a-..-..-x/1.html")
        );
        assert_eq!(
            Category::new("..", &table).file_path(1),
            PathBuf::from("category/--/1.html")
        );
        assert_eq!(
            Category::new("Up", &table).file_path(0),
            PathBuf::from("category/..-up.html")
        );
        assert_eq!(Category::new("C:\\x", &table).slug, "c:-x");
    }

    #[test]
    fn test_normalize_name() {
        let mut table = HashMap::new();
        table.insert("C++".to_owned(), "cpp".to_owned());
        assert_eq!(normalize_name(&table, "C++"), "cpp");
        assert_eq!(normalize_name(&table, "Ruby on_Rails"), "ruby-on-rails");
        assert_eq!(normalize_name(&table, "日記"), "日記");
    }

    #[test]
    fn test_paths() {
        let category = Category::new("Free Software", &HashMap::new());
        assert_eq!(category.url(0), "category/free-software.html");
        assert_eq!(category.url(2), "category/free-software/2.html");
        assert_eq!(
            category.file_path(2),
            PathBuf::from("category/free-software/2.html")
        );

        let category = Category::new("日記", &HashMap::new());
        assert_eq!(category.url(0), "category/%E6%97%A5%E8%A8%98.html");
        assert_eq!(category.file_path(0), PathBuf::from("category/日記.html"));
    }

    #[test]
    fn test_htaccess() {
        let mut table = HashMap::new();
        table.insert("C++".to_owned(), "cpp".to_owned());
        let categories = vec![
            Category::new("C++", &table),
            Category::new("rust", &table),
            Category::new("Ruby", &table),
        ];
        assert_eq!(
            htaccess(&categories),
            "RedirectMatch permanent \"(.*)/C\\+\\+\\.html$\" \"$1/cpp.html\"\n\
             RedirectMatch permanent \"(.*)/Ruby\\.html$\" \"$1/ruby.html\"\n"
        );
    }
}
