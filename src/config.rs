//! Loads `diarchive.yaml`. The file is looked up from the given directory
//! upwards, and relative paths in it are resolved against the directory the
//! file lives in.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use url::Url;

/// The name of the configuration file.
pub const FILE_NAME: &str = "diarchive.yaml";

#[derive(Deserialize)]
struct PageSize(usize);
impl Default for PageSize {
    fn default() -> Self {
        PageSize(10)
    }
}

#[derive(Deserialize)]
struct SimilarArticles {
    #[serde(default = "default_similar_limit")]
    limit: usize,
}

fn default_similar_limit() -> usize {
    5
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
struct Project {
    #[serde(default)]
    data_directory: Option<PathBuf>,
    #[serde(default)]
    html_title: String,
    #[serde(default)]
    author_name: String,
    #[serde(default)]
    author_mail: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    copyright: String,
    base_url: Option<Url>,
    #[serde(default)]
    banner: Option<String>,
    #[serde(default)]
    latest_limit: PageSize,
    #[serde(default)]
    category_limit: Option<usize>,
    #[serde(default)]
    category_normalize_table: HashMap<String, String>,
    #[serde(default = "default_true")]
    set_last_modified: bool,
    #[serde(default)]
    date_format: Option<String>,
    #[serde(default)]
    images_directory: Option<PathBuf>,
    #[serde(default)]
    theme_directory: Option<PathBuf>,
    #[serde(default)]
    js_directories: Option<Vec<PathBuf>>,
    #[serde(default)]
    templates_directory: Option<PathBuf>,
    #[serde(default)]
    similar_articles: Option<SimilarArticles>,
}

/// The resolved configuration for one archive build.
#[derive(Debug)]
pub struct Config {
    /// Where the `YYYY/YYYYMM.td2` files live.
    pub data_directory: PathBuf,

    /// Where the archive is written.
    pub output_directory: PathBuf,

    pub html_title: String,
    pub author_name: String,
    pub author_mail: String,
    pub description: String,
    pub copyright: String,

    /// The public URL of the archive root. Feed links are resolved against
    /// it.
    pub base_url: Url,

    /// An optional banner image URL, shown on pages and in the feed.
    pub banner: Option<String>,

    /// Entries per latest page.
    pub latest_limit: usize,

    /// Entries per category page.
    pub category_limit: usize,

    /// Explicit category name → slug mappings.
    pub category_normalize_table: HashMap<String, String>,

    /// Whether written files get the page timestamp as their modification
    /// time. Without it every run rewrites every page.
    pub set_last_modified: bool,

    /// The `strftime` format of dates shown on pages.
    pub date_format: String,

    pub images_directory: PathBuf,
    pub theme_directory: PathBuf,
    pub js_directories: Vec<PathBuf>,

    /// Overrides for the built-in templates.
    pub templates_directory: Option<PathBuf>,

    /// How many similar articles day pages list. `None` disables the list.
    pub similar_articles: Option<usize>,
}

impl Config {
    /// Finds `diarchive.yaml` in `dir` or its closest ancestor and loads it.
    /// `output_directory` overrides the default `output` directory next to
    /// the file; `data_directory` overrides the configured data directory.
    pub fn from_directory(
        dir: &Path,
        output_directory: Option<&Path>,
        data_directory: Option<&Path>,
    ) -> Result<Config> {
        let path = dir.join(FILE_NAME);
        if path.exists() {
            Config::from_project_file(&path, output_directory, data_directory)
                .with_context(|| format!("Loading configuration `{}`", path.display()))
        } else {
            match dir.parent() {
                Some(dir) => Config::from_directory(dir, output_directory, data_directory),
                None => Err(anyhow!(
                    "Could not find `{}` in any parent directory",
                    FILE_NAME
                )),
            }
        }
    }

    pub fn from_project_file(
        path: &Path,
        output_directory: Option<&Path>,
        data_directory: Option<&Path>,
    ) -> Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Opening project file `{}`", path.display()))?;
        let project: Project = serde_yaml::from_str(&contents)?;
        let root = match path.parent() {
            Some(root) => root,
            None => {
                return Err(anyhow!(
                    "Can't get parent directory for provided project file path '{:?}'",
                    path
                ))
            }
        };
        let resolve = |path: Option<PathBuf>, default: &str| match path {
            Some(path) => root.join(path),
            None => root.join(default),
        };

        let latest_limit = project.latest_limit.0;
        Ok(Config {
            data_directory: match data_directory {
                Some(dir) => dir.to_owned(),
                None => resolve(project.data_directory, "data"),
            },
            output_directory: match output_directory {
                Some(dir) => dir.to_owned(),
                None => root.join("output"),
            },
            html_title: project.html_title,
            author_name: project.author_name,
            author_mail: project.author_mail,
            description: project.description,
            copyright: project.copyright,
            base_url: match project.base_url {
                Some(url) => url,
                None => Url::parse("http://localhost/")?,
            },
            banner: project.banner.filter(|banner| !banner.is_empty()),
            latest_limit,
            category_limit: project.category_limit.unwrap_or(latest_limit),
            category_normalize_table: project.category_normalize_table,
            set_last_modified: project.set_last_modified,
            date_format: project
                .date_format
                .unwrap_or_else(|| String::from("%Y-%m-%d")),
            images_directory: resolve(project.images_directory, "images"),
            theme_directory: resolve(project.theme_directory, "theme"),
            js_directories: match project.js_directories {
                Some(dirs) => dirs.into_iter().map(|dir| root.join(dir)).collect(),
                None => vec![root.join("js")],
            },
            templates_directory: project.templates_directory.map(|dir| root.join(dir)),
            similar_articles: project.similar_articles.map(|similar| similar.limit),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() -> Result<()> {
        let root = tempfile::tempdir()?;
        std::fs::write(
            root.path().join(FILE_NAME),
            "html_title: My Diary\nbase_url: https://example.org/diary/\n",
        )?;
        let nested = root.path().join("a/b");
        std::fs::create_dir_all(&nested)?;

        let config = Config::from_directory(&nested, None, None)?;
        assert_eq!(config.html_title, "My Diary");
        assert_eq!(config.data_directory, root.path().join("data"));
        assert_eq!(config.output_directory, root.path().join("output"));
        assert_eq!(config.latest_limit, 10);
        assert_eq!(config.category_limit, 10);
        assert!(config.set_last_modified);
        assert_eq!(config.date_format, "%Y-%m-%d");
        assert_eq!(config.js_directories, vec![root.path().join("js")]);
        assert_eq!(config.similar_articles, None);
        assert_eq!(config.banner, None);
        Ok(())
    }

    #[test]
    fn test_explicit_values() -> Result<()> {
        let root = tempfile::tempdir()?;
        std::fs::write(
            root.path().join(FILE_NAME),
            "\
data_directory: tdiary
latest_limit: 5
category_normalize_table:
  C++: cpp
set_last_modified: false
js_directories: [js, vendor/js]
similar_articles: {}
",
        )?;
        let output = root.path().join("public");
        let config = Config::from_directory(root.path(), Some(&output), None)?;
        assert_eq!(config.data_directory, root.path().join("tdiary"));
        assert_eq!(config.output_directory, output);
        assert_eq!(config.latest_limit, 5);
        assert_eq!(config.category_limit, 5);
        assert_eq!(config.category_normalize_table.get("C++").map(String::as_str), Some("cpp"));
        assert!(!config.set_last_modified);
        assert_eq!(config.js_directories.len(), 2);
        assert_eq!(config.similar_articles, Some(5));
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let root = tempfile::tempdir().unwrap();
        // Walks up to the filesystem root, which has no diarchive.yaml either.
        assert!(Config::from_directory(root.path(), None, None).is_err());
    }
}
