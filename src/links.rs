//! Rewrites links in rendered HTML. Pages are rendered with root-relative
//! links (`2021/1/3.html`); [`relativize`] prefixes them with the path from the
//! page back to the archive root, and [`absolutize`] turns them into absolute
//! URLs for the feed.

use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::OnceLock;
use url::{ParseError, Url};

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(<(?:a|link)\b[^>]*?\bhref|<(?:img|script)\b[^>]*?\bsrc)="(.*?)""#)
            .expect("link pattern is valid")
    })
}

/// How a link should be treated.
enum Kind {
    /// Has a scheme (`https:`, `mailto:`…); left alone.
    Absolute,

    /// Starts with `/`.
    HostRelative,

    /// Starts with `#`; left alone.
    Fragment,

    /// Everything else, including the empty link.
    Relative,
}

fn classify(link: &str) -> Kind {
    if link.starts_with('#') {
        return Kind::Fragment;
    }
    if link.starts_with('/') {
        return Kind::HostRelative;
    }
    match Url::parse(link) {
        Ok(_) => Kind::Absolute,
        Err(ParseError::RelativeUrlWithoutBase) => Kind::Relative,
        // Unparseable links are kept as they are.
        Err(_) => Kind::Absolute,
    }
}

fn rewrite<'h, F>(html: &'h str, mut f: F) -> Cow<'h, str>
where
    F: FnMut(&str) -> Option<String>,
{
    link_pattern().replace_all(html, |caps: &Captures| match f(&caps[2]) {
        Some(link) => format!("{}=\"{}\"", &caps[1], link),
        None => caps[0].to_owned(),
    })
}

/// Prefixes every relative `href`/`src` link in `html` with `prefix` (e.g.
/// `../../` for day pages).
pub fn relativize<'h>(html: &'h str, prefix: &str) -> Cow<'h, str> {
    if prefix.is_empty() {
        return Cow::Borrowed(html);
    }
    rewrite(html, |link| match classify(link) {
        Kind::Relative if !link.is_empty() => Some(format!("{}{}", prefix, link)),
        _ => None,
    })
}

/// Resolves every relative and host-relative `href`/`src` link in `html`
/// against `base`.
pub fn absolutize<'h>(html: &'h str, base: &Url) -> Cow<'h, str> {
    rewrite(html, |link| match classify(link) {
        Kind::Relative | Kind::HostRelative => base.join(link).ok().map(String::from),
        Kind::Absolute | Kind::Fragment => None,
    })
}

/// The path from an output file back to the archive root: one `../` per
/// directory level of `relative_path`.
pub fn root_prefix(relative_path: &std::path::Path) -> String {
    let depth = relative_path.components().count().saturating_sub(1);
    "../".repeat(depth)
}
