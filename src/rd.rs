//! A parser for the subset of RD (Ruby Document format) that tDiary entries
//! use. [`parse`] turns a body into a tree of [`Block`]s holding [`Inline`]s;
//! [`crate::convert`] walks the tree to produce Markdown.

use std::fmt;

/// A block-level RD element.
#[derive(Debug, PartialEq)]
pub enum Block {
    /// `=` … `====` are levels 1–4, `+` is 5 and `++` is 6.
    Headline { level: usize, title: Vec<Inline> },

    /// Consecutive unindented lines.
    TextBlock(Vec<Inline>),

    /// Indented lines. A first line of `# source: LANG` sets `language`.
    Verbatim {
        language: Option<String>,
        content: String,
    },

    /// `*` items.
    ItemList(Vec<Vec<Block>>),

    /// `(1)` items.
    EnumList(Vec<Vec<Block>>),

    /// `: term` items followed by an indented description.
    DescList(Vec<DescItem>),
}

/// An item of a [`Block::DescList`].
#[derive(Debug, PartialEq)]
pub struct DescItem {
    pub term: Vec<Inline>,
    pub description: Vec<Block>,
}

/// An inline RD element.
#[derive(Debug, PartialEq)]
pub enum Inline {
    Text(String),

    /// `((*em*))`
    Emphasis(Vec<Inline>),

    /// `(({code}))`
    Code(Vec<Inline>),

    /// `((|var|))`
    Var(Vec<Inline>),

    /// `((:index:))`
    Index(Vec<Inline>),

    /// `((-footnote-))`
    Footnote(Vec<Inline>),

    /// `((%plugin args%))`: the raw plugin call.
    Plugin(String),

    /// `((<label>))` or `((<text|label>))`.
    Reference { label: String, text: Option<String> },

    /// `(('verb'))`: literal text.
    Verb(String),
}

/// Parses an RD body.
pub fn parse(source: &str) -> Result<Vec<Block>> {
    let lines: Vec<&str> = source.lines().collect();
    parse_blocks(&lines)
}

fn indentation(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ' || *c == '\t').count()
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

// Removes up to `width` leading whitespace characters.
fn dedent(line: &str, width: usize) -> &str {
    let strip = indentation(line).min(width);
    let offset: usize = line.chars().take(strip).map(char::len_utf8).sum();
    &line[offset..]
}

fn headline(line: &str) -> Option<(usize, &str)> {
    let marks = [("====", 4), ("===", 3), ("==", 2), ("=", 1), ("++", 6), ("+", 5)];
    marks.iter().find_map(|(mark, level)| {
        let rest = line.strip_prefix(mark)?;
        match rest.starts_with(char::is_whitespace) || rest.is_empty() {
            true => Some((*level, rest.trim())),
            false => None,
        }
    })
}

// The width of a list marker and the text after it.
fn item_marker(line: &str) -> Option<(usize, &str)> {
    if let Some(rest) = line.strip_prefix("* ") {
        return Some((2, rest));
    }
    None
}

fn enum_marker(line: &str) -> Option<(usize, &str)> {
    let rest = line.strip_prefix('(')?;
    let close = rest.find(')')?;
    if close == 0 || !rest[..close].bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let after = &rest[close + 1..];
    let text = after.trim_start();
    match after.starts_with(' ') {
        true => Some((line.len() - text.len(), text)),
        false => None,
    }
}

fn desc_marker(line: &str) -> Option<&str> {
    line.strip_prefix(": ").map(str::trim)
}

fn starts_block(line: &str) -> bool {
    headline(line).is_some()
        || item_marker(line).is_some()
        || enum_marker(line).is_some()
        || desc_marker(line).is_some()
        || line.starts_with('#')
}

// Collects the lines belonging to an item that starts at `lines[start]`: the
// following lines indented by at least `width`, and blank lines followed by
// such lines. Returns the dedented lines and the index after the item.
fn item_body<'a>(lines: &[&'a str], start: usize, width: usize) -> (Vec<&'a str>, usize) {
    let mut body = Vec::new();
    let mut end = start + 1;
    let mut i = start + 1;
    while i < lines.len() {
        let line = lines[i];
        if is_blank(line) {
            i += 1;
            continue;
        }
        if indentation(line) < width {
            break;
        }
        body.extend(lines[end..=i].iter().map(|line| dedent(*line, width)));
        i += 1;
        end = i;
    }
    (body, end)
}

fn parse_blocks(lines: &[&str]) -> Result<Vec<Block>> {
    let mut blocks = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if is_blank(line) {
            i += 1;
            continue;
        }

        if indentation(line) > 0 {
            let start = i;
            while i < lines.len() && (is_blank(lines[i]) || indentation(lines[i]) > 0) {
                i += 1;
            }
            let mut end = i;
            while is_blank(lines[end - 1]) {
                end -= 1;
            }
            blocks.push(verbatim(&lines[start..end]));
            continue;
        }

        if line.starts_with('#') {
            i += 1;
            continue;
        }

        if let Some((level, title)) = headline(line) {
            blocks.push(Block::Headline {
                level,
                title: parse_inlines(title)?,
            });
            i += 1;
            continue;
        }

        if item_marker(line).is_some() || enum_marker(line).is_some() {
            let enumerated = enum_marker(line).is_some();
            let mut items = Vec::new();
            while i < lines.len() {
                let marker = match enumerated {
                    true => enum_marker(lines[i]),
                    false => item_marker(lines[i]),
                };
                let (width, first) = match marker {
                    Some(marker) => marker,
                    None if is_blank(lines[i]) => {
                        i += 1;
                        continue;
                    }
                    None => break,
                };
                let (rest, end) = item_body(lines, i, width);
                let mut item_lines = vec![first];
                item_lines.extend(rest);
                items.push(parse_blocks(&item_lines)?);
                i = end;
            }
            blocks.push(match enumerated {
                true => Block::EnumList(items),
                false => Block::ItemList(items),
            });
            continue;
        }

        if desc_marker(line).is_some() {
            let mut items = Vec::new();
            while i < lines.len() {
                let term = match desc_marker(lines[i]) {
                    Some(term) => term,
                    None if is_blank(lines[i]) => {
                        i += 1;
                        continue;
                    }
                    None => break,
                };
                let width = lines[i + 1..]
                    .iter()
                    .find(|line| !is_blank(line))
                    .map(|line| indentation(line))
                    .filter(|width| *width > 0)
                    .unwrap_or(2);
                let (description, end) = item_body(lines, i, width);
                items.push(DescItem {
                    term: parse_inlines(term)?,
                    description: parse_blocks(&description)?,
                });
                i = end;
            }
            blocks.push(Block::DescList(items));
            continue;
        }

        let start = i;
        i += 1;
        while i < lines.len()
            && !is_blank(lines[i])
            && indentation(lines[i]) == 0
            && !starts_block(lines[i])
        {
            i += 1;
        }
        blocks.push(Block::TextBlock(parse_inlines(&lines[start..i].join("\n"))?));
    }
    Ok(blocks)
}

fn verbatim(lines: &[&str]) -> Block {
    let width = lines
        .iter()
        .filter(|line| !is_blank(line))
        .map(|line| indentation(line))
        .min()
        .unwrap_or_default();
    let mut lines = lines.iter().map(|line| dedent(line, width)).peekable();

    let language = lines
        .peek()
        .and_then(|first| first.strip_prefix("# source:"))
        .map(|language| language.trim().to_owned());
    if language.is_some() {
        lines.next();
    }

    let mut content = String::new();
    for line in lines {
        content.push_str(line);
        content.push('\n');
    }
    Block::Verbatim { language, content }
}

#[derive(Clone, Copy, PartialEq)]
enum Kind {
    Emphasis,
    Code,
    Var,
    Index,
    Footnote,
    Plugin,
    Reference,
    Verb,
}

const OPENERS: [(&str, &str, Kind); 8] = [
    ("((*", "*))", Kind::Emphasis),
    ("(({", "}))", Kind::Code),
    ("((|", "|))", Kind::Var),
    ("((:", ":))", Kind::Index),
    ("((-", "-))", Kind::Footnote),
    ("((%", "%))", Kind::Plugin),
    ("((<", ">))", Kind::Reference),
    ("(('", "'))", Kind::Verb),
];

/// Parses the inline elements of a text block.
pub fn parse_inlines(source: &str) -> Result<Vec<Inline>> {
    let mut cursor = source;
    parse_until(&mut cursor, None)
}

fn push_text(inlines: &mut Vec<Inline>, text: &str) {
    if text.is_empty() {
        return;
    }
    match inlines.last_mut() {
        Some(Inline::Text(last)) => last.push_str(text),
        _ => inlines.push(Inline::Text(text.to_owned())),
    }
}

// Parses inlines from `cursor` until `closer` (or the end of input when
// `closer` is `None`) and advances `cursor` past it.
fn parse_until(cursor: &mut &str, closer: Option<&str>) -> Result<Vec<Inline>> {
    let mut inlines = Vec::new();
    loop {
        let rest = *cursor;
        let next_closer = closer.and_then(|closer| rest.find(closer));
        let next_opener = rest.find("((");

        match (next_opener, next_closer) {
            (Some(open), close) if close.map_or(true, |close| open < close) => {
                let (opener, close_mark, kind) =
                    match OPENERS.iter().find(|(opener, _, _)| rest[open..].starts_with(opener)) {
                        Some(found) => *found,
                        None => {
                            push_text(&mut inlines, &rest[..open + 2]);
                            *cursor = &rest[open + 2..];
                            continue;
                        }
                    };
                push_text(&mut inlines, &rest[..open]);
                *cursor = &rest[open + opener.len()..];
                match kind {
                    Kind::Plugin | Kind::Reference | Kind::Verb => {
                        let inner = *cursor;
                        let end = inner
                            .find(close_mark)
                            .ok_or_else(|| Error::Unterminated(opener.to_owned()))?;
                        *cursor = &inner[end + close_mark.len()..];
                        inlines.push(raw_inline(kind, &inner[..end]));
                    }
                    _ => {
                        let children = parse_until(cursor, Some(close_mark))?;
                        inlines.push(match kind {
                            Kind::Emphasis => Inline::Emphasis(children),
                            Kind::Code => Inline::Code(children),
                            Kind::Var => Inline::Var(children),
                            Kind::Index => Inline::Index(children),
                            _ => Inline::Footnote(children),
                        });
                    }
                }
            }
            (_, Some(close)) => {
                push_text(&mut inlines, &rest[..close]);
                *cursor = &rest[close + closer.map_or(0, str::len)..];
                return Ok(inlines);
            }
            (_, None) => match closer {
                Some(closer) => return Err(Error::Unterminated(closer.to_owned())),
                None => {
                    push_text(&mut inlines, rest);
                    *cursor = "";
                    return Ok(inlines);
                }
            },
        }
    }
}

fn raw_inline(kind: Kind, inner: &str) -> Inline {
    match kind {
        Kind::Plugin => Inline::Plugin(inner.trim().to_owned()),
        Kind::Verb => Inline::Verb(inner.to_owned()),
        _ => {
            let unquote = |s: &str| s.trim().trim_matches('"').to_owned();
            match inner.find('|') {
                Some(bar) => Inline::Reference {
                    label: unquote(&inner[bar + 1..]),
                    text: Some(unquote(&inner[..bar])),
                },
                None => Inline::Reference {
                    label: unquote(inner),
                    text: None,
                },
            }
        }
    }
}

/// The result of parsing RD.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents malformed RD.
#[derive(Debug)]
pub enum Error {
    /// An inline element was opened but its closing mark never appeared.
    Unterminated(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Unterminated(mark) => write!(f, "unterminated RD inline `{}`", mark),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod test {
    use super::*;

    fn text(s: &str) -> Inline {
        Inline::Text(s.to_owned())
    }

    #[test]
    fn test_inlines() -> Result<()> {
        assert_eq!(
            parse_inlines("a ((*b (({c}))*)) ((%isbn '1'%)) ((<URL:https://x/>))")?,
            vec![
                text("a "),
                Inline::Emphasis(vec![text("b "), Inline::Code(vec![text("c")])]),
                text(" "),
                Inline::Plugin("isbn '1'".to_owned()),
                text(" "),
                Inline::Reference {
                    label: "URL:https://x/".to_owned(),
                    text: None,
                },
            ]
        );
        assert_eq!(
            parse_inlines("((<Yesterday|20210102#p01>)) (('((*raw*))'))((-note-)) (x)")?,
            vec![
                Inline::Reference {
                    label: "20210102#p01".to_owned(),
                    text: Some("Yesterday".to_owned()),
                },
                text(" "),
                Inline::Verb("((*raw*))".to_owned()),
                Inline::Footnote(vec![text("note")]),
                text(" (x)"),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_unterminated_inline() {
        assert!(matches!(parse_inlines("((*open"), Err(Error::Unterminated(_))));
        assert!(matches!(parse_inlines("((%open"), Err(Error::Unterminated(_))));
    }

    #[test]
    fn test_blocks() -> Result<()> {
        let source = "\
= [Rust] Title
# a comment
first line
second line

* one
  continued
* two
  * nested

(1) first
(2) second

: term
   description

  # source: glibc
  int main(void)
  {
  }
";
        let blocks = parse(source)?;
        assert_eq!(blocks.len(), 6);
        assert_eq!(
            blocks[0],
            Block::Headline {
                level: 1,
                title: vec![text("[Rust] Title")],
            }
        );
        assert_eq!(blocks[1], Block::TextBlock(vec![text("first line\nsecond line")]));
        assert_eq!(
            blocks[2],
            Block::ItemList(vec![
                vec![Block::TextBlock(vec![text("one\ncontinued")])],
                vec![
                    Block::TextBlock(vec![text("two")]),
                    Block::ItemList(vec![vec![Block::TextBlock(vec![text("nested")])]]),
                ],
            ])
        );
        assert!(matches!(&blocks[3], Block::EnumList(items) if items.len() == 2));
        assert_eq!(
            blocks[4],
            Block::DescList(vec![DescItem {
                term: vec![text("term")],
                description: vec![Block::TextBlock(vec![text("description")])],
            }])
        );
        assert_eq!(
            blocks[5],
            Block::Verbatim {
                language: Some("glibc".to_owned()),
                content: "int main(void)\n{\n}\n".to_owned(),
            }
        );
        Ok(())
    }

    #[test]
    fn test_headline_levels() -> Result<()> {
        let levels: Vec<usize> = parse("= a\n== b\n==== d\n+ e\n++ f\n")?
            .into_iter()
            .filter_map(|block| match block {
                Block::Headline { level, .. } => Some(level),
                _ => None,
            })
            .collect();
        assert_eq!(levels, vec![1, 2, 4, 5, 6]);
        Ok(())
    }
}
