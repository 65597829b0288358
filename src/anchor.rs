//! Resolves diary anchors (`20210103`, `20210103#p01`, `202101`,
//! `20210103-10`) into root-relative archive URLs.

use crate::category::Category;
use crate::entry::parse_date_key;
use crate::paginate::PathTable;
use chrono::Datelike;
use std::collections::HashMap;

/// Resolves `anchor` into a root-relative URL. Day and month keys map to day
/// and month pages; `YYYYMMDD-N` keys (a latest page starting at a day) are
/// looked up in `latest`. Anything unresolvable yields an empty string.
pub fn anchor(anchor: &str, latest: &PathTable) -> String {
    if let Some((day, _limit)) = split_latest(anchor) {
        return latest.get(day).unwrap_or_default().to_owned();
    }

    let (key, fragment) = match anchor.find('#') {
        Some(i) => (&anchor[..i], Some(&anchor[i + 1..])),
        None => (anchor, None),
    };
    if !fragment.map_or(true, is_section_fragment) {
        return String::new();
    }

    let page = match key.len() {
        8 => match parse_date_key(key) {
            Some(date) => day_url(date),
            None => return String::new(),
        },
        6 if key.bytes().all(|b| b.is_ascii_digit()) => {
            let month: u32 = key[4..].parse().unwrap_or_default();
            if !(1..=12).contains(&month) {
                return String::new();
            }
            format!("{}/{}.html", &key[..4], month)
        }
        _ => return String::new(),
    };

    match fragment {
        Some(fragment) => format!("{}#{}", page, fragment),
        None => page,
    }
}

/// The root-relative URL of a day page.
pub fn day_url(date: chrono::NaiveDate) -> String {
    format!("{}/{}/{}.html", date.year(), date.month(), date.day())
}

/// The root-relative URL of a month page.
pub fn month_url(year: i32, month: u32) -> String {
    format!("{}/{}.html", year, month)
}

/// The anchor of the `index`th (zero-based) section of a day: `p01`, `p02`…
pub fn section_id(index: usize) -> String {
    format!("p{:02}", index + 1)
}

/// The root-relative URL of the first page of the category `name`.
pub fn category_anchor(name: &str, table: &HashMap<String, String>) -> String {
    Category::new(name, table).url(0)
}

fn split_latest(anchor: &str) -> Option<(&str, &str)> {
    let dash = anchor.find('-')?;
    let (day, limit) = (&anchor[..dash], &anchor[dash + 1..]);
    let is_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    match day.len() == 8 && is_digits(day) && is_digits(limit) {
        true => Some((day, limit)),
        false => None,
    }
}

// `p01`, `c01`, `t01`, or a bare `p`.
fn is_section_fragment(fragment: &str) -> bool {
    let mut chars = fragment.chars();
    matches!(chars.next(), Some('p') | Some('c') | Some('t'))
        && chars.all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entry::{Entry, Format};
    use crate::paginate::paginate;
    use chrono::{NaiveDate, TimeZone, Utc};

    #[test]
    fn test_day_and_month_anchors() {
        let latest = PathTable::default();
        assert_eq!(anchor("20210103", &latest), "2021/1/3.html");
        assert_eq!(anchor("20211231#p02", &latest), "2021/12/31.html#p02");
        assert_eq!(anchor("202101", &latest), "2021/1.html");
        assert_eq!(anchor("202113", &latest), "");
        assert_eq!(anchor("20210103#x", &latest), "");
        assert_eq!(anchor("hello", &latest), "");
    }

    #[test]
    fn test_latest_anchor() {
        let entries: Vec<Entry> = [3, 2, 1]
            .iter()
            .map(|d| {
                Entry::new(
                    NaiveDate::from_ymd_opt(2021, 1, *d).unwrap(),
                    "",
                    Utc.timestamp_opt(0, 0).unwrap(),
                    true,
                    Format::Markdown,
                    "",
                )
            })
            .collect();
        let refs: Vec<&Entry> = entries.iter().collect();
        let latest = PathTable::new(&paginate(&refs, 2));

        assert_eq!(anchor("20210103-2", &latest), "./");
        assert_eq!(anchor("20210101-2", &latest), "latest/1.html");
        assert_eq!(anchor("20210102-2", &latest), "");
    }

    #[test]
    fn test_category_anchor() {
        let mut table = HashMap::new();
        table.insert("C++".to_owned(), "cpp".to_owned());
        assert_eq!(category_anchor("C++", &table), "category/cpp.html");
        assert_eq!(category_anchor("Web Dev", &table), "category/web-dev.html");
    }

    #[test]
    fn test_section_id() {
        assert_eq!(section_id(0), "p01");
        assert_eq!(section_id(11), "p12");
    }
}
