//! The source store: every [`Entry`] of a diary, keyed by date.

use crate::entry::{parse_date_key, Entry};
use crate::td2;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::Path;

/// An in-memory, date-ordered view of a diary's entries.
#[derive(Default)]
pub struct Diary {
    entries: BTreeMap<NaiveDate, Entry>,
}

impl Diary {
    /// Loads every `.td2` file under `data_directory`.
    pub fn open(data_directory: &Path) -> td2::Result<Diary> {
        Ok(Diary::from_entries(td2::read_directory(data_directory)?))
    }

    /// Builds a diary from entries. A later entry for the same date replaces
    /// an earlier one.
    pub fn from_entries<I: IntoIterator<Item = Entry>>(entries: I) -> Diary {
        Diary {
            entries: entries.into_iter().map(|e| (e.date, e)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fetches the entry for `date`.
    pub fn get(&self, date: NaiveDate) -> Option<&Entry> {
        self.entries.get(&date)
    }

    /// Fetches the entry for a `YYYYMMDD` key.
    pub fn get_key(&self, key: &str) -> Option<&Entry> {
        parse_date_key(key).and_then(|date| self.get(date))
    }

    /// Every visible entry, oldest first.
    pub fn visible(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values().filter(|e| e.visible)
    }

    /// Every visible entry, newest first.
    pub fn latest(&self) -> Vec<&Entry> {
        self.entries.values().rev().filter(|e| e.visible).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entry::Format;
    use chrono::{TimeZone, Utc};

    fn entry(y: i32, m: u32, d: u32, visible: bool) -> Entry {
        Entry::new(
            NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            "",
            Utc.timestamp_opt(0, 0).unwrap(),
            visible,
            Format::Markdown,
            "",
        )
    }

    #[test]
    fn test_visible_and_latest() {
        let diary = Diary::from_entries(vec![
            entry(2021, 2, 1, true),
            entry(2020, 12, 31, true),
            entry(2021, 1, 3, false),
            entry(2021, 1, 1, true),
        ]);
        assert_eq!(diary.len(), 4);

        let visible: Vec<String> = diary.visible().map(|e| e.key()).collect();
        assert_eq!(visible, vec!["20201231", "20210101", "20210201"]);

        let latest: Vec<String> = diary.latest().iter().map(|e| e.key()).collect();
        assert_eq!(latest, vec!["20210201", "20210101", "20201231"]);

        assert!(diary.get_key("20210103").is_some());
        assert!(diary.get_key("20210104").is_none());
    }
}
