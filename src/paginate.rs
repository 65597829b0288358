//! Pagination of date-ordered entries into fixed-size windows, and the path
//! table for the paginated "latest" pages.

use crate::entry::Entry;
use std::collections::HashMap;
use std::path::PathBuf;

/// The output directory for latest pages after the first.
pub const LATEST_DIRECTORY: &str = "latest";

/// A contiguous chunk of a sorted sequence, rendered as one page.
#[derive(Debug, PartialEq)]
pub struct Window<'a, T> {
    /// The position of this window among all windows.
    pub index: usize,

    /// The items in this window.
    pub items: &'a [T],

    /// The total number of windows.
    pub total: usize,
}

impl<T> Window<'_, T> {
    /// The index of the window holding newer items, if any.
    pub fn prev(&self) -> Option<usize> {
        self.index.checked_sub(1)
    }

    /// The index of the window holding older items, if any.
    pub fn next(&self) -> Option<usize> {
        match self.index + 1 < self.total {
            true => Some(self.index + 1),
            false => None,
        }
    }
}

/// Splits `items` into windows of `limit` items. Every window is full except
/// possibly the last one. A `limit` of zero is treated as one.
pub fn paginate<T>(items: &[T], limit: usize) -> Vec<Window<'_, T>> {
    let limit = limit.max(1);
    let total = match items.len() % limit {
        0 => items.len() / limit,
        _ => items.len() / limit + 1,
    };
    items
        .chunks(limit)
        .enumerate()
        .map(|(index, items)| Window {
            index,
            items,
            total,
        })
        .collect()
}

/// The root-relative URL of the `index`th latest page.
pub fn latest_url(index: usize) -> String {
    match index {
        0 => String::from("./"),
        _ => format!("{}/{}.html", LATEST_DIRECTORY, index),
    }
}

/// The output path of the `index`th latest page.
pub fn latest_file_path(index: usize) -> PathBuf {
    match index {
        0 => PathBuf::from("index.html"),
        _ => PathBuf::from(LATEST_DIRECTORY).join(format!("{}.html", index)),
    }
}

/// Maps the key of each latest window's first (newest) entry to the window's
/// URL. Built once per run and shared with anchor resolution.
#[derive(Debug, Default)]
pub struct PathTable {
    first: HashMap<String, String>,
}

impl PathTable {
    pub fn new(windows: &[Window<&Entry>]) -> PathTable {
        let mut table = PathTable::default();
        for window in windows {
            if let Some(first) = window.items.first() {
                table.first.insert(first.key(), latest_url(window.index));
            }
        }
        table
    }

    /// The URL of the window whose newest entry has key `first_key`.
    pub fn get(&self, first_key: &str) -> Option<&str> {
        self.first.get(first_key).map(String::as_str)
    }
}
