//! Finds entries related to a given entry for the "similar articles" list on
//! day pages. The search itself sits behind [`SimilarityEngine`];
//! [`SimilarArticles`] turns engine hits into a list that never contains the
//! queried entry. [`TantivyEngine`] is the engine used for real builds.

use crate::entry::Entry;
use std::fmt;
use tantivy::collector::TopDocs;
use tantivy::query::{MoreLikeThisQuery, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, DocAddress, Index, IndexReader, Searcher, TantivyDocument, Term};
use tracing::debug;

/// One related entry, as reported by an engine.
#[derive(Clone, Debug, PartialEq)]
pub struct Hit {
    /// The `YYYYMMDD` key of the related entry.
    pub key: String,
    pub score: f32,
}

/// A search backend that ranks entries by similarity to one entry.
pub trait SimilarityEngine {
    /// Whether the entry with `key` is indexed.
    fn contains(&self, key: &str) -> Result<bool>;

    /// Up to `limit` entries most similar to the entry with `key`, most
    /// relevant first. The result may include `key` itself.
    fn more_like(&self, key: &str, limit: usize) -> Result<Vec<Hit>>;
}

/// Asks an engine for related entries.
pub struct SimilarArticles {
    engine: Box<dyn SimilarityEngine>,
    limit: usize,
}

impl SimilarArticles {
    pub fn new(engine: Box<dyn SimilarityEngine>, limit: usize) -> SimilarArticles {
        SimilarArticles { engine, limit }
    }

    /// At most `limit` entries related to `key` in engine order, never
    /// including `key`. Empty when `key` isn't indexed.
    pub fn similar(&self, key: &str) -> Result<Vec<Hit>> {
        if !self.engine.contains(key)? {
            return Ok(Vec::new());
        }
        let mut hits = self.engine.more_like(key, self.limit + 1)?;
        hits.retain(|hit| hit.key != key);
        hits.truncate(self.limit);
        Ok(hits)
    }
}

/// An in-memory Tantivy index over entry keys, titles and bodies, queried
/// with a more-like-this query.
pub struct TantivyEngine {
    reader: IndexReader,
    key_field: Field,
}

impl TantivyEngine {
    /// Indexes `entries`.
    pub fn build<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> Result<TantivyEngine> {
        let mut schema_builder = Schema::builder();
        let key_field = schema_builder.add_text_field("key", STRING | STORED);
        let title_field = schema_builder.add_text_field("title", TEXT | STORED);
        let body_field = schema_builder.add_text_field("body", TEXT | STORED);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);
        let mut writer = index.writer_with_num_threads(1, 15_000_000)?;
        let mut count = 0usize;
        for entry in entries {
            writer.add_document(doc!(
                key_field => entry.key(),
                title_field => entry.title.as_str(),
                body_field => entry.body.as_str(),
            ))?;
            count += 1;
        }
        writer.commit()?;
        debug!(entries = count, "similarity index built");

        Ok(TantivyEngine {
            reader: index.reader()?,
            key_field,
        })
    }

    fn address(&self, searcher: &Searcher, key: &str) -> Result<Option<DocAddress>> {
        let target = TermQuery::new(
            Term::from_field_text(self.key_field, key),
            IndexRecordOption::Basic,
        );
        let found = searcher.search(&target, &TopDocs::with_limit(1))?;
        Ok(found.first().map(|(_, address)| *address))
    }
}

impl SimilarityEngine for TantivyEngine {
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.address(&self.reader.searcher(), key)?.is_some())
    }

    fn more_like(&self, key: &str, limit: usize) -> Result<Vec<Hit>> {
        let searcher = self.reader.searcher();
        let address = match self.address(&searcher, key)? {
            Some(address) => address,
            None => return Ok(Vec::new()),
        };

        let query = MoreLikeThisQuery::builder()
            .with_min_doc_frequency(1)
            .with_min_term_frequency(1)
            .with_document(address);
        let mut hits = Vec::new();
        for (score, address) in searcher.search(&query, &TopDocs::with_limit(limit))? {
            let doc: TantivyDocument = searcher.doc(address)?;
            match doc.get_first(self.key_field).and_then(|v| v.as_str()) {
                Some(key) => hits.push(Hit {
                    key: key.to_owned(),
                    score,
                }),
                None => return Err(Error::MissingKey),
            }
        }
        Ok(hits)
    }
}

/// The result of a fallible similarity search.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a failed similarity search.
#[derive(Debug)]
pub enum Error {
    /// Returned when the search index fails.
    Index(tantivy::TantivyError),

    /// Returned when an indexed document has no stored key.
    MissingKey,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Index(err) => write!(f, "Searching similar articles: {}", err),
            Error::MissingKey => write!(f, "Indexed document without a key"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Index(err) => Some(err),
            Error::MissingKey => None,
        }
    }
}

impl From<tantivy::TantivyError> for Error {
    fn from(err: tantivy::TantivyError) -> Error {
        Error::Index(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entry::Format;
    use chrono::{NaiveDate, TimeZone, Utc};

    struct FakeEngine(Vec<&'static str>);

    impl SimilarityEngine for FakeEngine {
        fn contains(&self, key: &str) -> Result<bool> {
            Ok(self.0.iter().any(|k| *k == key))
        }

        fn more_like(&self, _key: &str, limit: usize) -> Result<Vec<Hit>> {
            Ok(self
                .0
                .iter()
                .take(limit)
                .enumerate()
                .map(|(i, key)| Hit {
                    key: key.to_string(),
                    score: 10.0 - i as f32,
                })
                .collect())
        }
    }

    fn keys(hits: &[Hit]) -> Vec<&str> {
        hits.iter().map(|hit| hit.key.as_str()).collect()
    }

    #[test]
    fn test_excludes_query_key() -> Result<()> {
        let engine = FakeEngine(vec!["20210101", "20210102", "20210103", "20210104"]);
        let similar = SimilarArticles::new(Box::new(engine), 2);
        assert_eq!(keys(&similar.similar("20210101")?), vec!["20210102", "20210103"]);
        assert_eq!(keys(&similar.similar("20210102")?), vec!["20210101", "20210103"]);
        Ok(())
    }

    #[test]
    fn test_unknown_key_has_no_similar_articles() -> Result<()> {
        let engine = FakeEngine(vec!["20210101", "20210102"]);
        let similar = SimilarArticles::new(Box::new(engine), 2);
        assert!(similar.similar("29991231")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_tantivy_engine() -> Result<()> {
        let entry = |day, title: &str, body: &str| {
            Entry::new(
                NaiveDate::from_ymd_opt(2021, 1, day).unwrap(),
                title,
                Utc.timestamp_opt(0, 0).unwrap(),
                true,
                Format::Markdown,
                body,
            )
        };
        let entries = vec![
            entry(1, "Rust", "borrow checker lifetimes ownership"),
            entry(2, "More Rust", "lifetimes and the borrow checker again"),
            entry(3, "Dinner", "pasta with tomato sauce"),
        ];
        let engine = TantivyEngine::build(&entries)?;
        let similar = SimilarArticles::new(Box::new(engine), 5);

        let hits = similar.similar("20210101")?;
        assert_eq!(keys(&hits), vec!["20210102"]);
        assert!(similar.similar("20991231")?.is_empty());
        Ok(())
    }
}
