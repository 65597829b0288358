//! The library code for `diarchive`, which turns a tDiary data directory into
//! a static HTML archive and exports it as Jekyll posts. Building the archive
//! breaks down into three steps:
//!
//! 1. Reading entries from `YYYY/YYYYMM.td2` files ([`crate::td2`],
//!    [`crate::diary`])
//! 2. Rendering every page an entry appears on ([`crate::page`]): its day
//!    page, its month page, the pages of its categories, and the paginated
//!    latest pages
//! 3. Writing the pages whose inputs changed ([`crate::write`]), the RSS feed
//!    ([`crate::feed`]) and the static directories ([`crate::assets`])
//!
//! The second step renders entry bodies to HTML. RD bodies are first converted
//! to Markdown ([`crate::rd`], [`crate::convert`]); the same converters produce
//! the Jekyll posts ([`crate::jekyll`]).
//!
//! Every page carries the timestamp of the newest entry it shows, and a page
//! whose file already has that modification time is not rendered again, so
//! rebuilding an unchanged diary writes nothing.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod anchor;
pub mod assets;
pub mod build;
pub mod category;
pub mod config;
pub mod convert;
pub mod diary;
pub mod entry;
pub mod feed;
pub mod htmlrenderer;
pub mod jekyll;
pub mod links;
pub mod logging;
pub mod markdown;
pub mod page;
pub mod paginate;
pub mod plugin;
pub mod rd;
pub mod similar;
pub mod td2;
pub mod template;
pub mod write;
