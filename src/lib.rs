#![doc = include_str!("../README.md")]

pub mod cli;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod scrape;
pub mod select;
pub mod timeparse;
pub mod types;

pub use engine::Engine;
pub use error::{GrabError, MalformedTimestamp, Result};
pub use fetch::{FetchedPage, Fetcher, ReqwestFetcher};
pub use select::{clean_title, select_best_chapter, select_best_chapter_at, sequence_identifier};
pub use timeparse::parse_fuzzy_time;
pub use types::*;
