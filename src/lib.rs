pub mod ai;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod library;
pub mod logger;
pub mod model;
pub mod pattern;
pub mod progress;
pub mod reader;
pub mod render;
pub mod session;
pub mod store;
pub mod utils;

pub use error::{ReaderError, Result};
pub use fetcher::ChapterFetcher;
pub use model::{ChapterData, Novel, ReaderSettings};
pub use reader::ReaderSession;
pub use session::{App, Session};
