pub mod artifacts;
pub mod client;
pub mod error;
pub mod extract;
pub(crate) mod rate_limit;
pub mod row;
pub mod source;

pub use artifacts::SlotsExport;
pub use client::{PageClient, SearchForm};
pub use error::{ExtractionError, ScraperError};
pub use extract::extract_slots;
pub use row::{parse_rows, HtmlRow, SlotRow};
pub use source::{is_captcha_page, ExportSource, FetchResult, PageSource, SlotSource};
