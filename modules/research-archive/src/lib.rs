pub mod error;
pub mod fetchers;
pub mod html;
pub mod search;
pub mod store;

pub use error::{ArchiveError, Result};
pub use fetchers::{BrowserlessMethod, ChromeMethod, HttpMethod};
pub use search::SerperSearch;
pub use store::PgSummaryStore;
