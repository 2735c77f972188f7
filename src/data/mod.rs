pub mod cache;
pub mod loader;
pub mod types;

pub use cache::{CacheError, CacheKey, SelectionCache};
pub use loader::{ChainQuotes, DataLoader, LoaderError, SOURCE_COLUMNS};
pub use types::{BucketKey, OptionQuote, OptionType};
