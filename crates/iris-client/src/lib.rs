#[cfg(feature = "browser")]
pub mod browser_fetcher;
pub mod extractor;
pub mod fetcher;
pub mod sink;

#[cfg(feature = "browser")]
pub use browser_fetcher::BrowserFetcher;
pub use extractor::CssExtractor;
pub use fetcher::ReqwestFetcher;
pub use sink::JsonFileSink;
