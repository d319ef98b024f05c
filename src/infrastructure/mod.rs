/// Infrastructure layer - external frameworks and tools
pub mod http_client;

pub use http_client::HttpSource;
