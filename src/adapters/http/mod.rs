pub mod server;

pub use server::HttpServerState;
