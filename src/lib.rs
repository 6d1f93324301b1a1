pub mod config;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod pipeline;
pub mod reference;
pub mod server;
