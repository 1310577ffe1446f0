// spalink-api: Async Rust client for the spa vendor cloud API

pub mod auth;
pub mod client;
pub mod error;
pub mod models;
pub mod transport;

pub use auth::Credentials;
pub use client::SpaClient;
pub use error::Error;
pub use transport::TransportConfig;
