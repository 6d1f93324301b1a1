use async_trait::async_trait;
use reqwest::{Request, Response};

/// Transport for outbound feed requests.
///
/// The server holds one of these for its whole lifetime, so implementations
/// must be shareable across concurrent requests.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends `req` and returns the response without checking its status.
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
