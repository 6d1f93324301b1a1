//! Outbound feed requests.
//!
//! All HTTP goes through the [`HttpClient`] trait so the server and tests can
//! swap in their own transport.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use tracing::debug;

use crate::error::FetchError;
use crate::feed::{FeedDocument, parse_feed};

/// Issues one GET for `url` and returns the body bytes.
///
/// # Errors
///
/// [`FetchError::Transport`] on network failure, [`FetchError::Status`] on a
/// non-success response.
pub async fn fetch_bytes<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
) -> Result<Vec<u8>, FetchError> {
    let url = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
    let req = reqwest::Request::new(reqwest::Method::GET, url);

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status(status));
    }
    Ok(resp.bytes().await?.to_vec())
}

/// Fetches and parses the vehicle position feed.
#[tracing::instrument(skip(client, url), fields(url = %url))]
pub async fn fetch_feed<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
) -> Result<FeedDocument, FetchError> {
    let bytes = fetch_bytes(client, url).await?;
    debug!(bytes = bytes.len(), "Feed bytes received, parsing");
    let feed = parse_feed(&bytes)?;
    debug!(entity_count = feed.entity.len(), "Feed parsed");
    Ok(feed)
}
