mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::Result;
use reqwest::StatusCode;
use tracing::debug;

/// Status and body of a completed request.
#[derive(Debug)]
pub struct Fetched {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl Fetched {
    /// Message from a JSON `{"message": ...}` error body, if there is one.
    pub fn error_message(&self) -> Option<String> {
        let value: serde_json::Value = serde_json::from_slice(&self.body).ok()?;
        value["message"].as_str().map(str::to_string)
    }
}

/// Executes `req` and reads the whole body, whatever the status.
pub async fn fetch<C: HttpClient>(client: &C, req: reqwest::Request) -> Result<Fetched> {
    let method = req.method().clone();
    let url = req.url().to_string();

    let resp = client.execute(req).await?;
    let status = resp.status();
    let body = resp.bytes().await?.to_vec();
    debug!(%method, url = %url, %status, bytes = body.len(), "Request complete");

    Ok(Fetched { status, body })
}

/// GETs `url` and returns the body bytes.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    Ok(fetch(client, req).await?.body)
}
