pub mod csv_filter;
pub mod fetch;
pub mod git;
pub mod markdown;
pub mod query;
pub mod resize;
pub mod scrape;
pub mod transcribe;

use crate::{
    config::Config,
    errors::{AppError, AppResult},
};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("dataworks/", env!("CARGO_PKG_VERSION"));

pub fn http_client(cfg: &Config) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.limits.http_timeout_s))
        .connect_timeout(Duration::from_secs(cfg.limits.http_timeout_s.min(10)))
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()?;
    Ok(client)
}

pub(crate) fn parse_params<T: DeserializeOwned>(params: serde_json::Value) -> AppResult<T> {
    serde_json::from_value(params).map_err(|e| AppError::InvalidInput(e.to_string()))
}

/// Only http and https targets are fetched.
pub(crate) fn parse_http_url(raw: &str) -> AppResult<url::Url> {
    let parsed = url::Url::parse(raw).map_err(|e| AppError::InvalidInput(format!("invalid url {raw}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(AppError::InvalidInput(format!("unsupported url scheme '{scheme}'"))),
    }
}

/// GET `url`, failing on transport errors, non-2xx statuses and declared bodies over `max_bytes`.
pub(crate) async fn get_checked(client: &reqwest::Client, url: &str, max_bytes: u64) -> AppResult<reqwest::Response> {
    let target = parse_http_url(url)?;
    debug!(url = %target, "http get");
    let response = client.get(target).send().await.map_err(|e| {
        if e.is_timeout() { AppError::Timeout("http get") } else { AppError::external("http get", e) }
    })?;
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::external("http get", format!("{url} returned HTTP {status}")));
    }
    if let Some(len) = response.content_length() {
        if len > max_bytes {
            return Err(body_too_large(url, max_bytes));
        }
    }
    Ok(response)
}

/// Buffers the body, giving up as soon as it grows past `max_bytes`.
pub(crate) async fn read_capped(response: reqwest::Response, url: &str, max_bytes: u64) -> AppResult<Vec<u8>> {
    let mut body = response.bytes_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| AppError::external("http get", e))?;
        if (buf.len() + chunk.len()) as u64 > max_bytes {
            return Err(body_too_large(url, max_bytes));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

pub(crate) fn body_too_large(url: &str, max_bytes: u64) -> AppError {
    AppError::external("http get", format!("{url} body exceeds {max_bytes} bytes"))
}

pub(crate) async fn ensure_parent(path: &str) -> AppResult<()> {
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AppError::io("create directory", path, e))?;
    }
    Ok(())
}

pub(crate) async fn write_output(path: &str, contents: impl AsRef<[u8]>) -> AppResult<()> {
    ensure_parent(path).await?;
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| AppError::io("write file", path, e))
}

pub(crate) async fn read_input(path: &str) -> AppResult<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| AppError::io("read file", path, e))
}

/// Runs blocking library work off the async runtime.
pub(crate) async fn blocking<T, F>(work: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
}
