use crate::{
    api::registry::Tool,
    errors::{AppError, AppResult},
    guard::PathGuard,
    tools::{body_too_large, ensure_parent, get_checked, parse_params},
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Downloads `url` into `save_path`, streaming the body to disk. Returns the
/// number of bytes written.
///
/// A body that grows past `max_bytes` aborts the download and the partial file
/// is removed.
pub async fn fetch_and_save(
    guard: &PathGuard,
    client: &reqwest::Client,
    url: &str,
    save_path: &str,
    max_bytes: u64,
) -> AppResult<u64> {
    guard.require(&[save_path], "save_path")?;
    let response = get_checked(client, url, max_bytes).await?;

    ensure_parent(save_path).await?;
    let written = match stream_to_file(response, url, save_path, max_bytes).await {
        Ok(n) => n,
        Err(e) => {
            let _ = tokio::fs::remove_file(save_path).await;
            return Err(e);
        }
    };

    info!(url, save_path, bytes = written, "fetched");
    Ok(written)
}

/// Any error leaves a partial file behind; the caller removes it.
async fn stream_to_file(response: reqwest::Response, url: &str, save_path: &str, max_bytes: u64) -> AppResult<u64> {
    let mut file = tokio::fs::File::create(save_path)
        .await
        .map_err(|e| AppError::io("create file", save_path, e))?;
    let mut body = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk: Bytes = chunk.map_err(|e| AppError::external("http get", e))?;
        written += chunk.len() as u64;
        if written > max_bytes {
            return Err(body_too_large(url, max_bytes));
        }
        file.write_all(&chunk).await.map_err(|e| AppError::io("write file", save_path, e))?;
    }
    file.flush().await.map_err(|e| AppError::io("write file", save_path, e))?;
    Ok(written)
}

pub struct FetchTool {
    guard: PathGuard,
    client: reqwest::Client,
    max_bytes: u64,
}

impl FetchTool {
    pub fn new(guard: PathGuard, client: reqwest::Client, max_bytes: u64) -> Self {
        Self { guard, client, max_bytes }
    }
}

#[derive(Debug, Deserialize)]
struct FetchParams {
    url: String,
    save_path: String,
}

#[async_trait]
impl Tool for FetchTool {
    fn name(&self) -> &'static str { "fetch" }
    fn description(&self) -> &'static str { "Fetch a URL and save the response body under the data root." }
    fn capabilities(&self) -> serde_json::Value {
        json!({"input": {"type":"object","required":["url","save_path"],"properties": {"url": {"type":"string"},"save_path":{"type":"string"}}}, "output": {"type":"object","properties": {"bytes_written":{"type":"integer"}}}})
    }
    async fn call(&self, params: serde_json::Value) -> AppResult<serde_json::Value> {
        let p: FetchParams = parse_params(params)?;
        let written = fetch_and_save(&self.guard, &self.client, &p.url, &p.save_path, self.max_bytes).await?;
        Ok(json!({"bytes_written": written}))
    }
}
