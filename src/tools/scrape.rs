use crate::{
    api::registry::Tool,
    errors::AppResult,
    guard::PathGuard,
    tools::{get_checked, parse_params, read_capped, write_output},
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

/// Wrap width for HTML to text conversion.
const TEXT_WIDTH: usize = 100;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ScrapeOptions {
    /// Convert HTML bodies to readable plain text before saving.
    #[serde(default)]
    pub extract_text: bool,
}

/// Fetches a page and writes its body to `output_path`. Returns bytes written.
pub async fn scrape_and_save(
    guard: &PathGuard,
    client: &reqwest::Client,
    url: &str,
    output_path: &str,
    options: ScrapeOptions,
    max_bytes: u64,
) -> AppResult<u64> {
    guard.require(&[output_path], "output_path")?;
    let response = get_checked(client, url, max_bytes).await?;
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("text/html")
        .to_string();
    let body = read_capped(response, url, max_bytes).await?;

    let contents = if options.extract_text && is_html(&content_type) {
        html_to_text(&body)
    } else {
        body
    };
    write_output(output_path, &contents).await?;

    info!(url, output_path, bytes = contents.len(), extract_text = options.extract_text, "scraped");
    Ok(contents.len() as u64)
}

fn is_html(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.contains("text/html") || ct.contains("application/xhtml")
}

fn html_to_text(body: &[u8]) -> Vec<u8> {
    match html2text::from_read(body, TEXT_WIDTH) {
        Ok(text) => text.into_bytes(),
        Err(e) => {
            warn!(error = %e, "html to text conversion failed, saving raw body");
            body.to_vec()
        }
    }
}

pub struct ScrapeTool {
    guard: PathGuard,
    client: reqwest::Client,
    max_bytes: u64,
}

impl ScrapeTool {
    pub fn new(guard: PathGuard, client: reqwest::Client, max_bytes: u64) -> Self {
        Self { guard, client, max_bytes }
    }
}

#[derive(Debug, Deserialize)]
struct ScrapeParams {
    url: String,
    output_path: String,
    #[serde(flatten)]
    options: ScrapeOptions,
}

#[async_trait]
impl Tool for ScrapeTool {
    fn name(&self) -> &'static str { "scrape" }
    fn description(&self) -> &'static str { "Scrape a web page and save its content under the data root." }
    fn capabilities(&self) -> serde_json::Value {
        json!({"input": {"type":"object","required":["url","output_path"],"properties": {"url": {"type":"string"},"output_path":{"type":"string"},"extract_text":{"type":"boolean"}}}, "output": {"type":"object","properties": {"bytes_written":{"type":"integer"}}}})
    }
    async fn call(&self, params: serde_json::Value) -> AppResult<serde_json::Value> {
        let p: ScrapeParams = parse_params(params)?;
        let written = scrape_and_save(&self.guard, &self.client, &p.url, &p.output_path, p.options, self.max_bytes).await?;
        Ok(json!({"bytes_written": written}))
    }
}
