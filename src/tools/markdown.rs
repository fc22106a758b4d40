use crate::{
    api::registry::Tool,
    errors::{AppError, AppResult},
    guard::PathGuard,
    tools::{parse_params, read_input, write_output},
};
use async_trait::async_trait;
use pulldown_cmark::{html, Options, Parser};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

/// Renders CommonMark source to an HTML fragment.
pub fn render_html(source: &str) -> String {
    let parser = Parser::new_ext(source, Options::empty());
    let mut out = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

pub async fn markdown_to_html(guard: &PathGuard, md_path: &str, output_path: &str) -> AppResult<()> {
    guard.require(&[md_path, output_path], "md_path and output_path")?;
    let raw = read_input(md_path).await?;
    let source = String::from_utf8(raw)
        .map_err(|e| AppError::InvalidInput(format!("{md_path} is not valid UTF-8: {e}")))?;
    let rendered = render_html(&source);
    write_output(output_path, &rendered).await?;
    info!(md_path, output_path, bytes = rendered.len(), "markdown rendered");
    Ok(())
}

pub struct MarkdownTool {
    guard: PathGuard,
}

impl MarkdownTool {
    pub fn new(guard: PathGuard) -> Self { Self { guard } }
}

#[derive(Debug, Deserialize)]
struct MarkdownParams {
    md_path: String,
    output_path: String,
}

#[async_trait]
impl Tool for MarkdownTool {
    fn name(&self) -> &'static str { "markdown_to_html" }
    fn description(&self) -> &'static str { "Convert a Markdown file to HTML under the data root." }
    fn capabilities(&self) -> serde_json::Value {
        json!({"input": {"type":"object","required":["md_path","output_path"],"properties": {"md_path": {"type":"string"},"output_path":{"type":"string"}}}, "output": {"type":"object","properties": {"output_path":{"type":"string"}}}})
    }
    async fn call(&self, params: serde_json::Value) -> AppResult<serde_json::Value> {
        let p: MarkdownParams = parse_params(params)?;
        markdown_to_html(&self.guard, &p.md_path, &p.output_path).await?;
        Ok(json!({"output_path": p.output_path}))
    }
}
