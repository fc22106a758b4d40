use crate::{
    config::Config,
    errors::AppResult,
    guard::PathGuard,
    tools::{
        csv_filter::CsvFilterTool, fetch::FetchTool, git::{GitCommitTool, GitRunner},
        markdown::MarkdownTool, query::QueryTool, resize::ImageTool, scrape::ScrapeTool,
        transcribe::TranscribeTool,
    },
};
use async_trait::async_trait;
use std::sync::Arc;

pub type DynTool = Arc<dyn Tool + Send + Sync + 'static>;

#[derive(Clone)]
pub struct ToolRegistry {
    guard: PathGuard,
    tools: Vec<(String, DynTool)>,
}

impl ToolRegistry {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let guard = PathGuard::with_policy(cfg.root.root_dir.clone(), cfg.root.policy);
        let client = crate::tools::http_client(cfg)?;
        let max_fetch_bytes = cfg.limits.max_fetch_kb * 1024;
        let git = GitRunner::new(cfg);

        let tools: Vec<DynTool> = vec![
            Arc::new(FetchTool::new(guard.clone(), client.clone(), max_fetch_bytes)),
            Arc::new(GitCommitTool::new(guard.clone(), git, cfg.checkout_dir())),
            Arc::new(QueryTool::new(guard.clone())),
            Arc::new(ScrapeTool::new(guard.clone(), client, max_fetch_bytes)),
            Arc::new(ImageTool::new(guard.clone())),
            Arc::new(TranscribeTool::new(guard.clone())),
            Arc::new(MarkdownTool::new(guard.clone())),
            Arc::new(CsvFilterTool::new(guard.clone())),
        ];
        let mut tools: Vec<(String, DynTool)> =
            tools.into_iter().map(|t| (t.name().to_string(), t)).collect();
        tools.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(Self { guard, tools })
    }

    pub fn guard(&self) -> &PathGuard { &self.guard }
    pub fn get(&self, name: &str) -> Option<DynTool> { self.tools.iter().find(|(n, _)| n == name).map(|(_, t)| t.clone()) }
    pub fn list_names(&self) -> Vec<String> { self.tools.iter().map(|(n, _)| n.clone()).collect() }
}

/// A task exposed to the calling agent.
#[async_trait]
pub trait Tool {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// `{"input": <schema>, "output": <schema>}`
    fn capabilities(&self) -> serde_json::Value;
    async fn call(&self, params: serde_json::Value) -> AppResult<serde_json::Value>;
}
