use crate::{
    api::registry::Tool,
    errors::{AppError, AppResult},
    guard::PathGuard,
    tools::{parse_params, write_output},
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use tracing::info;

/// Placeholder transcript; no speech-to-text backend is wired in.
pub const TRANSCRIPT_STUB: &str = "Transcribed audio text (stub).";

/// Writes the placeholder transcript for `audio_path` to `output_path` and returns it.
pub async fn transcribe_audio(guard: &PathGuard, audio_path: &str, output_path: &str) -> AppResult<String> {
    guard.require(&[audio_path, output_path], "audio_path and output_path")?;
    if !Path::new(audio_path).is_file() {
        return Err(AppError::NotFound(audio_path.to_string()));
    }
    write_output(output_path, TRANSCRIPT_STUB).await?;
    info!(audio_path, output_path, "transcript written");
    Ok(TRANSCRIPT_STUB.to_string())
}

pub struct TranscribeTool {
    guard: PathGuard,
}

impl TranscribeTool {
    pub fn new(guard: PathGuard) -> Self { Self { guard } }
}

#[derive(Debug, Deserialize)]
struct TranscribeParams {
    audio_path: String,
    output_path: String,
}

#[async_trait]
impl Tool for TranscribeTool {
    fn name(&self) -> &'static str { "transcribe" }
    fn description(&self) -> &'static str { "Transcribe an audio file to text (placeholder output)." }
    fn capabilities(&self) -> serde_json::Value {
        json!({"input": {"type":"object","required":["audio_path","output_path"],"properties": {"audio_path": {"type":"string"},"output_path":{"type":"string"}}}, "output": {"type":"object","properties": {"text":{"type":"string"}}}})
    }
    async fn call(&self, params: serde_json::Value) -> AppResult<serde_json::Value> {
        let p: TranscribeParams = parse_params(params)?;
        let text = transcribe_audio(&self.guard, &p.audio_path, &p.output_path).await?;
        Ok(json!({"text": text}))
    }
}
