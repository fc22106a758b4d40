use crate::{
    api::registry::Tool,
    errors::{AppError, AppResult},
    guard::PathGuard,
    tools::{blocking, parse_params},
};
use async_trait::async_trait;
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage, ImageError, ImageFormat, ImageReader};
use serde::Deserialize;
use serde_json::json;
use std::{fs::File, io::BufWriter, path::Path};
use tracing::info;

const DEFAULT_JPEG_QUALITY: u8 = 75;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ImageOptions {
    /// Exact target `[width, height]`; aspect ratio is not preserved.
    #[serde(default)]
    pub resize: Option<[u32; 2]>,
    /// JPEG quality, 1..=100.
    #[serde(default)]
    pub quality: Option<u8>,
}

/// Decodes `input_path`, optionally resizes it and re-encodes to `output_path`
/// in the format implied by its extension.
pub async fn transform_image(guard: &PathGuard, input_path: &str, output_path: &str, options: ImageOptions) -> AppResult<()> {
    guard.require(&[input_path, output_path], "image_path and output_path")?;
    if let Some([w, h]) = options.resize {
        if w == 0 || h == 0 {
            return Err(AppError::InvalidInput(format!("resize dimensions must be non-zero, got {w}x{h}")));
        }
    }
    if let Some(q) = options.quality {
        if !(1..=100).contains(&q) {
            return Err(AppError::InvalidInput(format!("quality must be within 1..=100, got {q}")));
        }
    }

    let (input, output) = (input_path.to_string(), output_path.to_string());
    let (width, height) = blocking(move || {
        let img = decode(&input)?;
        let img = match options.resize {
            Some([w, h]) => img.resize_exact(w, h, FilterType::Lanczos3),
            None => img,
        };
        encode(&img, &output, options.quality)?;
        Ok((img.width(), img.height()))
    })
    .await?;

    info!(input_path, output_path, width, height, "image written");
    Ok(())
}

/// The decoder is chosen from the file's leading bytes, not its extension.
fn decode(input: &str) -> AppResult<DynamicImage> {
    ImageReader::open(input)
        .map_err(|e| AppError::io("decode image", input, e))?
        .with_guessed_format()
        .map_err(|e| AppError::io("decode image", input, e))?
        .decode()
        .map_err(|e| image_err("decode image", input, e))
}

fn encode(img: &DynamicImage, output: &str, quality: Option<u8>) -> AppResult<()> {
    let format = ImageFormat::from_path(output)
        .map_err(|e| AppError::InvalidInput(format!("unsupported output format for {output}: {e}")))?;
    if let Some(parent) = Path::new(output).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| AppError::io("create directory", output, e))?;
    }
    match format {
        ImageFormat::Jpeg => {
            let file = File::create(output).map_err(|e| AppError::io("encode image", output, e))?;
            let encoder = JpegEncoder::new_with_quality(BufWriter::new(file), quality.unwrap_or(DEFAULT_JPEG_QUALITY));
            DynamicImage::ImageRgb8(img.to_rgb8())
                .write_with_encoder(encoder)
                .map_err(|e| image_err("encode image", output, e))
        }
        _ => img.save_with_format(output, format).map_err(|e| image_err("encode image", output, e)),
    }
}

fn image_err(action: &'static str, path: &str, err: ImageError) -> AppError {
    match err {
        ImageError::IoError(io) => AppError::io(action, path, io),
        other => AppError::external(action, format!("{path}: {other}")),
    }
}

pub struct ImageTool {
    guard: PathGuard,
}

impl ImageTool {
    pub fn new(guard: PathGuard) -> Self { Self { guard } }
}

#[derive(Debug, Deserialize)]
struct ImageParams {
    image_path: String,
    output_path: String,
    #[serde(flatten)]
    options: ImageOptions,
}

#[async_trait]
impl Tool for ImageTool {
    fn name(&self) -> &'static str { "image_transform" }
    fn description(&self) -> &'static str { "Resize and/or recompress an image under the data root." }
    fn capabilities(&self) -> serde_json::Value {
        json!({"input": {"type":"object","required":["image_path","output_path"],"properties": {"image_path": {"type":"string"},"output_path":{"type":"string"},"resize":{"type":"array","items":{"type":"integer"},"minItems":2,"maxItems":2},"quality":{"type":"integer"}}}, "output": {"type":"object","properties": {"output_path":{"type":"string"}}}})
    }
    async fn call(&self, params: serde_json::Value) -> AppResult<serde_json::Value> {
        let p: ImageParams = parse_params(params)?;
        transform_image(&self.guard, &p.image_path, &p.output_path, p.options).await?;
        Ok(json!({"output_path": p.output_path}))
    }
}
