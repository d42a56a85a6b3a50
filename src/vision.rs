//! Image → text description through a remote vision model.
//!
//! Images larger than the configured maximum on either side are scaled
//! down (aspect ratio preserved) before being re-encoded as PNG. The call
//! runs inside the rate-limit retry wrapper; every other failure is
//! returned to the caller immediately.

use std::path::Path;
use std::sync::Arc;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

use crate::config::{VisionConfig, AVAILABLE_VISION_MODELS};
use crate::prompts::IMAGE_DESCRIBE_PROMPT;
use crate::remote::{ImagePayload, RemoteError, VisionModel};
use crate::retry::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("Gemini не настроен: задайте GEMINI_API_KEY")]
    NotConfigured,
    #[error("не удалось открыть изображение: {0}")]
    Image(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

pub struct VisionDescriber {
    /// `None` when no vision API key is configured.
    model: Option<Arc<dyn VisionModel>>,
    model_name: String,
    max_dimension: u32,
    retry: RetryPolicy,
}

impl VisionDescriber {
    pub fn new(
        model: Option<Arc<dyn VisionModel>>,
        model_name: impl Into<String>,
        max_dimension: u32,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            max_dimension: max_dimension.max(1),
            retry,
        }
    }

    pub fn from_config(
        model: Option<Arc<dyn VisionModel>>,
        config: &VisionConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self::new(model, config.model.clone(), config.max_dimension, retry)
    }

    pub fn model(&self) -> &str {
        &self.model_name
    }

    /// Switch the model used by subsequent descriptions.
    pub fn set_model(&mut self, name: impl Into<String>) {
        self.model_name = name.into();
        tracing::info!(model = %self.model_name, "vision model switched");
    }

    pub fn available_models() -> &'static [&'static str] {
        AVAILABLE_VISION_MODELS
    }

    /// Describe the image at `path` in plain text.
    pub async fn describe(&self, path: &Path) -> Result<String, VisionError> {
        let model = self.model.as_ref().ok_or(VisionError::NotConfigured)?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| VisionError::Image(format!("{}: {}", path.display(), e)))?;
        let payload = self.prepare(&bytes)?;
        tracing::debug!(
            model = %self.model_name,
            bytes = payload.data.len(),
            "describing image"
        );

        let model_name = self.model_name.as_str();
        let payload = &payload;
        let text = self
            .retry
            .run("describe_image", || async move {
                model.generate(model_name, IMAGE_DESCRIBE_PROMPT, payload).await
            })
            .await?;
        Ok(text)
    }

    fn prepare(&self, bytes: &[u8]) -> Result<ImagePayload, VisionError> {
        let img = image::load_from_memory(bytes).map_err(|e| VisionError::Image(e.to_string()))?;
        let img = self.fit(img);
        let mut png = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| VisionError::Image(e.to_string()))?;
        Ok(ImagePayload {
            mime_type: "image/png".to_string(),
            data: png,
        })
    }

    fn fit(&self, img: DynamicImage) -> DynamicImage {
        if img.width() <= self.max_dimension && img.height() <= self.max_dimension {
            return img;
        }
        tracing::debug!(
            width = img.width(),
            height = img.height(),
            max = self.max_dimension,
            "downscaling image"
        );
        img.resize(self.max_dimension, self.max_dimension, FilterType::Lanczos3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::ScriptedVision;
    use image::{GenericImageView, RgbImage};
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_png(dir: &TempDir, name: &str, w: u32, h: u32) -> std::path::PathBuf {
        let path = dir.path().join(name);
        RgbImage::from_pixel(w, h, image::Rgb([200, 120, 40]))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();
        path
    }

    fn describer(vision: &Arc<ScriptedVision>, max: u32) -> VisionDescriber {
        VisionDescriber::new(
            Some(vision.clone() as Arc<dyn VisionModel>),
            "gemini-2.0-flash",
            max,
            RetryPolicy::new(3, Duration::from_secs(5)),
        )
    }

    #[tokio::test]
    async fn small_image_is_sent_unscaled() {
        let dir = TempDir::new().unwrap();
        let path = write_png(&dir, "ad.png", 40, 30);
        let vision = Arc::new(ScriptedVision::default());

        let text = describer(&vision, 2048).describe(&path).await.unwrap();

        assert_eq!(text, ScriptedVision::DEFAULT_DESCRIPTION);
        let sent = vision.last_image().unwrap();
        assert_eq!(sent.mime_type, "image/png");
        let decoded = image::load_from_memory(&sent.data).unwrap();
        assert_eq!(decoded.dimensions(), (40, 30));
    }

    #[tokio::test]
    async fn large_image_is_downscaled_preserving_aspect() {
        let dir = TempDir::new().unwrap();
        let path = write_png(&dir, "banner.png", 400, 100);
        let vision = Arc::new(ScriptedVision::default());

        describer(&vision, 200).describe(&path).await.unwrap();

        let decoded = image::load_from_memory(&vision.last_image().unwrap().data).unwrap();
        assert_eq!(decoded.dimensions(), (200, 50));
    }

    #[tokio::test]
    async fn unreadable_image_fails_without_remote_call() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        let vision = Arc::new(ScriptedVision::default());

        let err = describer(&vision, 2048).describe(&path).await.unwrap_err();

        assert!(matches!(err, VisionError::Image(_)));
        assert_eq!(vision.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_is_retried() {
        let dir = TempDir::new().unwrap();
        let path = write_png(&dir, "ad.png", 10, 10);
        let vision = Arc::new(ScriptedVision::new(vec![
            Err(RemoteError::status(429, "quota")),
            Ok("описание".to_string()),
        ]));

        let text = describer(&vision, 2048).describe(&path).await.unwrap();

        assert_eq!(text, "описание");
        assert_eq!(vision.calls(), 2);
    }

    #[tokio::test]
    async fn other_remote_errors_fail_fast() {
        let dir = TempDir::new().unwrap();
        let path = write_png(&dir, "ad.png", 10, 10);
        let vision = Arc::new(ScriptedVision::new(vec![Err(RemoteError::status(
            400,
            "API key not valid",
        ))]));

        let err = describer(&vision, 2048).describe(&path).await.unwrap_err();

        assert!(err.to_string().contains("API key not valid"));
        assert_eq!(vision.calls(), 1);
    }

    #[tokio::test]
    async fn missing_model_is_not_configured() {
        let dir = TempDir::new().unwrap();
        let path = write_png(&dir, "ad.png", 10, 10);
        let d = VisionDescriber::new(None, "gemini-2.0-flash", 2048, RetryPolicy::default());

        let err = d.describe(&path).await.unwrap_err();

        assert!(matches!(err, VisionError::NotConfigured));
    }

    #[tokio::test]
    async fn set_model_is_used_for_next_call() {
        let dir = TempDir::new().unwrap();
        let path = write_png(&dir, "ad.png", 10, 10);
        let vision = Arc::new(ScriptedVision::default());
        let mut d = describer(&vision, 2048);

        d.set_model("gemini-2.5-pro");
        d.describe(&path).await.unwrap();

        assert_eq!(d.model(), "gemini-2.5-pro");
        assert_eq!(vision.models(), vec!["gemini-2.5-pro".to_string()]);
        assert!(VisionDescriber::available_models().contains(&"gemini-2.0-flash"));
    }
}
