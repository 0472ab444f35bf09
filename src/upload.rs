//! Pre-submission image upload for the image-to-video flow.
//!
//! The video model only accepts images by URL and caps their size, so a
//! local image is shrunk, re-encoded as JPEG and posted to an anonymous
//! public file host. Every failure here is [`Error::UploadFailed`] and is
//! never retried.

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use reqwest::Client;
use reqwest::multipart::{Form, Part};

use crate::error::{Error, Result};

pub const UPLOAD_ENDPOINT: &str = "https://catbox.moe/user/api.php";

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Multipart endpoint of the file host.
    pub endpoint: String,
    /// Long-edge limit in pixels; larger images are scaled down.
    pub max_edge: u32,
    pub jpeg_quality: u8,
    pub timeout: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: UPLOAD_ENDPOINT.to_string(),
            max_edge: 768,
            jpeg_quality: 80,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Shrinks local images and posts them to a public file host, returning
/// the URL the video model will fetch.
pub struct Uploader {
    config: UploadConfig,
    client: Client,
}

impl Uploader {
    pub fn new(config: UploadConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::UploadFailed(e.to_string()))?;
        Ok(Self { config, client })
    }

    /// Read, shrink and upload a local image. Returns its public URL.
    pub async fn upload_file(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::UploadFailed(format!("cannot read {}: {e}", path.display())))?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("image");
        let jpeg = shrink_to_jpeg(&bytes, self.config.max_edge, self.config.jpeg_quality)?;
        tracing::debug!(
            path = %path.display(),
            original_bytes = bytes.len(),
            jpeg_bytes = jpeg.len(),
            "Image prepared for upload",
        );
        self.upload(jpeg, &format!("{stem}.jpg")).await
    }

    /// Post JPEG bytes to the file host.
    pub async fn upload(&self, jpeg: Vec<u8>, file_name: &str) -> Result<String> {
        let part = Part::bytes(jpeg)
            .file_name(file_name.to_string())
            .mime_str("image/jpeg")
            .map_err(|e| Error::UploadFailed(e.to_string()))?;
        let form = Form::new()
            .text("reqtype", "fileupload")
            .part("fileToUpload", part);

        let response = self
            .client
            .post(&self.config.endpoint)
            .timeout(self.config.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::UploadFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::UploadFailed(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::UploadFailed(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let url = body.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(Error::UploadFailed(format!("host answered {url:?}, not a URL")));
        }
        tracing::info!(%url, "Image uploaded");
        Ok(url.to_string())
    }
}

/// Decode an image, scale it so neither side exceeds `max_edge` and encode
/// it as RGB JPEG. Images already small enough are never enlarged.
pub fn shrink_to_jpeg(bytes: &[u8], max_edge: u32, quality: u8) -> Result<Vec<u8>> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| Error::UploadFailed(format!("cannot decode image: {e}")))?;
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    let ratio = (max_edge as f64 / width as f64).min(max_edge as f64 / height as f64);
    let rgb = if ratio < 1.0 {
        let new_width = ((width as f64 * ratio) as u32).max(1);
        let new_height = ((height as f64 * ratio) as u32).max(1);
        image::imageops::resize(&rgb, new_width, new_height, FilterType::Lanczos3)
    } else {
        rgb
    };

    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&rgb)
        .map_err(|e| Error::UploadFailed(format!("cannot encode JPEG: {e}")))?;
    Ok(out.into_inner())
}
