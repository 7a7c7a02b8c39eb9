use std::io::Cursor;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use image::imageops::FilterType;
use reqwest::Client;
use url::Url;

/// Edge length, in pixels, of the square photo embedded into the card
const PHOTO_EDGE_PX: u32 = 320;

#[derive(thiserror::Error, Debug)]
pub enum AssetLoadError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Upload store returned HTTP {0}")]
    Status(u16),

    #[error("Invalid photo URL: {0}")]
    InvalidUrl(String),

    #[error("Image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Image worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// A raster image inlined as a `data:` URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImage {
    data_uri: String,
    width: u32,
    height: u32,
}

impl EmbeddedImage {
    pub fn from_png_bytes(png: &[u8], width: u32, height: u32) -> Self {
        Self {
            data_uri: format!("data:image/png;base64,{}", STANDARD.encode(png)),
            width,
            height,
        }
    }

    pub fn data_uri(&self) -> &str {
        &self.data_uri
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// The photo slot content for one card
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoAsset {
    Loaded(EmbeddedImage),
    Placeholder,
}

/// Fetches subject photos from the upload store
#[derive(Debug, Clone)]
pub struct AssetLoader {
    client: Client,
    upload_base: String,
}

impl AssetLoader {
    pub fn new(upload_base: &str, timeout: Duration) -> Result<Self, AssetLoadError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, upload_base))
    }

    pub fn with_client(client: Client, upload_base: &str) -> Self {
        Self {
            client,
            upload_base: upload_base.trim_end_matches('/').to_string(),
        }
    }

    /// `<uploadBase>/<filename>`
    pub fn photo_url(&self, filename: &str) -> Result<Url, AssetLoadError> {
        let mut url = Url::parse(&format!("{}/", self.upload_base))
            .map_err(|e| AssetLoadError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| AssetLoadError::InvalidUrl(self.upload_base.clone()))?
            .pop_if_empty()
            .push(filename);
        Ok(url)
    }

    /// Resolves the photo slot. Never fails: any problem falls back to the
    /// placeholder and is only logged.
    #[tracing::instrument(skip(self))]
    pub async fn load(&self, photo: Option<&str>) -> PhotoAsset {
        let Some(filename) = photo.filter(|f| !f.trim().is_empty()) else {
            tracing::debug!("No photo attachment, using placeholder");
            return PhotoAsset::Placeholder;
        };

        match self.fetch(filename).await {
            Ok(image) => PhotoAsset::Loaded(image),
            Err(e) => {
                tracing::warn!(
                    filename = %filename,
                    error = %e,
                    "Photo could not be loaded, using placeholder"
                );
                PhotoAsset::Placeholder
            }
        }
    }

    async fn fetch(&self, filename: &str) -> Result<EmbeddedImage, AssetLoadError> {
        let url = self.photo_url(filename)?;
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(AssetLoadError::Status(response.status().as_u16()));
        }

        let bytes = response.bytes().await?;
        tokio::task::spawn_blocking(move || embed_photo(&bytes)).await?
    }
}

/// Decodes a photo, crops it to a centred square and re-encodes it as PNG
pub fn embed_photo(bytes: &[u8]) -> Result<EmbeddedImage, AssetLoadError> {
    let decoded = image::load_from_memory(bytes)?;
    let square = decoded.resize_to_fill(PHOTO_EDGE_PX, PHOTO_EDGE_PX, FilterType::Lanczos3);

    let mut png = Vec::new();
    square.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;

    Ok(EmbeddedImage::from_png_bytes(
        &png,
        square.width(),
        square.height(),
    ))
}
