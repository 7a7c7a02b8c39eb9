use std::sync::Arc;

use resvg::tiny_skia::{Color, Pixmap, Transform};

use crate::services::render_target::RenderTarget;

/// Raster scale relative to the layout's CSS pixel size
pub const SUPERSAMPLE: f32 = 4.0;

/// Largest raster edge we agree to allocate
const MAX_EDGE_PX: u32 = 8_192;

#[derive(thiserror::Error, Debug)]
pub enum RasterizeError {
    #[error("Render target has no layout")]
    Unpopulated,

    #[error("Layout references a non-embedded image: {0}")]
    ExternalResource(String),

    #[error("Layout could not be parsed: {0}")]
    Parse(#[from] usvg::Error),

    #[error("Invalid raster size {0}x{1}")]
    InvalidSize(u32, u32),
}

/// An opaque RGB raster, row-major, 3 bytes per pixel
#[derive(Debug, Clone)]
pub struct Raster {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
}

impl Raster {
    #[cfg(test)]
    pub(crate) fn from_rgb(width: u32, height: u32, rgb: Vec<u8>) -> Self {
        Self { width, height, rgb }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgb(&self) -> &[u8] {
        &self.rgb
    }

    /// Pixel at (x, y), if inside the raster
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y * self.width + x) * 3) as usize;
        Some([self.rgb[i], self.rgb[i + 1], self.rgb[i + 2]])
    }
}

/// Turns a populated render target into pixels
#[derive(Clone)]
pub struct Rasterizer {
    fontdb: Arc<usvg::fontdb::Database>,
}

impl std::fmt::Debug for Rasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rasterizer")
            .field("font_faces", &self.fontdb.len())
            .finish()
    }
}

impl Rasterizer {
    /// Loads the system font set once; it is shared by every render.
    pub fn new() -> Self {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        tracing::info!(faces = db.len(), "Loaded fonts for card rendering");
        Self::with_fontdb(Arc::new(db))
    }

    pub fn with_fontdb(fontdb: Arc<usvg::fontdb::Database>) -> Self {
        Self { fontdb }
    }

    /// Renders the target's layout at [`SUPERSAMPLE`]x onto a white
    /// background. Layouts referencing anything other than inline `data:`
    /// images are refused.
    #[tracing::instrument(skip(self, target), fields(render_target = %target.id()))]
    pub fn rasterize(&self, target: &RenderTarget) -> Result<Raster, RasterizeError> {
        let layout = target.layout().ok_or(RasterizeError::Unpopulated)?;

        if let Some(href) = layout
            .image_hrefs()
            .iter()
            .find(|href| !href.starts_with("data:"))
        {
            return Err(RasterizeError::ExternalResource(href.clone()));
        }

        let options = usvg::Options {
            fontdb: Arc::clone(&self.fontdb),
            ..Default::default()
        };
        let tree = usvg::Tree::from_str(layout.svg(), &options)?;

        let size = tree.size();
        let width = (size.width() * SUPERSAMPLE).ceil() as u32;
        let height = (size.height() * SUPERSAMPLE).ceil() as u32;
        if width == 0 || height == 0 || width > MAX_EDGE_PX || height > MAX_EDGE_PX {
            return Err(RasterizeError::InvalidSize(width, height));
        }

        let mut pixmap =
            Pixmap::new(width, height).ok_or(RasterizeError::InvalidSize(width, height))?;
        pixmap.fill(Color::WHITE);
        resvg::render(
            &tree,
            Transform::from_scale(SUPERSAMPLE, SUPERSAMPLE),
            &mut pixmap.as_mut(),
        );

        // Opaque after the white fill, so premultiplied RGB is plain RGB
        let rgb = pixmap
            .data()
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();

        tracing::debug!(width, height, "Rasterized card");

        Ok(Raster { width, height, rgb })
    }
}

impl Default for Rasterizer {
    fn default() -> Self {
        Self::new()
    }
}
