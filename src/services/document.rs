//! Single-page PDF packaging of a rendered card.

use miniz_oxide::deflate::compress_to_vec_zlib;
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref, TextStr};

use crate::services::card_template::{CARD_HEIGHT_MM, CARD_WIDTH_MM};
use crate::services::rasterizer::Raster;

/// Width the card image occupies on the page
pub const IMAGE_WIDTH_MM: f32 = 54.0;

const PRODUCER: &str = "idcard-portal";
const IMAGE_NAME: Name<'static> = Name(b"Im1");
const DEFLATE_LEVEL: u8 = 6;

pub fn mm_to_pt(mm: f32) -> f32 {
    mm * 72.0 / 25.4
}

#[derive(thiserror::Error, Debug)]
pub enum PackageError {
    #[error("Raster is empty")]
    EmptyRaster,

    #[error("Raster dimensions {0}x{1} exceed the PDF limits")]
    Oversized(u32, u32),
}

/// Page and image placement in PDF points, origin bottom-left
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub page_width: f32,
    pub page_height: f32,
    pub image_x: f32,
    pub image_y: f32,
    pub image_width: f32,
    pub image_height: f32,
}

impl PageGeometry {
    /// Landscape card-sized page with the image pinned to the top-left
    /// corner, [`IMAGE_WIDTH_MM`] wide and scaled proportionally.
    pub fn for_raster(raster_width: u32, raster_height: u32) -> Self {
        let page_width = mm_to_pt(CARD_WIDTH_MM);
        let page_height = mm_to_pt(CARD_HEIGHT_MM);
        let image_width = mm_to_pt(IMAGE_WIDTH_MM);
        let image_height = image_width * raster_height as f32 / raster_width as f32;

        Self {
            page_width,
            page_height,
            image_x: 0.0,
            image_y: page_height - image_height,
            image_width,
            image_height,
        }
    }
}

/// Wraps the raster into a one-page PDF and returns the file bytes
#[tracing::instrument(skip(raster), fields(width = raster.width(), height = raster.height()))]
pub fn package(raster: &Raster, title: &str) -> Result<Vec<u8>, PackageError> {
    let (width, height) = (raster.width(), raster.height());
    if width == 0 || height == 0 || raster.rgb().is_empty() {
        return Err(PackageError::EmptyRaster);
    }
    let pdf_width = i32::try_from(width).map_err(|_| PackageError::Oversized(width, height))?;
    let pdf_height = i32::try_from(height).map_err(|_| PackageError::Oversized(width, height))?;

    let geometry = PageGeometry::for_raster(width, height);

    let catalog_id = Ref::new(1);
    let page_tree_id = Ref::new(2);
    let page_id = Ref::new(3);
    let image_id = Ref::new(4);
    let content_id = Ref::new(5);
    let info_id = Ref::new(6);

    let mut pdf = Pdf::new();
    pdf.catalog(catalog_id).pages(page_tree_id);
    pdf.pages(page_tree_id).kids([page_id]).count(1);

    let mut page = pdf.page(page_id);
    page.media_box(Rect::new(0.0, 0.0, geometry.page_width, geometry.page_height));
    page.parent(page_tree_id);
    page.contents(content_id);
    page.resources().x_objects().pair(IMAGE_NAME, image_id);
    page.finish();

    let compressed = compress_to_vec_zlib(raster.rgb(), DEFLATE_LEVEL);
    let mut image = pdf.image_xobject(image_id, &compressed);
    image.filter(Filter::FlateDecode);
    image.width(pdf_width);
    image.height(pdf_height);
    image.color_space().device_rgb();
    image.bits_per_component(8);
    image.finish();

    let mut content = Content::new();
    content.save_state();
    content.transform([
        geometry.image_width,
        0.0,
        0.0,
        geometry.image_height,
        geometry.image_x,
        geometry.image_y,
    ]);
    content.x_object(IMAGE_NAME);
    content.restore_state();
    let content_bytes = compress_to_vec_zlib(&content.finish(), DEFLATE_LEVEL);
    pdf.stream(content_id, &content_bytes)
        .filter(Filter::FlateDecode);

    pdf.document_info(info_id)
        .title(TextStr(title))
        .producer(TextStr(PRODUCER));

    let bytes = pdf.finish();
    tracing::debug!(
        raw_bytes = raster.rgb().len(),
        image_bytes = compressed.len(),
        pdf_bytes = bytes.len(),
        "Packaged card PDF"
    );

    Ok(bytes)
}
