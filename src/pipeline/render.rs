//! pdfium-backed page work: split a document into single-page PDFs, and
//! rasterise a single-page PDF for vision recognition.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async
//! contexts. `tokio::task::spawn_blocking` moves the work onto the blocking
//! pool so Tokio worker threads never stall on CPU-heavy PDF work.

use crate::error::PipelineError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info};

/// Split `document` into one standalone PDF per page, in page order.
///
/// All pages are produced in memory before returning, so a document that
/// fails halfway yields an error and no pages.
pub async fn split_pages(key: &str, document: Vec<u8>) -> Result<Vec<Vec<u8>>, PipelineError> {
    let key = key.to_string();
    tokio::task::spawn_blocking(move || split_pages_blocking(&key, document))
        .await
        .map_err(|e| PipelineError::Internal(format!("Split task panicked: {}", e)))?
}

fn split_pages_blocking(key: &str, document: Vec<u8>) -> Result<Vec<Vec<u8>>, PipelineError> {
    let input_error = |e: PdfiumError| PipelineError::InputFormat {
        key: key.to_string(),
        detail: format!("{:?}", e),
    };

    let pdfium = Pdfium::default();
    let source = pdfium
        .load_pdf_from_byte_vec(document, None)
        .map_err(input_error)?;

    let total = source.pages().len();
    info!("{}: {} pages", key, total);
    if total == 0 {
        return Err(PipelineError::InputFormat {
            key: key.to_string(),
            detail: "document has no pages".into(),
        });
    }

    let mut pages = Vec::with_capacity(total as usize);
    for idx in 0..total {
        let mut single = pdfium.create_new_pdf().map_err(input_error)?;
        single
            .pages_mut()
            .copy_page_from_document(&source, idx, 0)
            .map_err(input_error)?;
        let bytes = single.save_to_bytes().map_err(input_error)?;
        debug!("{}: page {} → {} bytes", key, idx + 1, bytes.len());
        pages.push(bytes);
    }

    Ok(pages)
}

/// Rasterise the first page of a single-page PDF.
pub async fn rasterise_page(
    key: &str,
    page_pdf: Vec<u8>,
    max_pixels: u32,
) -> Result<DynamicImage, PipelineError> {
    let key = key.to_string();
    tokio::task::spawn_blocking(move || rasterise_blocking(&key, page_pdf, max_pixels))
        .await
        .map_err(|e| PipelineError::Internal(format!("Render task panicked: {}", e)))?
}

fn rasterise_blocking(
    key: &str,
    page_pdf: Vec<u8>,
    max_pixels: u32,
) -> Result<DynamicImage, PipelineError> {
    let render_error = |e: PdfiumError| PipelineError::Recognition {
        key: key.to_string(),
        page: crate::keys::page_index(key).unwrap_or(0),
        detail: format!("rasterisation failed: {:?}", e),
    };

    let pdfium = Pdfium::default();
    let document = pdfium
        .load_pdf_from_byte_vec(page_pdf, None)
        .map_err(render_error)?;
    let page = document.pages().get(0).map_err(render_error)?;

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let bitmap = page.render_with_config(&render_config).map_err(render_error)?;
    let image = bitmap.as_image();
    debug!("Rendered {} → {}x{} px", key, image.width(), image.height());
    Ok(image)
}
