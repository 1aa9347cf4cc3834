use std::path::Path;

use crate::compositor::PageImage;
use crate::error::Result;

#[cfg(feature = "pdfium")]
use {
    crate::error::FolioError,
    pdfium_render::prelude::*,
};

#[cfg(not(feature = "pdfium"))]
use crate::error::FolioError;

/// Rasterizes every page of the document at the requested DPI.
///
/// Page ordinals in the result are 1-based and follow document order.
#[cfg(feature = "pdfium")]
pub fn rasterize_pages(path: &Path, dpi: u32) -> Result<Vec<PageImage>> {
    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| FolioError::Pdf(format!("failed to bind pdfium: {e}")))?;
    let pdfium = Pdfium::new(bindings);
    let document = pdfium
        .load_pdf_from_file(&path, None)
        .map_err(|e| FolioError::Pdf(format!("failed to open {}: {e}", path.display())))?;
    let mut pages = Vec::new();
    for (index, page) in document.pages().iter().enumerate() {
        let width_points = page.width().value;
        let target_width = ((width_points / 72.0) * dpi as f32).round().max(1.0) as i32;
        let config = PdfRenderConfig::new().set_target_width(target_width);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| FolioError::Pdf(format!("failed to render page {}: {e}", index + 1)))?;
        pages.push(PageImage::new(index as u32 + 1, bitmap.as_image().to_rgb8()));
    }
    Ok(pages)
}

#[cfg(not(feature = "pdfium"))]
pub fn rasterize_pages(path: &Path, _dpi: u32) -> Result<Vec<PageImage>> {
    Err(FolioError::RenderSupportDisabled(path.to_path_buf()))
}

#[cfg(all(test, not(feature = "pdfium")))]
mod tests {
    use super::*;

    #[test]
    fn disabled_feature_reports_typed_error() {
        let err = rasterize_pages(Path::new("doc.pdf"), 300).unwrap_err();
        assert!(matches!(err, FolioError::RenderSupportDisabled(_)));
    }
}
