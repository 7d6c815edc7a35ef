use lopdf::{Document as LoDocument, Object as LoObject};

use crate::error::{SealPressError, lopdf_err};
use crate::types::{Pt, Size};

/// Structural report over a source PDF, used as the fatal-error gate before
/// composition and by tests asserting page-dimension preservation.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfReport {
    pub pdf_version: String,
    pub page_count: usize,
    pub encrypted: bool,
    pub file_size_bytes: usize,
    pub page_sizes: Vec<Size>,
}

pub fn inspect_pdf_bytes(bytes: &[u8]) -> Result<PdfReport, SealPressError> {
    let pdf = LoDocument::load_mem(bytes).map_err(lopdf_err)?;
    let pages = pdf.get_pages();
    let mut page_sizes = Vec::with_capacity(pages.len());
    for page_id in pages.values() {
        let dict = pdf
            .get_object(*page_id)
            .and_then(LoObject::as_dict)
            .map_err(lopdf_err)?;
        page_sizes.push(box_size(&page_box(dict)));
    }
    Ok(PdfReport {
        pdf_version: pdf.version.clone(),
        page_count: pages.len(),
        encrypted: pdf.is_encrypted(),
        file_size_bytes: bytes.len(),
        page_sizes,
    })
}

/// Rejects sources composition cannot handle: encrypted documents and
/// documents with no pages. Parse failures are already fatal in
/// `inspect_pdf_bytes`.
pub fn require_composable(report: &PdfReport) -> Result<(), SealPressError> {
    if report.encrypted {
        return Err(SealPressError::PdfParse(
            "encrypted source PDFs are not supported".to_string(),
        ));
    }
    if report.page_count == 0 {
        return Err(SealPressError::PdfParse("pdf has no pages".to_string()));
    }
    Ok(())
}

/// CropBox when present, else MediaBox, else US Letter. Same preference
/// order the composition path uses, so reports match what gets stamped.
pub(crate) fn page_box(page: &lopdf::Dictionary) -> Vec<LoObject> {
    if let Ok(arr) = page.get(b"CropBox").and_then(LoObject::as_array) {
        return arr.clone();
    }
    if let Ok(arr) = page.get(b"MediaBox").and_then(LoObject::as_array) {
        return arr.clone();
    }
    vec![0.into(), 0.into(), 612.into(), 792.into()]
}

pub(crate) fn box_size(bbox: &[LoObject]) -> Size {
    let coord = |idx: usize| -> f32 {
        match bbox.get(idx) {
            Some(LoObject::Integer(v)) => *v as f32,
            Some(LoObject::Real(v)) => *v,
            _ => 0.0,
        }
    };
    let (x0, y0, x1, y1) = (coord(0), coord(1), coord(2), coord(3));
    Size {
        width: Pt::from_f32((x1 - x0).abs()),
        height: Pt::from_f32((y1 - y0).abs()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::test_support::single_page_pdf;

    #[test]
    fn inspect_reads_page_count_and_dimensions() {
        let bytes = single_page_pdf("HELLO");
        let report = inspect_pdf_bytes(&bytes).expect("inspect");
        assert_eq!(report.page_count, 1);
        assert!(!report.encrypted);
        assert_eq!(report.file_size_bytes, bytes.len());
        assert_eq!(report.page_sizes[0].width.to_milli_i64(), 612_000);
        assert_eq!(report.page_sizes[0].height.to_milli_i64(), 792_000);
        require_composable(&report).expect("composable");
    }

    #[test]
    fn inspect_rejects_malformed_bytes() {
        let err = inspect_pdf_bytes(b"not a pdf").expect_err("invalid");
        assert!(matches!(err, SealPressError::PdfParse(_)));
    }

    #[test]
    fn composability_rejects_empty_and_encrypted() {
        let report = PdfReport {
            pdf_version: "1.7".to_string(),
            page_count: 0,
            encrypted: false,
            file_size_bytes: 0,
            page_sizes: Vec::new(),
        };
        let err = require_composable(&report).expect_err("no pages");
        assert!(err.to_string().contains("no pages"));

        let report = PdfReport {
            page_count: 1,
            encrypted: true,
            ..report
        };
        let err = require_composable(&report).expect_err("encrypted");
        assert!(err.to_string().contains("encrypted"));
    }

    #[test]
    fn box_size_handles_offset_and_real_coordinates() {
        let bbox: Vec<LoObject> = vec![
            10.into(),
            20.into(),
            LoObject::Real(595.28),
            LoObject::Real(841.89),
        ];
        let size = box_size(&bbox);
        assert_eq!(size.width.to_milli_i64(), 585_280);
        assert_eq!(size.height.to_milli_i64(), 821_890);
    }
}
