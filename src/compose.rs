use std::collections::{BTreeMap, BTreeSet};

use lopdf::{
    Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, Stream as LoStream,
    dictionary,
};

use crate::canvas::Canvas;
use crate::content::{BaseFont, ImageBank, emit_commands, install_fonts};
use crate::debug::DebugLogger;
use crate::error::{SealPressError, lopdf_err};
use crate::field::{FieldSkip, FieldValue, PositionedField};
use crate::inspect::{box_size, page_box};
use crate::render::{RenderOutcome, render_field};

/// A flattened document in memory, before storage.
#[derive(Debug, Clone)]
pub struct FlattenedDocument {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub fields_rendered: usize,
    pub fields_skipped: usize,
}

/// Two documents concatenated in memory, before storage.
#[derive(Debug, Clone)]
pub struct MergedDocument {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub first_page_count: usize,
    pub second_page_count: usize,
}

fn load_source(bytes: &[u8]) -> Result<LoDocument, SealPressError> {
    let doc = LoDocument::load_mem(bytes).map_err(lopdf_err)?;
    if doc.is_encrypted() {
        return Err(SealPressError::PdfParse(
            "encrypted source PDFs are not supported".to_string(),
        ));
    }
    Ok(doc)
}

/// Moves every object of `src` into `dst` under fresh ids and returns the
/// source's page map (1-indexed page number to imported object id).
fn import_document_objects(
    dst: &mut LoDocument,
    mut src: LoDocument,
) -> Result<BTreeMap<u32, LoObjectId>, SealPressError> {
    let start_id = dst.max_id + 1;
    src.renumber_objects_with(start_id);
    let pages = src.get_pages();
    if src.max_id > dst.max_id {
        dst.max_id = src.max_id;
    }
    dst.objects.extend(src.objects);
    Ok(pages)
}

fn page_resources_object(doc: &LoDocument, page: &lopdf::Dictionary) -> LoObject {
    match page.get(b"Resources") {
        Ok(obj) => match obj {
            LoObject::Reference(id) => doc
                .get_object(*id)
                .map(|o| o.clone())
                .unwrap_or_else(|_| LoObject::Dictionary(lopdf::Dictionary::new())),
            LoObject::Dictionary(d) => LoObject::Dictionary(d.clone()),
            _ => LoObject::Dictionary(lopdf::Dictionary::new()),
        },
        Err(_) => LoObject::Dictionary(lopdf::Dictionary::new()),
    }
}

fn page_rotation(doc: &LoDocument, page: &lopdf::Dictionary) -> Option<i64> {
    match page.get(b"Rotate") {
        Ok(LoObject::Integer(v)) => Some(*v),
        Ok(LoObject::Reference(id)) => doc
            .get_object(*id)
            .ok()
            .and_then(|o| o.as_i64().ok()),
        _ => None,
    }
}

fn finish_document(doc: &mut LoDocument) -> Result<Vec<u8>, SealPressError> {
    doc.prune_objects();
    doc.renumber_objects();
    doc.compress();
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

struct OverlayPage {
    page_no: u32,
    bbox: Vec<LoObject>,
    rotate: Option<i64>,
    emitted: crate::content::EmittedContent,
}

/// Re-emits every source page as a background Form XObject stamped onto a
/// fresh page of identical geometry, with the page's field overlays drawn
/// on top. Pages keep source order; fields addressing pages beyond the end
/// are dropped and counted as skips.
pub(crate) fn compose_flatten(
    source: &[u8],
    fields_by_page: &BTreeMap<u32, Vec<&PositionedField>>,
    debug: Option<&DebugLogger>,
) -> Result<FlattenedDocument, SealPressError> {
    let src = load_source(source)?;
    let src_pages = src.get_pages();
    let page_count = src_pages.len();
    if page_count == 0 {
        return Err(SealPressError::PdfParse("pdf has no pages".to_string()));
    }

    let mut bank = ImageBank::new();
    let mut all_fonts: BTreeSet<BaseFont> = BTreeSet::new();
    let mut overlays: Vec<OverlayPage> = Vec::with_capacity(page_count);
    let mut fields_rendered = 0usize;
    let mut fields_skipped = 0usize;

    for (page_no, page_id) in &src_pages {
        let dict = src
            .get_object(*page_id)
            .and_then(LoObject::as_dict)
            .map_err(lopdf_err)?;
        let bbox = page_box(dict);
        let size = box_size(&bbox);
        let rotate = page_rotation(&src, dict);

        let mut canvas = Canvas::new(size);
        if let Some(page_fields) = fields_by_page.get(page_no) {
            for field in page_fields {
                match render_field(&mut canvas, &mut bank, field, debug) {
                    RenderOutcome::Rendered => fields_rendered += 1,
                    RenderOutcome::Empty => {}
                    RenderOutcome::Skipped(_) => fields_skipped += 1,
                }
            }
        }
        let emitted = emit_commands(&canvas.into_commands(), size.height, debug);
        all_fonts.extend(emitted.fonts.iter().copied());
        overlays.push(OverlayPage {
            page_no: *page_no,
            bbox,
            rotate,
            emitted,
        });
    }

    // Fields addressing pages the source does not have are never visited by
    // the page loop; they drop out here, counted but non-fatal.
    for (page_no, page_fields) in fields_by_page {
        if *page_no >= 1 && *page_no <= page_count as u32 {
            continue;
        }
        for field in page_fields {
            if !matches!(field.resolved_value(), Ok(FieldValue::Empty)) {
                fields_skipped += 1;
                let skip = FieldSkip::PageOutOfRange(*page_no);
                if let Some(logger) = debug {
                    logger.log_json(&format!(
                        "{{\"type\":\"render.skip\",\"page\":{},\"reason\":\"{}\"}}",
                        page_no,
                        skip.counter_key(),
                    ));
                    logger.increment(skip.counter_key(), 1);
                }
            }
        }
    }

    let mut out = LoDocument::with_version("1.7");
    let imported_pages = import_document_objects(&mut out, src)?;
    let font_ids = install_fonts(&mut out, &all_fonts);
    let image_ids = bank.install_all(&mut out);

    let pages_id = out.new_object_id();
    let mut kids: Vec<LoObject> = Vec::with_capacity(page_count);

    for overlay in overlays {
        let template_id = imported_pages[&overlay.page_no];
        let template_dict = out
            .get_object(template_id)
            .and_then(LoObject::as_dict)
            .map_err(lopdf_err)?
            .clone();
        let template_content = out.get_page_content(template_id).map_err(lopdf_err)?;
        let template_resources = page_resources_object(&out, &template_dict);

        let form_id = out.add_object(LoStream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "FormType" => 1,
                "BBox" => LoObject::Array(overlay.bbox.clone()),
                "Resources" => template_resources,
            },
            template_content,
        ));
        let form_name = format!("TPL_{}", overlay.page_no);

        let mut page_ops = format!("q /{} Do Q\n", form_name);
        page_ops.push_str(&overlay.emitted.ops);
        let content_id = out.add_object(LoStream::new(dictionary! {}, page_ops.into_bytes()));

        let mut xobjects = lopdf::Dictionary::new();
        xobjects.set(form_name.as_bytes().to_vec(), LoObject::Reference(form_id));
        for name in &overlay.emitted.image_names {
            xobjects.set(name.as_bytes().to_vec(), LoObject::Reference(image_ids[name]));
        }
        let mut resources = lopdf::Dictionary::new();
        resources.set("XObject", LoObject::Dictionary(xobjects));
        if !overlay.emitted.fonts.is_empty() {
            let mut fonts = lopdf::Dictionary::new();
            for font in &overlay.emitted.fonts {
                fonts.set(
                    font.resource_name().as_bytes().to_vec(),
                    LoObject::Reference(font_ids[font]),
                );
            }
            resources.set("Font", LoObject::Dictionary(fonts));
        }

        let mut page_dict = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => LoObject::Dictionary(resources),
            "MediaBox" => LoObject::Array(overlay.bbox),
        };
        if let Some(rotate) = overlay.rotate {
            page_dict.set("Rotate", rotate);
        }
        kids.push(LoObject::Reference(out.add_object(page_dict)));
    }

    out.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
        }),
    );
    let catalog_id = out.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    out.trailer.set("Root", catalog_id);

    let bytes = finish_document(&mut out)?;
    Ok(FlattenedDocument {
        bytes,
        page_count,
        fields_rendered,
        fields_skipped,
    })
}

/// Concatenates two documents: all pages of the first, then all pages of the
/// second, each page object imported verbatim (geometry, rotation and
/// annotations intact) and re-parented under a fresh page tree.
pub(crate) fn merge_documents(
    first: &[u8],
    second: &[u8],
) -> Result<MergedDocument, SealPressError> {
    let doc_a = load_source(first)?;
    let doc_b = load_source(second)?;

    let mut out = LoDocument::with_version("1.7");
    let pages_a = import_document_objects(&mut out, doc_a)?;
    let pages_b = import_document_objects(&mut out, doc_b)?;
    let first_page_count = pages_a.len();
    let second_page_count = pages_b.len();

    let pages_id = out.new_object_id();
    let mut kids: Vec<LoObject> = Vec::with_capacity(first_page_count + second_page_count);
    for page_id in pages_a.values().chain(pages_b.values()) {
        let page = out
            .get_object_mut(*page_id)
            .and_then(LoObject::as_dict_mut)
            .map_err(lopdf_err)?;
        page.set("Parent", LoObject::Reference(pages_id));
        kids.push(LoObject::Reference(*page_id));
    }

    out.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => (first_page_count + second_page_count) as i64,
        }),
    );
    let catalog_id = out.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    out.trailer.set("Root", catalog_id);

    let bytes = finish_document(&mut out)?;
    Ok(MergedDocument {
        bytes,
        page_count: first_page_count + second_page_count,
        first_page_count,
        second_page_count,
    })
}

/// Serializes a synthesized overlay document (certificate pages) that has no
/// imported background. Shares the assembly conventions of the flatten path.
pub(crate) fn assemble_overlay_document(
    doc: &crate::canvas::OverlayDocument,
    bank: &ImageBank,
    debug: Option<&DebugLogger>,
) -> Result<(Vec<u8>, usize), SealPressError> {
    let mut out = LoDocument::with_version("1.7");
    let page_size = doc.page_size;
    let page_count = doc.pages.len();

    let mut emitted_pages = Vec::with_capacity(page_count);
    let mut all_fonts: BTreeSet<BaseFont> = BTreeSet::new();
    for page in &doc.pages {
        let emitted = emit_commands(&page.commands, page_size.height, debug);
        all_fonts.extend(emitted.fonts.iter().copied());
        emitted_pages.push(emitted);
    }

    let font_ids = install_fonts(&mut out, &all_fonts);
    let image_ids = bank.install_all(&mut out);

    let pages_id = out.new_object_id();
    let mut kids: Vec<LoObject> = Vec::with_capacity(page_count);
    for emitted in emitted_pages {
        let content_id = out.add_object(LoStream::new(
            dictionary! {},
            emitted.ops.into_bytes(),
        ));
        let mut resources = lopdf::Dictionary::new();
        if !emitted.fonts.is_empty() {
            let mut fonts = lopdf::Dictionary::new();
            for font in &emitted.fonts {
                fonts.set(
                    font.resource_name().as_bytes().to_vec(),
                    LoObject::Reference(font_ids[font]),
                );
            }
            resources.set("Font", LoObject::Dictionary(fonts));
        }
        if !emitted.image_names.is_empty() {
            let mut xobjects = lopdf::Dictionary::new();
            for name in &emitted.image_names {
                xobjects.set(name.as_bytes().to_vec(), LoObject::Reference(image_ids[name]));
            }
            resources.set("XObject", LoObject::Dictionary(xobjects));
        }
        let page_id = out.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => LoObject::Dictionary(resources),
            "MediaBox" => vec![
                0.into(),
                0.into(),
                LoObject::Real(page_size.width.to_f32()),
                LoObject::Real(page_size.height.to_f32()),
            ],
        });
        kids.push(LoObject::Reference(page_id));
    }

    out.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
        }),
    );
    let catalog_id = out.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    out.trailer.set("Root", catalog_id);

    let bytes = finish_document(&mut out)?;
    Ok((bytes, page_count))
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::flatten::group_fields_by_page;
    use base64::Engine;
    use std::io::Cursor;

    fn text_field(page: u32, x: f32, y: f32, value: &str) -> PositionedField {
        PositionedField {
            page_number: page,
            x_percent: x,
            y_percent: y,
            width_px: Some(40.0),
            height_px: Some(20.0),
            value: Some(value.to_string()),
        }
    }

    fn png_data_uri() -> String {
        let img = image::RgbaImage::from_pixel(4, 4, image::Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png");
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        )
    }

    #[test]
    fn flatten_preserves_page_count_and_dimensions() {
        let source = pages_pdf(&[
            ("ONE", 612.0, 792.0),
            ("TWO", 842.0, 595.0),
            ("THREE", 595.28, 841.89),
        ]);
        let fields: Vec<PositionedField> = Vec::new();
        let grouped = group_fields_by_page(&fields);
        let result = compose_flatten(&source, &grouped, None).expect("flatten");
        assert_eq!(result.page_count, 3);
        assert_eq!(result.fields_rendered, 0);
        assert_eq!(result.fields_skipped, 0);
        // Passthrough identity: per-page sizes survive, including the
        // landscape page in the middle.
        assert_eq!(page_dims(&result.bytes), page_dims(&source));
    }

    #[test]
    fn flatten_stamps_background_and_overlay() {
        let source = pages_pdf(&[("BASE", 595.28, 841.89)]);
        let fields = vec![text_field(1, 10.0, 10.0, "John Doe")];
        let grouped = group_fields_by_page(&fields);
        let result = compose_flatten(&source, &grouped, None).expect("flatten");
        assert_eq!(result.fields_rendered, 1);
        let content = page_content_text(&result.bytes, 1);
        assert!(content.contains("/TPL_1 Do"), "background stamp missing");
        assert!(content.contains("(John Doe) Tj"), "overlay text missing");
        // 10% of A4: x = 59.528. The cell is 15pt tall, type 14pt, so the
        // top shifts down 0.5pt and the baseline sits 14pt below that:
        // 841.89 - (84.189 + 0.5) - 14 = 743.201.
        assert!(content.contains("59.528 743.201 Td"), "content was: {content}");
    }

    #[test]
    fn flatten_drops_out_of_range_fields_without_error() {
        let source = single_page_pdf("ONLY");
        let fields = vec![
            text_field(1, 5.0, 5.0, "kept"),
            text_field(9, 5.0, 5.0, "dropped"),
        ];
        let grouped = group_fields_by_page(&fields);
        let result = compose_flatten(&source, &grouped, None).expect("flatten");
        assert_eq!(result.page_count, 1);
        assert_eq!(result.fields_rendered, 1);
        assert_eq!(result.fields_skipped, 1);
        let content = page_content_text(&result.bytes, 1);
        assert!(content.contains("(kept) Tj"));
        assert!(!content.contains("dropped"));
    }

    #[test]
    fn malformed_image_isolation_keeps_other_fields() {
        let source = pages_pdf(&[("P1", 612.0, 792.0), ("P2", 612.0, 792.0)]);
        let mut bad = text_field(1, 5.0, 5.0, "");
        bad.value = Some("data:image/png;base64,!!!not-valid-base64!!!".to_string());
        let fields = vec![
            bad,
            text_field(1, 20.0, 20.0, "still here"),
            text_field(2, 30.0, 30.0, "page two"),
        ];
        let grouped = group_fields_by_page(&fields);
        let result = compose_flatten(&source, &grouped, None).expect("flatten");
        assert_eq!(result.fields_rendered, 2);
        assert_eq!(result.fields_skipped, 1);
        assert!(page_content_text(&result.bytes, 1).contains("(still here) Tj"));
        assert!(page_content_text(&result.bytes, 2).contains("(page two) Tj"));
    }

    #[test]
    fn image_fields_embed_an_xobject_sized_from_pixels() {
        let source = pages_pdf(&[("BASE", 595.28, 841.89)]);
        let mut field = text_field(1, 50.0, 50.0, "");
        field.value = Some(png_data_uri());
        field.width_px = Some(96.0);
        field.height_px = Some(96.0);
        let fields = vec![field];
        let grouped = group_fields_by_page(&fields);
        let result = compose_flatten(&source, &grouped, None).expect("flatten");
        assert_eq!(result.fields_rendered, 1);
        let content = page_content_text(&result.bytes, 1);
        // 96px box = 72pt, anchored at (50%, 50%) of A4 and flipped:
        // 841.89 - 420.945 - 72 = 348.945.
        assert!(content.contains("72 0 0 72 297.64 348.945 cm"), "content was: {content}");
        assert!(content.contains("/Sig1 Do"));
    }

    #[test]
    fn flatten_is_deterministic() {
        let source = pages_pdf(&[("BASE", 612.0, 792.0)]);
        let fields = vec![text_field(1, 10.0, 10.0, "Jane")];
        let grouped = group_fields_by_page(&fields);
        let a = compose_flatten(&source, &grouped, None).expect("first run");
        let b = compose_flatten(&source, &grouped, None).expect("second run");
        assert_eq!(a.bytes, b.bytes, "identical inputs must produce identical bytes");
    }

    #[test]
    fn flatten_rejects_garbage_sources() {
        let grouped = BTreeMap::new();
        let err = compose_flatten(b"this is not a pdf", &grouped, None).expect_err("must fail");
        assert!(matches!(err, SealPressError::PdfParse(_)));
    }

    #[test]
    fn merge_appends_second_document_after_first() {
        let first = pages_pdf(&[("A1", 612.0, 792.0), ("A2", 842.0, 595.0)]);
        let second = pages_pdf(&[("B1", 595.28, 841.89)]);
        let merged = merge_documents(&first, &second).expect("merge");
        assert_eq!(merged.page_count, 3);
        assert_eq!(merged.first_page_count, 2);
        assert_eq!(merged.second_page_count, 1);
        let dims = page_dims(&merged.bytes);
        assert_eq!(dims[0], (612_000, 792_000));
        assert_eq!(dims[1], (842_000, 595_000));
        assert_eq!(dims[2], (595_280, 841_890));
        assert!(page_content_text(&merged.bytes, 1).contains("(A1) Tj"));
        assert!(page_content_text(&merged.bytes, 3).contains("(B1) Tj"));
    }

    #[test]
    fn merge_rejects_malformed_inputs() {
        let good = single_page_pdf("OK");
        assert!(matches!(
            merge_documents(&good, b"junk"),
            Err(SealPressError::PdfParse(_))
        ));
        assert!(matches!(
            merge_documents(b"junk", &good),
            Err(SealPressError::PdfParse(_))
        ));
    }
}
