use crate::canvas::Canvas;
use crate::content::{FONT_HELVETICA_OBLIQUE, ImageBank, decode_signature_image};
use crate::coords::map_field;
use crate::debug::{DebugLogger, json_escape};
use crate::field::{FieldSkip, FieldValue, PositionedField};
use crate::types::{Color, Pt, Rect};

/// Styling for rendered text signatures, matching the upstream look: italic
/// Helvetica at 14pt in dark blue.
pub(crate) const SIGNATURE_FONT_SIZE: f32 = 14.0;
pub(crate) const SIGNATURE_COLOR: (u8, u8, u8) = (0, 0, 139);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RenderOutcome {
    Rendered,
    /// Null/empty value; the field simply does not exist for rendering.
    Empty,
    Skipped(FieldSkip),
}

/// Draws one field at its mapped position onto the canvas. Never fails the
/// document: undecodable or unsupported values come back as `Skipped`.
pub(crate) fn render_field(
    canvas: &mut Canvas,
    bank: &mut ImageBank,
    field: &PositionedField,
    debug: Option<&DebugLogger>,
) -> RenderOutcome {
    let value = match field.resolved_value() {
        Ok(FieldValue::Empty) => return RenderOutcome::Empty,
        Ok(value) => value,
        Err(skip) => {
            log_skip(debug, field, &skip);
            return RenderOutcome::Skipped(skip);
        }
    };

    let rect = map_field(field, canvas.page_size());
    if let Some(logger) = debug {
        logger.log_json(&format!(
            "{{\"type\":\"render.field\",\"page\":{},\"x_pt\":{},\"y_pt\":{},\"w_pt\":{},\"h_pt\":{}}}",
            field.page_number,
            crate::content::fmt_pt(rect.x),
            crate::content::fmt_pt(rect.y),
            crate::content::fmt_pt(rect.width),
            crate::content::fmt_pt(rect.height),
        ));
    }

    match value {
        FieldValue::Text(text) => {
            draw_text_cell(canvas, rect, &text);
            RenderOutcome::Rendered
        }
        FieldValue::Image { format, bytes } => {
            let Some(image) = decode_signature_image(format, &bytes) else {
                let skip = FieldSkip::MalformedFieldValue;
                log_skip(debug, field, &skip);
                return RenderOutcome::Skipped(skip);
            };
            let (width, height) = image_box(rect, image.width, image.height);
            let resource_id = bank.register(image);
            canvas.draw_image(rect.x, rect.y, width, height, resource_id);
            RenderOutcome::Rendered
        }
        FieldValue::Empty => RenderOutcome::Empty,
    }
}

fn draw_text_cell(canvas: &mut Canvas, rect: Rect, text: &str) {
    let font_size = Pt::from_f32(SIGNATURE_FONT_SIZE);
    canvas.set_font_name(FONT_HELVETICA_OBLIQUE);
    canvas.set_font_size(font_size);
    let (r, g, b) = SIGNATURE_COLOR;
    canvas.set_fill_color(Color::rgb8(r, g, b));
    // Left-aligned, vertically centered within the cell when the cell is
    // taller than the type; an unsized cell anchors at its top edge.
    let top = if rect.height > font_size {
        rect.y + (rect.height - font_size) / 2.0
    } else {
        rect.y
    };
    canvas.draw_string(rect.x, top, text);
}

/// Stretch-to-fit box for an image. Zero-size cells fall back to the
/// intrinsic pixel size at the 96 DPI reference; a single zero dimension
/// scales proportionally from the other.
fn image_box(rect: Rect, px_width: u32, px_height: u32) -> (Pt, Pt) {
    let has_w = rect.width > Pt::ZERO;
    let has_h = rect.height > Pt::ZERO;
    match (has_w, has_h) {
        (true, true) => (rect.width, rect.height),
        (true, false) => {
            let scale = px_height as f32 / px_width.max(1) as f32;
            (rect.width, rect.width * scale)
        }
        (false, true) => {
            let scale = px_width as f32 / px_height.max(1) as f32;
            (rect.height * scale, rect.height)
        }
        (false, false) => (
            Pt::from_px(px_width as f32),
            Pt::from_px(px_height as f32),
        ),
    }
}

fn log_skip(debug: Option<&DebugLogger>, field: &PositionedField, skip: &FieldSkip) {
    if let Some(logger) = debug {
        logger.log_json(&format!(
            "{{\"type\":\"render.skip\",\"page\":{},\"reason\":\"{}\"}}",
            field.page_number,
            json_escape(skip.counter_key()),
        ));
        logger.increment(skip.counter_key(), 1);
    }
}
