use crate::field::PositionedField;
use crate::types::{Pt, Rect, Size};

/// Maps a field's UI-space placement (% position, px dimensions) onto a page
/// of the given size, in points.
///
/// Output stays in top-left space with Y growing downward, exactly as the
/// layout UI measured it; the single flip to PDF's bottom-left convention
/// happens later, at content emission. Null dimensions map to zero and the
/// renderer falls back to an unsized text cell.
pub fn map_field(field: &PositionedField, page: Size) -> Rect {
    Rect {
        x: page.width * (field.x_percent / 100.0),
        y: page.height * (field.y_percent / 100.0),
        width: Pt::from_px(field.width_px.unwrap_or(0.0)),
        height: Pt::from_px(field.height_px.unwrap_or(0.0)),
    }
}
