use base64::Engine;

/// One stamp target on the original document. Positions are percentages of
/// the page box, origin top-left with Y growing downward (the on-screen
/// layout convention); dimensions are CSS pixels at the 96 DPI reference.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedField {
    /// 1-indexed page this field appears on.
    pub page_number: u32,
    pub x_percent: f32,
    pub y_percent: f32,
    pub width_px: Option<f32>,
    pub height_px: Option<f32>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureImageFormat {
    Png,
    Jpeg,
    Gif,
}

impl SignatureImageFormat {
    fn from_subtype(subtype: &str) -> Option<Self> {
        match subtype.to_ascii_lowercase().as_str() {
            "png" => Some(SignatureImageFormat::Png),
            "jpg" | "jpeg" => Some(SignatureImageFormat::Jpeg),
            "gif" => Some(SignatureImageFormat::Gif),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureImageFormat::Png => "png",
            SignatureImageFormat::Jpeg => "jpeg",
            SignatureImageFormat::Gif => "gif",
        }
    }
}

/// A field's value resolved once at ingestion. Render code dispatches on
/// this instead of re-sniffing the raw string per draw call.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Empty,
    Text(String),
    Image {
        format: SignatureImageFormat,
        bytes: Vec<u8>,
    },
}

/// Per-field skip reasons. These are recoverable by policy: the field is
/// dropped, counted, and composition continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSkip {
    UnsupportedImageFormat(String),
    MalformedFieldValue,
    PageOutOfRange(u32),
}

impl FieldSkip {
    pub fn counter_key(&self) -> &'static str {
        match self {
            FieldSkip::UnsupportedImageFormat(_) => "field.skip.unsupported_format",
            FieldSkip::MalformedFieldValue => "field.skip.malformed_value",
            FieldSkip::PageOutOfRange(_) => "field.skip.page_out_of_range",
        }
    }
}

const DATA_IMAGE_PREFIX: &str = "data:image/";
const BASE64_MARKER: &str = ";base64,";

/// Classifies a raw field value. A `data:image/<fmt>;base64,<payload>` URI
/// with a known raster format decodes to `Image`; a declared-but-unknown
/// format or an undecodable payload is a skip; anything else is plain text.
pub fn classify_value(raw: Option<&str>) -> Result<FieldValue, FieldSkip> {
    let Some(raw) = raw else {
        return Ok(FieldValue::Empty);
    };
    if raw.is_empty() {
        return Ok(FieldValue::Empty);
    }
    if !raw.starts_with(DATA_IMAGE_PREFIX) {
        return Ok(FieldValue::Text(raw.to_string()));
    }
    let Some(marker_at) = raw.find(BASE64_MARKER) else {
        // Not the recognized image pattern; falls back to text like any
        // other unknown scheme.
        return Ok(FieldValue::Text(raw.to_string()));
    };
    let subtype = &raw[DATA_IMAGE_PREFIX.len()..marker_at];
    let Some(format) = SignatureImageFormat::from_subtype(subtype) else {
        return Err(FieldSkip::UnsupportedImageFormat(subtype.to_string()));
    };
    let payload = &raw[marker_at + BASE64_MARKER.len()..];
    match base64::engine::general_purpose::STANDARD.decode(payload) {
        Ok(bytes) if !bytes.is_empty() => Ok(FieldValue::Image { format, bytes }),
        _ => Err(FieldSkip::MalformedFieldValue),
    }
}

impl PositionedField {
    pub fn resolved_value(&self) -> Result<FieldValue, FieldSkip> {
        classify_value(self.value.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn field_with(value: Option<&str>) -> PositionedField {
        PositionedField {
            page_number: 1,
            x_percent: 10.0,
            y_percent: 10.0,
            width_px: Some(40.0),
            height_px: Some(20.0),
            value: value.map(|v| v.to_string()),
        }
    }

    #[test]
    fn null_and_empty_values_are_empty() {
        assert_eq!(field_with(None).resolved_value(), Ok(FieldValue::Empty));
        assert_eq!(field_with(Some("")).resolved_value(), Ok(FieldValue::Empty));
    }

    #[test]
    fn plain_strings_classify_as_text() {
        assert_eq!(
            field_with(Some("John Doe")).resolved_value(),
            Ok(FieldValue::Text("John Doe".to_string()))
        );
        // Unknown schemes stay text, including almost-image URIs without
        // the base64 marker.
        assert_eq!(
            field_with(Some("data:image/png")).resolved_value(),
            Ok(FieldValue::Text("data:image/png".to_string()))
        );
        assert_eq!(
            field_with(Some("data:text/plain;base64,aGk=")).resolved_value(),
            Ok(FieldValue::Text("data:text/plain;base64,aGk=".to_string()))
        );
    }

    #[test]
    fn image_uris_decode_with_format() {
        let payload = base64::engine::general_purpose::STANDARD.encode(b"fake-bytes");
        for (subtype, format) in [
            ("png", SignatureImageFormat::Png),
            ("jpg", SignatureImageFormat::Jpeg),
            ("jpeg", SignatureImageFormat::Jpeg),
            ("gif", SignatureImageFormat::Gif),
            ("PNG", SignatureImageFormat::Png),
        ] {
            let uri = format!("data:image/{};base64,{}", subtype, payload);
            match field_with(Some(&uri)).resolved_value() {
                Ok(FieldValue::Image { format: got, bytes }) => {
                    assert_eq!(got, format);
                    assert_eq!(bytes, b"fake-bytes");
                }
                other => panic!("expected image for {subtype}, got {other:?}"),
            }
        }
    }

    #[test]
    fn unsupported_declared_formats_are_skipped() {
        let err = field_with(Some("data:image/webp;base64,aGk="))
            .resolved_value()
            .expect_err("webp is not accepted");
        assert_eq!(err, FieldSkip::UnsupportedImageFormat("webp".to_string()));
        assert_eq!(err.counter_key(), "field.skip.unsupported_format");
    }

    #[test]
    fn malformed_base64_is_skipped_not_fatal() {
        let err = field_with(Some("data:image/png;base64,!!!not-valid-base64!!!"))
            .resolved_value()
            .expect_err("invalid payload");
        assert_eq!(err, FieldSkip::MalformedFieldValue);
    }

    #[test]
    fn empty_payload_is_malformed() {
        let err = field_with(Some("data:image/png;base64,"))
            .resolved_value()
            .expect_err("empty payload");
        assert_eq!(err, FieldSkip::MalformedFieldValue);
    }
}
