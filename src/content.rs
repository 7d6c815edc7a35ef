use std::collections::{BTreeMap, BTreeSet};

use lopdf::{Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, Stream as LoStream, dictionary};

use crate::canvas::Command;
use crate::debug::DebugLogger;
use crate::field::SignatureImageFormat;
use crate::types::Pt;

/// The base-14 faces overlays and certificates draw with. No font programs
/// are embedded; viewers supply these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum BaseFont {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
}

pub(crate) const FONT_HELVETICA: &str = "Helvetica";
pub(crate) const FONT_HELVETICA_BOLD: &str = "Helvetica-Bold";
pub(crate) const FONT_HELVETICA_OBLIQUE: &str = "Helvetica-Oblique";

impl BaseFont {
    pub fn from_name(name: &str) -> BaseFont {
        match name {
            FONT_HELVETICA_BOLD => BaseFont::HelveticaBold,
            FONT_HELVETICA_OBLIQUE => BaseFont::HelveticaOblique,
            _ => BaseFont::Helvetica,
        }
    }

    pub fn resource_name(&self) -> &'static str {
        match self {
            BaseFont::Helvetica => "F1",
            BaseFont::HelveticaBold => "F2",
            BaseFont::HelveticaOblique => "F3",
        }
    }

    pub fn postscript_name(&self) -> &'static str {
        match self {
            BaseFont::Helvetica => "Helvetica",
            BaseFont::HelveticaBold => "Helvetica-Bold",
            BaseFont::HelveticaOblique => "Helvetica-Oblique",
        }
    }
}

pub(crate) fn install_fonts(
    doc: &mut LoDocument,
    used: &BTreeSet<BaseFont>,
) -> BTreeMap<BaseFont, LoObjectId> {
    let mut out = BTreeMap::new();
    for font in used {
        let id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => font.postscript_name(),
            "Encoding" => "WinAnsiEncoding",
        });
        out.insert(*font, id);
    }
    out
}

/// A raster signature ready for embedding: either the original JPEG stream
/// passed through with DCTDecode, or raw 8-bit samples (PNG/GIF decode)
/// left unfiltered so document-level compression picks them up.
#[derive(Debug, Clone)]
pub(crate) struct EmbeddedImage {
    pub width: u32,
    pub height: u32,
    pub color_space: &'static str,
    pub dct: bool,
    pub data: Vec<u8>,
    pub alpha: Option<Vec<u8>>,
}

pub(crate) fn decode_signature_image(
    format: SignatureImageFormat,
    bytes: &[u8],
) -> Option<EmbeddedImage> {
    let image_format = match format {
        SignatureImageFormat::Png => image::ImageFormat::Png,
        SignatureImageFormat::Jpeg => image::ImageFormat::Jpeg,
        SignatureImageFormat::Gif => image::ImageFormat::Gif,
    };
    use image::GenericImageView;
    let decoded = image::load_from_memory_with_format(bytes, image_format).ok()?;
    let (width, height) = decoded.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    if format == SignatureImageFormat::Jpeg {
        // JPEG streams embed directly under DCTDecode; only the color space
        // needs to be known up front.
        let color_space = match decoded.color() {
            image::ColorType::L8 | image::ColorType::L16 => "DeviceGray",
            _ => "DeviceRGB",
        };
        return Some(EmbeddedImage {
            width,
            height,
            color_space,
            dct: true,
            data: bytes.to_vec(),
            alpha: None,
        });
    }

    if decoded.color().has_alpha() {
        let rgba = decoded.to_rgba8();
        let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
        let mut alpha = Vec::with_capacity(width as usize * height as usize);
        let mut translucent = false;
        for pixel in rgba.pixels() {
            rgb.extend_from_slice(&pixel.0[..3]);
            alpha.push(pixel.0[3]);
            if pixel.0[3] != u8::MAX {
                translucent = true;
            }
        }
        return Some(EmbeddedImage {
            width,
            height,
            color_space: "DeviceRGB",
            dct: false,
            data: rgb,
            alpha: translucent.then_some(alpha),
        });
    }

    Some(EmbeddedImage {
        width,
        height,
        color_space: "DeviceRGB",
        dct: false,
        data: decoded.to_rgb8().into_raw(),
        alpha: None,
    })
}

pub(crate) fn install_image(doc: &mut LoDocument, image: &EmbeddedImage) -> LoObjectId {
    let smask_id = image.alpha.as_ref().map(|samples| {
        doc.add_object(LoStream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.width as i64,
                "Height" => image.height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            samples.clone(),
        ))
    });

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => image.width as i64,
        "Height" => image.height as i64,
        "ColorSpace" => image.color_space,
        "BitsPerComponent" => 8,
    };
    if image.dct {
        dict.set("Filter", LoObject::Name(b"DCTDecode".to_vec()));
    }
    if let Some(id) = smask_id {
        dict.set("SMask", LoObject::Reference(id));
    }
    doc.add_object(LoStream::new(dict, image.data.clone()))
}

/// Registry of signature images referenced from canvas commands by resource
/// name. Installed into the output document once, after rendering.
#[derive(Default)]
pub(crate) struct ImageBank {
    entries: Vec<(String, EmbeddedImage)>,
}

impl ImageBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, image: EmbeddedImage) -> String {
        let name = format!("Sig{}", self.entries.len() + 1);
        self.entries.push((name.clone(), image));
        name
    }

    pub fn install_all(&self, doc: &mut LoDocument) -> BTreeMap<String, LoObjectId> {
        let mut out = BTreeMap::new();
        for (name, image) in &self.entries {
            out.insert(name.clone(), install_image(doc, image));
        }
        out
    }
}

#[derive(Debug, Default)]
pub(crate) struct EmittedContent {
    pub ops: String,
    pub fonts: BTreeSet<BaseFont>,
    pub image_names: Vec<String>,
}

/// Serializes recorded commands to content-stream operators.
///
/// This is the only place overlay coordinates are flipped into PDF's native
/// bottom-left space: boxes land at `page_height - y - height`, text
/// baselines at `page_height - y - font_size`.
pub(crate) fn emit_commands(
    commands: &[Command],
    page_height: Pt,
    debug: Option<&DebugLogger>,
) -> EmittedContent {
    let mut out = EmittedContent::default();
    let mut font = BaseFont::Helvetica;
    let mut font_size = Pt::from_f32(12.0);

    for command in commands {
        match command {
            Command::SetFillColor(color) => {
                out.ops.push_str(&format!(
                    "{} {} {} rg\n",
                    fmt_unit(color.r),
                    fmt_unit(color.g),
                    fmt_unit(color.b)
                ));
            }
            Command::SetLineWidth(width) => {
                out.ops.push_str(&format!("{} w\n", fmt_pt(*width)));
            }
            Command::SetFontName(name) => {
                font = BaseFont::from_name(name);
            }
            Command::SetFontSize(size) => {
                font_size = *size;
            }
            Command::DrawString { x, y, text } => {
                out.fonts.insert(font);
                let baseline = page_height - *y - font_size;
                let encoded = encode_winansi_pdf_string(text);
                if encoded.replaced > 0 {
                    if let Some(logger) = debug {
                        logger.increment("content.winansi.lossy", encoded.replaced as u64);
                    }
                }
                out.ops.push_str("BT\n");
                out.ops
                    .push_str(&format!("/{} {} Tf\n", font.resource_name(), fmt_pt(font_size)));
                out.ops
                    .push_str(&format!("{} {} Td\n", fmt_pt(*x), fmt_pt(baseline)));
                out.ops.push_str(&format!("({}) Tj\n", encoded.text));
                out.ops.push_str("ET\n");
            }
            Command::StrokeRect {
                x,
                y,
                width,
                height,
            } => {
                let draw_y = page_height - *y - *height;
                out.ops.push_str(&format!(
                    "{} {} {} {} re\nS\n",
                    fmt_pt(*x),
                    fmt_pt(draw_y),
                    fmt_pt(*width),
                    fmt_pt(*height)
                ));
            }
            Command::Line { x1, y1, x2, y2 } => {
                out.ops.push_str(&format!(
                    "{} {} m\n{} {} l\nS\n",
                    fmt_pt(*x1),
                    fmt_pt(page_height - *y1),
                    fmt_pt(*x2),
                    fmt_pt(page_height - *y2)
                ));
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                let draw_y = page_height - *y - *height;
                out.ops.push_str("q\n");
                out.ops.push_str(&format!(
                    "{} 0 0 {} {} {} cm\n",
                    fmt_pt(*width),
                    fmt_pt(*height),
                    fmt_pt(*x),
                    fmt_pt(draw_y)
                ));
                out.ops.push_str(&format!("/{} Do\n", resource_id));
                out.ops.push_str("Q\n");
                out.image_names.push(resource_id.clone());
            }
        }
    }
    out
}

pub(crate) struct EncodedString {
    pub text: String,
    pub replaced: u32,
}

/// Encodes text as a WinAnsi PDF string literal: specials escaped, bytes
/// above 0x7E written as octal escapes, unmappable characters replaced.
pub(crate) fn encode_winansi_pdf_string(input: &str) -> EncodedString {
    let mut text = String::with_capacity(input.len() + 8);
    let mut replaced = 0u32;
    for ch in input.chars() {
        let byte = match winansi_byte(ch) {
            Some(byte) => byte,
            None => {
                replaced += 1;
                b'?'
            }
        };
        match byte {
            b'\\' => text.push_str("\\\\"),
            b'(' => text.push_str("\\("),
            b')' => text.push_str("\\)"),
            0x20..=0x7E => text.push(byte as char),
            _ => text.push_str(&format!("\\{:03o}", byte)),
        }
    }
    EncodedString { text, replaced }
}

fn winansi_byte(ch: char) -> Option<u8> {
    let code = ch as u32;
    match code {
        0x20..=0x7E => Some(code as u8),
        0xA0..=0xFF => Some(code as u8),
        _ => match ch {
            '\u{20AC}' => Some(0x80),
            '\u{201A}' => Some(0x82),
            '\u{0192}' => Some(0x83),
            '\u{201E}' => Some(0x84),
            '\u{2026}' => Some(0x85),
            '\u{2020}' => Some(0x86),
            '\u{2021}' => Some(0x87),
            '\u{02C6}' => Some(0x88),
            '\u{2030}' => Some(0x89),
            '\u{0160}' => Some(0x8A),
            '\u{2039}' => Some(0x8B),
            '\u{0152}' => Some(0x8C),
            '\u{017D}' => Some(0x8E),
            '\u{2018}' => Some(0x91),
            '\u{2019}' => Some(0x92),
            '\u{201C}' => Some(0x93),
            '\u{201D}' => Some(0x94),
            '\u{2022}' => Some(0x95),
            '\u{2013}' => Some(0x96),
            '\u{2014}' => Some(0x97),
            '\u{02DC}' => Some(0x98),
            '\u{2122}' => Some(0x99),
            '\u{0161}' => Some(0x9A),
            '\u{203A}' => Some(0x9B),
            '\u{0153}' => Some(0x9C),
            '\u{017E}' => Some(0x9E),
            '\u{0178}' => Some(0x9F),
            _ => None,
        },
    }
}

pub(crate) fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        format!("{}{}", sign, int_part)
    } else {
        let mut s = format!("{}{}.{:03}", sign, int_part, frac_part);
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
        s
    }
}

fn fmt_unit(value: f32) -> String {
    let clamped = if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    };
    format_milli((clamped * 1000.0).round() as i64)
}
