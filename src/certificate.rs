use sealpress_audit::{AuditEntry, SignerRecord, certificate_fingerprint};

use crate::SealPress;
use crate::canvas::Canvas;
use crate::compose::assemble_overlay_document;
use crate::content::{
    FONT_HELVETICA, FONT_HELVETICA_BOLD, FONT_HELVETICA_OBLIQUE, ImageBank,
};
use crate::debug::{DebugLogger, json_escape};
use crate::error::SealPressError;
use crate::types::{Pt, Size};

/// Inputs for a certificate of completion. `content_hash` is the hash of the
/// flattened document, computed by the caller before this step.
#[derive(Debug, Clone)]
pub struct CertificateRequest {
    pub document_name: String,
    pub document_ref: String,
    pub content_hash: String,
    pub reference_id: String,
    pub signers: Vec<SignerRecord>,
    pub audit_log: Vec<AuditEntry>,
    pub output_path: String,
}

/// A synthesized certificate in memory, before storage.
#[derive(Debug, Clone)]
pub struct CertificateDocument {
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

const MARGIN_MM: f32 = 10.0;
const BOTTOM_MARGIN_MM: f32 = 20.0;
const ROW_HEIGHT_MM: f32 = 8.0;
const FOOTER_OFFSET_MM: f32 = 30.0;
const ACTOR_CHAR_BUDGET: usize = 30;

const SIGNER_COLUMNS_MM: [f32; 4] = [60.0, 60.0, 30.0, 40.0];
const AUDIT_COLUMNS_MM: [f32; 4] = [40.0, 40.0, 60.0, 50.0];

/// Full-width marker for `cell`, spanning to the right margin.
const FULL_WIDTH: f32 = 0.0;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Center,
}

/// Cursor-based cell writer over the canvas: cells advance a cursor left to
/// right, line breaks return to the left margin, and a row that would cross
/// the bottom margin opens a continuation page.
struct CellWriter {
    canvas: Canvas,
    x: Pt,
    y: Pt,
    margin: Pt,
    break_at: Pt,
    font_name: String,
    font_size: f32,
}

impl CellWriter {
    fn new(page: Size) -> Self {
        let margin = Pt::from_mm(MARGIN_MM);
        Self {
            canvas: Canvas::new(page),
            x: margin,
            y: margin,
            margin,
            break_at: page.height - Pt::from_mm(BOTTOM_MARGIN_MM),
            font_name: FONT_HELVETICA.to_string(),
            font_size: 12.0,
        }
    }

    fn set_font(&mut self, name: &str, size_pt: f32) {
        self.font_name = name.to_string();
        self.font_size = size_pt;
        self.canvas.set_font_name(name);
        self.canvas.set_font_size(Pt::from_f32(size_pt));
    }

    fn ensure_room(&mut self, height: Pt) {
        if self.y + height > self.break_at {
            // show_page resets the canvas graphics state; the active font
            // carries over to the continuation page.
            self.canvas.show_page();
            self.x = self.margin;
            self.y = self.margin;
            self.canvas.set_font_name(&self.font_name);
            self.canvas.set_font_size(Pt::from_f32(self.font_size));
        }
    }

    fn cell(&mut self, width_mm: f32, height_mm: f32, text: &str, border: bool, align: Align) {
        let height = Pt::from_mm(height_mm);
        let width = if width_mm == FULL_WIDTH {
            self.canvas.page_size().width - self.margin - self.x
        } else {
            Pt::from_mm(width_mm)
        };
        if border {
            self.canvas.stroke_rect(self.x, self.y, width, height);
        }
        if !text.is_empty() {
            let font_size = self.canvas.font_size();
            let top = self.y + ((height - font_size) / 2.0).max(Pt::ZERO);
            let text_x = match align {
                Align::Left => self.x + Pt::from_mm(1.0),
                Align::Center => {
                    let text_width = approx_text_width(text, font_size);
                    self.x + ((width - text_width) / 2.0).max(Pt::ZERO)
                }
            };
            self.canvas.draw_string(text_x, top, text);
        }
        self.x += width;
    }

    fn ln(&mut self, height_mm: f32) {
        self.x = self.margin;
        self.y += Pt::from_mm(height_mm);
    }

    fn rule(&mut self) {
        self.canvas.set_line_width(Pt::from_mm(0.5));
        let right = self.canvas.page_size().width - self.margin;
        self.canvas.line(self.margin, self.y, right, self.y);
    }

    fn set_y_from_bottom(&mut self, offset_mm: f32) {
        self.x = self.margin;
        self.y = self.canvas.page_size().height - Pt::from_mm(offset_mm);
    }
}

/// Average Helvetica advance; base-14 metrics are not embedded.
fn approx_text_width(text: &str, font_size: Pt) -> Pt {
    font_size * (0.5 * text.chars().count() as f32)
}

fn truncate_chars(text: &str, budget: usize) -> String {
    text.chars().take(budget).collect()
}

pub(crate) fn certificate_document(
    request: &CertificateRequest,
    page: Size,
    attribution: &str,
    debug: Option<&DebugLogger>,
) -> Result<CertificateDocument, SealPressError> {
    let mut w = CellWriter::new(page);

    // Title block.
    w.set_font(FONT_HELVETICA_BOLD, 20.0);
    w.cell(FULL_WIDTH, 10.0, "Certificate of Completion", false, Align::Center);
    w.ln(10.0);
    w.ln(5.0);

    // Key-value block.
    key_value(&mut w, "Document Name:", &request.document_name, 12.0);
    key_value(&mut w, "Document ID:", &request.document_ref, 12.0);
    key_value(&mut w, "Document Hash:", &request.content_hash, 10.0);
    w.ln(5.0);

    // Signer table.
    section_heading(&mut w, "Signatories");
    w.set_font(FONT_HELVETICA_BOLD, 10.0);
    for (width, label) in SIGNER_COLUMNS_MM.iter().zip(["Name", "Email", "Status", "Date"]) {
        w.cell(*width, ROW_HEIGHT_MM, label, true, Align::Left);
    }
    w.ln(ROW_HEIGHT_MM);
    w.set_font(FONT_HELVETICA, 10.0);
    for signer in &request.signers {
        w.ensure_room(Pt::from_mm(ROW_HEIGHT_MM));
        let date = signer
            .completed_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let status = signer.status.display();
        let cells = [
            signer.name.as_str(),
            signer.email.as_str(),
            status.as_str(),
            date.as_str(),
        ];
        for (width, value) in SIGNER_COLUMNS_MM.iter().zip(cells) {
            w.cell(*width, ROW_HEIGHT_MM, value, true, Align::Left);
        }
        w.ln(ROW_HEIGHT_MM);
    }
    w.ln(10.0);

    // Audit-log table, rendered in the given order.
    section_heading(&mut w, "Audit Log");
    w.set_font(FONT_HELVETICA_BOLD, 10.0);
    for (width, label) in AUDIT_COLUMNS_MM.iter().zip(["Date", "Action", "User", "IP Address"]) {
        w.cell(*width, ROW_HEIGHT_MM, label, true, Align::Left);
    }
    w.ln(ROW_HEIGHT_MM);
    w.set_font(FONT_HELVETICA, 10.0);
    for entry in &request.audit_log {
        w.ensure_room(Pt::from_mm(ROW_HEIGHT_MM));
        let date = entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string();
        let actor = truncate_chars(entry.actor_or_fallback(), ACTOR_CHAR_BUDGET);
        let ip = entry.ip_address.as_deref().unwrap_or("N/A");
        let cells = [date.as_str(), entry.action.as_str(), actor.as_str(), ip];
        for (width, value) in AUDIT_COLUMNS_MM.iter().zip(cells) {
            w.cell(*width, ROW_HEIGHT_MM, value, true, Align::Left);
        }
        w.ln(ROW_HEIGHT_MM);
    }

    // Footer, anchored above the bottom edge of the last page.
    w.set_y_from_bottom(FOOTER_OFFSET_MM);
    w.set_font(FONT_HELVETICA_OBLIQUE, 8.0);
    w.cell(FULL_WIDTH, 10.0, attribution, false, Align::Center);
    w.ln(10.0);
    w.cell(
        FULL_WIDTH,
        5.0,
        &format!("Reference ID: {}", request.reference_id),
        false,
        Align::Center,
    );
    w.ln(5.0);

    if let Some(logger) = debug {
        let fingerprint = certificate_fingerprint(
            &request.document_ref,
            &request.content_hash,
            &request.signers,
            &request.audit_log,
        );
        logger.log_json(&format!(
            "{{\"type\":\"certificate.render\",\"document_ref\":\"{}\",\"signers\":{},\"audit_entries\":{},\"fingerprint\":\"{}\"}}",
            json_escape(&request.document_ref),
            request.signers.len(),
            request.audit_log.len(),
            fingerprint,
        ));
    }

    let doc = w.canvas.finish();
    let (bytes, page_count) = assemble_overlay_document(&doc, &ImageBank::new(), debug)?;
    Ok(CertificateDocument { bytes, page_count })
}

fn key_value(w: &mut CellWriter, label: &str, value: &str, value_size: f32) {
    w.set_font(FONT_HELVETICA_BOLD, 12.0);
    w.cell(40.0, 10.0, label, false, Align::Left);
    w.set_font(FONT_HELVETICA, value_size);
    w.cell(FULL_WIDTH, 10.0, value, false, Align::Left);
    w.ln(10.0);
}

fn section_heading(w: &mut CellWriter, title: &str) {
    w.set_font(FONT_HELVETICA_BOLD, 14.0);
    w.cell(FULL_WIDTH, 10.0, title, false, Align::Left);
    w.ln(10.0);
    w.rule();
    w.ln(2.0);
}

impl SealPress {
    /// Synthesizes a certificate of completion as bytes.
    pub fn certificate_bytes(
        &self,
        request: &CertificateRequest,
    ) -> Result<CertificateDocument, SealPressError> {
        certificate_document(
            request,
            self.certificate_page,
            &self.attribution,
            self.debug.as_deref(),
        )
    }
}
