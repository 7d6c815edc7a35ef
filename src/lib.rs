//! Deterministic PDF signature flattening and finalization.
//!
//! The engine burns positioned field values (text or raster signatures)
//! into an existing PDF's page content, synthesizes a certificate of
//! completion from signer and audit records, and concatenates signed
//! document and certificate into the final artifact. All three operations
//! are pure over their inputs; storage access goes through the
//! [`BlobStore`] port.

mod canvas;
mod certificate;
mod compose;
mod content;
mod coords;
mod debug;
mod error;
mod field;
mod flatten;
mod inspect;
mod perf;
mod render;
mod store;
mod types;

pub use certificate::{CertificateDocument, CertificateRequest};
pub use compose::{FlattenedDocument, MergedDocument};
pub use coords::map_field;
pub use error::SealPressError;
pub use field::{FieldSkip, FieldValue, PositionedField, SignatureImageFormat, classify_value};
pub use flatten::{CertificateOutcome, FlattenOutcome, FlattenRequest, MergeOutcome};
pub use inspect::{PdfReport, inspect_pdf_bytes, require_composable};
pub use sealpress_audit::{AuditEntry, SignerRecord, SignerStatus};
pub use store::{BlobStore, FsBlobStore, MemBlobStore, StoreError};
pub use types::{Color, Pt, Rect, Size};

use debug::DebugLogger;
use perf::PerfLogger;
use std::path::PathBuf;
use std::sync::Arc;

/// The flattening engine. One value can serve many documents; it holds no
/// per-document state.
///
/// Invocations against different documents are independent. For a single
/// document, callers must serialize writes to its derived artifacts (the
/// flattened output, certificate, and final merge); typically the signing
/// workflow's "last signer completes" transition already guarantees this.
/// The engine adds no internal locking.
pub struct SealPress {
    pub(crate) debug: Option<Arc<DebugLogger>>,
    pub(crate) perf: Option<Arc<PerfLogger>>,
    pub(crate) certificate_page: Size,
    pub(crate) attribution: String,
}

#[derive(Clone)]
pub struct SealPressBuilder {
    debug_path: Option<PathBuf>,
    perf_path: Option<PathBuf>,
    certificate_page: Size,
    attribution: String,
}

impl SealPress {
    pub fn builder() -> SealPressBuilder {
        SealPressBuilder {
            debug_path: None,
            perf_path: None,
            certificate_page: Size::a4(),
            attribution: "Powered by SealPress - Electronically Signed & Sealed".to_string(),
        }
    }

    /// Flushes the debug and perf logs, if configured. Called at the end of
    /// each store-level operation; explicit calls are only needed around
    /// the byte-level APIs.
    pub fn flush(&self) {
        if let Some(logger) = self.debug.as_deref() {
            logger.flush();
        }
        if let Some(logger) = self.perf.as_deref() {
            logger.flush();
        }
    }
}

impl SealPressBuilder {
    /// Writes JSONL debug events (per-field coordinates, skip reasons,
    /// counter summaries) to the given path.
    pub fn debug_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    /// Writes JSONL span timings for the pipeline stages to the given path.
    pub fn perf_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.perf_path = Some(path.into());
        self
    }

    /// Page size for synthesized certificates. Defaults to A4; it need not
    /// match the signed document's pages.
    pub fn certificate_page_size(mut self, size: Size) -> Self {
        self.certificate_page = size;
        self
    }

    /// Attribution line rendered in the certificate footer.
    pub fn attribution_line(mut self, line: impl Into<String>) -> Self {
        self.attribution = line.into();
        self
    }

    pub fn build(self) -> Result<SealPress, SealPressError> {
        let debug = match &self.debug_path {
            Some(path) => Some(Arc::new(DebugLogger::new(path)?)),
            None => None,
        };
        let perf = match &self.perf_path {
            Some(path) => Some(Arc::new(PerfLogger::new(path)?)),
            None => None,
        };
        Ok(SealPress {
            debug,
            perf,
            certificate_page: self.certificate_page,
            attribution: self.attribution,
        })
    }
}
