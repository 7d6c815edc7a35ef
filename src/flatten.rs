use std::collections::BTreeMap;

use crate::SealPress;
use crate::compose::{FlattenedDocument, MergedDocument, compose_flatten, merge_documents};
use crate::debug::json_escape;
use crate::error::SealPressError;
use crate::field::PositionedField;
use crate::inspect::{inspect_pdf_bytes, require_composable};
use crate::perf::Span;
use crate::store::{BlobStore, StoreError};

/// One flatten invocation, assembled fresh by the caller. The engine holds
/// no per-document state between calls.
#[derive(Debug, Clone)]
pub struct FlattenRequest {
    /// Caller's identifier for the document, used in logs and error context.
    pub document_ref: String,
    /// Store path of the original PDF blob.
    pub original_path: String,
    pub fields: Vec<PositionedField>,
    /// Store path the flattened output is written to.
    pub output_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenOutcome {
    pub path: String,
    pub page_count: usize,
    pub fields_rendered: usize,
    pub fields_skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateOutcome {
    pub path: String,
    pub page_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub path: String,
    pub page_count: usize,
}

/// Groups fields by page for one lookup per page during composition.
pub(crate) fn group_fields_by_page(
    fields: &[PositionedField],
) -> BTreeMap<u32, Vec<&PositionedField>> {
    let mut grouped: BTreeMap<u32, Vec<&PositionedField>> = BTreeMap::new();
    for field in fields {
        grouped.entry(field.page_number).or_default().push(field);
    }
    grouped
}

/// `<dir>/<stem>_final.pdf` next to the first merge input.
pub(crate) fn derive_final_path(signed_path: &str) -> String {
    let (dir, file) = match signed_path.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, signed_path),
    };
    let stem = match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    };
    match dir {
        Some(dir) => format!("{}/{}_final.pdf", dir, stem),
        None => format!("{}_final.pdf", stem),
    }
}

fn store_read(err: StoreError) -> SealPressError {
    SealPressError::Store(err.to_string())
}

impl SealPress {
    /// Pure byte-level flatten: burns field values into the source PDF.
    pub fn flatten_bytes(
        &self,
        source: &[u8],
        fields: &[PositionedField],
    ) -> Result<FlattenedDocument, SealPressError> {
        let grouped = group_fields_by_page(fields);
        compose_flatten(source, &grouped, self.debug.as_deref())
    }

    /// Pure byte-level merge: all pages of `first`, then all of `second`.
    pub fn merge_bytes(
        &self,
        first: &[u8],
        second: &[u8],
    ) -> Result<MergedDocument, SealPressError> {
        merge_documents(first, second)
    }

    /// Flattens a document whose original lives in the store and writes the
    /// result to `request.output_path`.
    pub fn flatten(
        &self,
        store: &dyn BlobStore,
        request: &FlattenRequest,
    ) -> Result<FlattenOutcome, SealPressError> {
        let _total = Span::start(
            self.perf.as_deref(),
            "flatten.total",
            Some(&request.document_ref),
        );
        if !store.exists(&request.original_path) {
            return Err(SealPressError::OriginalNotFound(
                request.original_path.clone(),
            ));
        }
        let source = store.get(&request.original_path).map_err(|err| match err {
            StoreError::NotFound(path) => SealPressError::OriginalNotFound(path),
            other => store_read(other),
        })?;

        let report = inspect_pdf_bytes(&source)?;
        require_composable(&report)?;
        if let Some(logger) = self.debug.as_deref() {
            logger.log_json(&format!(
                "{{\"type\":\"flatten.source\",\"document_ref\":\"{}\",\"pages\":{},\"pdf_version\":\"{}\"}}",
                json_escape(&request.document_ref),
                report.page_count,
                json_escape(&report.pdf_version),
            ));
        }

        let flattened = {
            let _compose = Span::start(
                self.perf.as_deref(),
                "flatten.compose",
                Some(&request.document_ref),
            );
            self.flatten_bytes(&source, &request.fields)?
        };

        store
            .put(&request.output_path, &flattened.bytes)
            .map_err(store_read)?;

        if let Some(logger) = self.debug.as_deref() {
            logger.emit_summary("flatten");
        }
        self.flush();

        Ok(FlattenOutcome {
            path: request.output_path.clone(),
            page_count: flattened.page_count,
            fields_rendered: flattened.fields_rendered,
            fields_skipped: flattened.fields_skipped,
        })
    }

    /// Synthesizes the certificate and writes it to the request's output
    /// path.
    pub fn generate_certificate(
        &self,
        store: &dyn BlobStore,
        request: &crate::certificate::CertificateRequest,
    ) -> Result<CertificateOutcome, SealPressError> {
        let _total = Span::start(
            self.perf.as_deref(),
            "certificate.total",
            Some(&request.document_ref),
        );
        let document = self.certificate_bytes(request)?;
        store
            .put(&request.output_path, &document.bytes)
            .map_err(store_read)?;
        self.flush();
        Ok(CertificateOutcome {
            path: request.output_path.clone(),
            page_count: document.page_count,
        })
    }

    /// Appends the certificate to the signed document. Both inputs must
    /// exist; the output path is derived from the first input's path.
    pub fn merge_certificate(
        &self,
        store: &dyn BlobStore,
        signed_path: &str,
        certificate_path: &str,
    ) -> Result<MergeOutcome, SealPressError> {
        let _total = Span::start(self.perf.as_deref(), "merge.total", Some(signed_path));
        for path in [signed_path, certificate_path] {
            if !store.exists(path) {
                return Err(SealPressError::MergeSourceMissing(path.to_string()));
            }
        }
        let signed = store.get(signed_path).map_err(|err| match err {
            StoreError::NotFound(path) => SealPressError::MergeSourceMissing(path),
            other => store_read(other),
        })?;
        let certificate = store.get(certificate_path).map_err(|err| match err {
            StoreError::NotFound(path) => SealPressError::MergeSourceMissing(path),
            other => store_read(other),
        })?;

        let merged = self.merge_bytes(&signed, &certificate)?;
        let final_path = derive_final_path(signed_path);
        store.put(&final_path, &merged.bytes).map_err(store_read)?;
        self.flush();
        Ok(MergeOutcome {
            path: final_path,
            page_count: merged.page_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::CertificateRequest;
    use crate::compose::test_support::{page_content_text, page_dims, pages_pdf, single_page_pdf};
    use crate::store::MemBlobStore;
    use base64::Engine;
    use chrono::{TimeZone, Utc};
    use sealpress_audit::{ACTION_COMPLETED, AuditEntry, SignerRecord, SignerStatus, sha256_hex};
    use std::io::Cursor;

    fn engine() -> SealPress {
        SealPress::builder().build().expect("engine")
    }

    fn png_data_uri(size: u32) -> String {
        let img = image::RgbaImage::from_pixel(size, size, image::Rgba([5, 5, 5, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png");
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        )
    }

    fn a4_two_pages() -> Vec<u8> {
        pages_pdf(&[("FIRST", 595.28, 841.89), ("SECOND", 595.28, 841.89)])
    }

    #[test]
    fn derive_final_path_suffixes_the_stem() {
        assert_eq!(
            derive_final_path("documents/3/signed/42_signed.pdf"),
            "documents/3/signed/42_signed_final.pdf"
        );
        assert_eq!(derive_final_path("out.pdf"), "out_final.pdf");
        assert_eq!(derive_final_path("noext"), "noext_final.pdf");
    }

    #[test]
    fn group_fields_by_page_preserves_field_order_within_a_page() {
        let fields = vec![
            PositionedField {
                page_number: 2,
                x_percent: 1.0,
                y_percent: 1.0,
                width_px: None,
                height_px: None,
                value: Some("b".to_string()),
            },
            PositionedField {
                page_number: 1,
                x_percent: 1.0,
                y_percent: 1.0,
                width_px: None,
                height_px: None,
                value: Some("a".to_string()),
            },
            PositionedField {
                page_number: 2,
                x_percent: 2.0,
                y_percent: 2.0,
                width_px: None,
                height_px: None,
                value: Some("c".to_string()),
            },
        ];
        let grouped = group_fields_by_page(&fields);
        assert_eq!(grouped[&1].len(), 1);
        let page2: Vec<&str> = grouped[&2]
            .iter()
            .map(|f| f.value.as_deref().unwrap())
            .collect();
        assert_eq!(page2, vec!["b", "c"]);
    }

    #[test]
    fn flatten_requires_the_original_blob() {
        let store = MemBlobStore::new();
        let request = FlattenRequest {
            document_ref: "42".to_string(),
            original_path: "documents/42/original.pdf".to_string(),
            fields: Vec::new(),
            output_path: "documents/42/signed/out.pdf".to_string(),
        };
        let err = engine().flatten(&store, &request).expect_err("missing blob");
        match err {
            SealPressError::OriginalNotFound(path) => {
                assert_eq!(path, "documents/42/original.pdf")
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!store.exists("documents/42/signed/out.pdf"), "no partial output");
    }

    #[test]
    fn flatten_rejects_corrupt_originals_without_writing() {
        let store = MemBlobStore::new();
        store.put("orig.pdf", b"definitely not a pdf").expect("put");
        let request = FlattenRequest {
            document_ref: "d".to_string(),
            original_path: "orig.pdf".to_string(),
            fields: Vec::new(),
            output_path: "out.pdf".to_string(),
        };
        let err = engine().flatten(&store, &request).expect_err("corrupt");
        assert!(matches!(err, SealPressError::PdfParse(_)));
        assert!(!store.exists("out.pdf"));
    }

    #[test]
    fn merge_requires_both_sources() {
        let store = MemBlobStore::new();
        store.put("signed.pdf", &single_page_pdf("S")).expect("put");
        let err = engine()
            .merge_certificate(&store, "signed.pdf", "cert.pdf")
            .expect_err("missing certificate");
        assert!(matches!(err, SealPressError::MergeSourceMissing(path) if path == "cert.pdf"));

        let store = MemBlobStore::new();
        store.put("cert.pdf", &single_page_pdf("C")).expect("put");
        let err = engine()
            .merge_certificate(&store, "signed.pdf", "cert.pdf")
            .expect_err("missing signed document");
        assert!(matches!(err, SealPressError::MergeSourceMissing(path) if path == "signed.pdf"));
    }

    #[test]
    fn end_to_end_sign_hash_certify_merge() {
        let engine = engine();
        let store = MemBlobStore::new();
        store
            .put("documents/7/original.pdf", &a4_two_pages())
            .expect("seed original");

        // One text field on page 1 at (10%, 10%, 40x20px), one 96x96px
        // image field centered on page 2.
        let request = FlattenRequest {
            document_ref: "7".to_string(),
            original_path: "documents/7/original.pdf".to_string(),
            fields: vec![
                PositionedField {
                    page_number: 1,
                    x_percent: 10.0,
                    y_percent: 10.0,
                    width_px: Some(40.0),
                    height_px: Some(20.0),
                    value: Some("John Doe".to_string()),
                },
                PositionedField {
                    page_number: 2,
                    x_percent: 50.0,
                    y_percent: 50.0,
                    width_px: Some(96.0),
                    height_px: Some(96.0),
                    value: Some(png_data_uri(96)),
                },
            ],
            output_path: "documents/7/signed/7_signed.pdf".to_string(),
        };
        let outcome = engine.flatten(&store, &request).expect("flatten");
        assert_eq!(outcome.page_count, 2);
        assert_eq!(outcome.fields_rendered, 2);
        assert_eq!(outcome.fields_skipped, 0);

        let signed = store.get(&outcome.path).expect("signed bytes");
        assert_eq!(
            page_dims(&signed),
            vec![(595_280, 841_890), (595_280, 841_890)]
        );
        let page1 = page_content_text(&signed, 1);
        assert!(page1.contains("(John Doe) Tj"));
        assert!(page1.contains("59.528"), "text anchor near 21mm from the left");
        let page2 = page_content_text(&signed, 2);
        assert!(page2.contains("72 0 0 72 297.64 348.945 cm"));

        // Hash-before-append: the certificate records the hash of the
        // flattened bytes, not of the merged output.
        let content_hash = sha256_hex(&signed);
        let at = Utc.with_ymd_and_hms(2024, 6, 5, 16, 45, 0).unwrap();
        let certificate_request = CertificateRequest {
            document_name: "Offer Letter".to_string(),
            document_ref: "7".to_string(),
            content_hash: content_hash.clone(),
            reference_id: "offer-letter-7".to_string(),
            signers: vec![SignerRecord {
                name: "John Doe".to_string(),
                email: "john@example.com".to_string(),
                status: SignerStatus::Signed,
                completed_at: Some(at),
            }],
            audit_log: vec![AuditEntry {
                timestamp: at,
                action: ACTION_COMPLETED.to_string(),
                actor_label: "John Doe".to_string(),
                ip_address: Some("192.0.2.1".to_string()),
            }],
            output_path: "documents/7/certificates/7_certificate.pdf".to_string(),
        };
        let certificate = engine
            .generate_certificate(&store, &certificate_request)
            .expect("certificate");
        assert_eq!(certificate.page_count, 1);

        let merged = engine
            .merge_certificate(&store, &outcome.path, &certificate.path)
            .expect("merge");
        assert_eq!(merged.path, "documents/7/signed/7_signed_final.pdf");
        assert_eq!(merged.page_count, 3);

        let final_bytes = store.get(&merged.path).expect("final bytes");
        let dims = page_dims(&final_bytes);
        assert_eq!(dims.len(), 3);
        // Signed content first, certificate last.
        assert!(page_content_text(&final_bytes, 1).contains("(John Doe) Tj"));
        assert!(
            page_content_text(&final_bytes, 3).contains("Certificate of Completion")
        );
        assert!(page_content_text(&final_bytes, 3).contains(&content_hash[..16]));
    }

    #[test]
    fn flatten_twice_yields_identical_outputs() {
        let engine = engine();
        let store = MemBlobStore::new();
        store.put("orig.pdf", &a4_two_pages()).expect("seed");
        let fields = vec![PositionedField {
            page_number: 1,
            x_percent: 25.0,
            y_percent: 40.0,
            width_px: Some(60.0),
            height_px: None,
            value: Some("Jane Roe".to_string()),
        }];
        let mut request = FlattenRequest {
            document_ref: "d".to_string(),
            original_path: "orig.pdf".to_string(),
            fields,
            output_path: "first.pdf".to_string(),
        };
        engine.flatten(&store, &request).expect("first");
        request.output_path = "second.pdf".to_string();
        engine.flatten(&store, &request).expect("second");
        assert_eq!(
            store.get("first.pdf").expect("first bytes"),
            store.get("second.pdf").expect("second bytes")
        );
    }
}
