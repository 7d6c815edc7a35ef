use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

pub const CONTRACT_ID: &str = "sealpress.certificate_contract";
pub const CONTRACT_VERSION: &str = "1";

// Well-known audit action tags emitted by the surrounding signing workflow.
// The certificate renders whatever tag it is given; these exist so callers
// and tests agree on spelling.
pub const ACTION_VIEWED: &str = "VIEWED";
pub const ACTION_SIGNED: &str = "SIGNED";
pub const ACTION_COMPLETED: &str = "COMPLETED";
pub const ACTION_AGREED_TO_TERMS: &str = "AGREED_TO_TERMS";

pub const ACTOR_FALLBACK: &str = "System/Guest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerStatus {
    Sent,
    Viewed,
    Signed,
}

impl SignerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignerStatus::Sent => "sent",
            SignerStatus::Viewed => "viewed",
            SignerStatus::Signed => "signed",
        }
    }

    pub fn from_str(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sent" => Some(SignerStatus::Sent),
            "viewed" => Some(SignerStatus::Viewed),
            "signed" => Some(SignerStatus::Signed),
            _ => None,
        }
    }

    /// Display form used on the certificate ("sent" -> "Sent").
    pub fn display(&self) -> String {
        let raw = self.as_str();
        let mut chars = raw.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignerRecord {
    pub name: String,
    pub email: String,
    pub status: SignerStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub actor_label: String,
    pub ip_address: Option<String>,
}

impl AuditEntry {
    pub fn actor_or_fallback(&self) -> &str {
        if self.actor_label.trim().is_empty() {
            ACTOR_FALLBACK
        } else {
            &self.actor_label
        }
    }
}

/// Canonical JSON payload for a certificate's inputs. Key order is fixed by
/// construction so the fingerprint is stable across runs and platforms.
pub fn certificate_payload(
    document_ref: &str,
    content_hash: &str,
    signers: &[SignerRecord],
    audit_log: &[AuditEntry],
) -> Value {
    json!({
        "contract_id": CONTRACT_ID,
        "contract_version": CONTRACT_VERSION,
        "document_ref": document_ref,
        "content_hash": content_hash,
        "signers": signers
            .iter()
            .map(|s| {
                json!({
                    "name": s.name,
                    "email": s.email,
                    "status": s.status.as_str(),
                    "completed_at": s
                        .completed_at
                        .map(|t| t.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
                })
            })
            .collect::<Vec<_>>(),
        "audit_log": audit_log
            .iter()
            .map(|e| {
                json!({
                    "timestamp": e.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
                    "action": e.action,
                    "actor": e.actor_or_fallback(),
                    "ip_address": e.ip_address,
                })
            })
            .collect::<Vec<_>>(),
    })
}

/// SHA-256 fingerprint of the canonical certificate payload.
pub fn certificate_fingerprint(
    document_ref: &str,
    content_hash: &str,
    signers: &[SignerRecord],
    audit_log: &[AuditEntry],
) -> String {
    let payload = certificate_payload(document_ref, content_hash, signers, audit_log);
    sha256_hex(payload.to_string().as_bytes())
}

/// Hex-encoded SHA-256 over raw bytes. Callers hash the flattened document
/// with this before certificate generation; the engine itself never hashes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}
