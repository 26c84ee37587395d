use serde_json::{Value, json};
use sha2::{Digest, Sha256};

pub const CONTRACT_ID: &str = "consent_pdf.render_receipt";
pub const CONTRACT_VERSION: &str = "1";

/// One clause of the legal template as seen by the fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClauseDigestInput<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub adult_text: &'a str,
    pub minor_text: Option<&'a str>,
}

/// Audit receipt emitted next to every rendered consent document.
///
/// The receipt ties the output bytes to the template revision and the record
/// that produced them, so an archived PDF can later be checked against the
/// stored raw record without re-rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderReceipt {
    pub contract_id: &'static str,
    pub contract_version: &'static str,
    pub template_fingerprint_sha256: String,
    pub record_fingerprint_sha256: String,
    pub document_sha256: String,
    pub document_bytes: usize,
    pub page_count: usize,
    pub signature_embedded: bool,
}

impl RenderReceipt {
    pub fn new(
        template_fingerprint_sha256: String,
        record_canonical_json: &str,
        document: &[u8],
        page_count: usize,
        signature_embedded: bool,
    ) -> Self {
        Self {
            contract_id: CONTRACT_ID,
            contract_version: CONTRACT_VERSION,
            template_fingerprint_sha256,
            record_fingerprint_sha256: hex_sha256(record_canonical_json.as_bytes()),
            document_sha256: hex_sha256(document),
            document_bytes: document.len(),
            page_count,
            signature_embedded,
        }
    }

    pub fn matches_document(&self, document: &[u8]) -> bool {
        document.len() == self.document_bytes && hex_sha256(document) == self.document_sha256
    }

    pub fn to_json_value(&self) -> Value {
        json!({
            "contract_id": self.contract_id,
            "contract_version": self.contract_version,
            "template_fingerprint_sha256": self.template_fingerprint_sha256,
            "record_fingerprint_sha256": self.record_fingerprint_sha256,
            "document_sha256": self.document_sha256,
            "document_bytes": self.document_bytes,
            "page_count": self.page_count,
            "signature_embedded": self.signature_embedded,
        })
    }

    pub fn to_json_string(&self) -> String {
        self.to_json_value().to_string()
    }
}

pub fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_digest(hasher)
}

/// Fingerprint of a clause template. Order matters: reordering clauses is a
/// content change and must produce a different fingerprint.
pub fn template_fingerprint_sha256<'a, I>(clauses: I) -> String
where
    I: IntoIterator<Item = ClauseDigestInput<'a>>,
{
    let mut hasher = Sha256::new();
    hasher.update(CONTRACT_ID.as_bytes());
    hasher.update(b"\n");
    hasher.update(CONTRACT_VERSION.as_bytes());
    for clause in clauses {
        hasher.update(b"\n");
        for field in [clause.id, clause.title, clause.adult_text] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        match clause.minor_text {
            Some(text) => {
                hasher.update([1u8]);
                hasher.update((text.len() as u64).to_le_bytes());
                hasher.update(text.as_bytes());
            }
            None => hasher.update([0u8]),
        }
    }
    hex_digest(hasher)
}

fn hex_digest(hasher: Sha256) -> String {
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
