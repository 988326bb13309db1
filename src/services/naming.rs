//! File naming conventions that tie uploaded files to an application.
//!
//! Payment proofs are uploaded as `{id}-{suffix}` or, for group payments,
//! `combined-{id}-{suffix}`. Receipts additionally use `receipt-{id}-{suffix}`.
//! Proof matching is case-sensitive; receipt matching is not.

use serde::{Deserialize, Serialize};

pub const COMBINED_PREFIX: &str = "combined-";
pub const RECEIPT_PREFIX: &str = "receipt-";

const RECEIPT_EXTENSIONS: [&str; 5] = [".pdf", ".jpg", ".jpeg", ".png", ".webp"];

/// Which family of uploaded document a lookup is for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofKind {
    #[default]
    Payment,
    Receipt,
}

impl ProofKind {
    /// Whether `file_name` (a single path segment) belongs to `application_id`.
    pub fn matches(self, application_id: &str, file_name: &str) -> bool {
        if application_id.is_empty() {
            return false;
        }
        match self {
            ProofKind::Payment => {
                has_id_prefix(file_name, application_id)
                    || file_name
                        .strip_prefix(COMBINED_PREFIX)
                        .is_some_and(|rest| has_id_prefix(rest, application_id))
            }
            ProofKind::Receipt => {
                let name = file_name.to_lowercase();
                let id = application_id.to_lowercase();
                [COMBINED_PREFIX, RECEIPT_PREFIX, ""].iter().any(|prefix| {
                    name.strip_prefix(prefix)
                        .is_some_and(|rest| has_id_prefix(rest, &id))
                })
            }
        }
    }
}

/// `name` is `{id}-{non-empty suffix}`.
fn has_id_prefix(name: &str, id: &str) -> bool {
    name.strip_prefix(id)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|suffix| !suffix.is_empty())
}

/// Loose receipt detection used when sweeping a legacy bucket.
pub fn looks_like_receipt(file_name: &str) -> bool {
    let name = file_name.to_lowercase();
    name.starts_with(RECEIPT_PREFIX)
        || (name.contains("receipt") && RECEIPT_EXTENSIONS.iter().any(|ext| name.ends_with(ext)))
}

/// Application id embedded in a receipt file name.
///
/// Drops a leading `receipt-`, the extension, and the trailing
/// `-{timestamp}` segment, so ids that contain hyphens survive intact:
/// `receipt-ALM-ABC123-XYZ-1700000000.pdf` yields `ALM-ABC123-XYZ`.
pub fn application_id_from_receipt(file_name: &str) -> Option<String> {
    let rest = match file_name.get(..RECEIPT_PREFIX.len()) {
        Some(head) if head.eq_ignore_ascii_case(RECEIPT_PREFIX) => {
            &file_name[RECEIPT_PREFIX.len()..]
        }
        _ => file_name,
    };
    let stem = match rest.rfind('.') {
        Some(dot) if dot > 0 => &rest[..dot],
        _ => rest,
    };
    let (id, _timestamp) = stem.rsplit_once('-')?;
    (!id.is_empty()).then(|| id.to_string())
}

/// Content type for a document, from its extension.
pub fn content_type_for(file_name: &str) -> mime::Mime {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => mime::APPLICATION_PDF,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "png" => mime::IMAGE_PNG,
        "webp" => "image/webp".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_matches_individual_and_combined() {
        let id = "ALM-1A2B-9F3K";
        assert!(ProofKind::Payment.matches(id, "ALM-1A2B-9F3K-171000.jpg"));
        assert!(ProofKind::Payment.matches(id, "combined-ALM-1A2B-9F3K-170000.jpg"));
        assert!(!ProofKind::Payment.matches(id, "receipt-ALM-1A2B-9F3K-170000.pdf"));
    }

    #[test]
    fn payment_matching_is_case_sensitive() {
        assert!(!ProofKind::Payment.matches("ALM-1A2B", "alm-1a2b-1.jpg"));
        assert!(!ProofKind::Payment.matches("ALM-1A2B", "COMBINED-ALM-1A2B-1.jpg"));
    }

    #[test]
    fn receipt_matching_ignores_case() {
        assert!(ProofKind::Receipt.matches("ALM-1A2B", "Receipt-alm-1a2b-1700.pdf"));
        assert!(ProofKind::Receipt.matches("alm-1a2b", "ALM-1A2B-1700.pdf"));
        assert!(ProofKind::Receipt.matches("ALM-1A2B", "combined-ALM-1A2B-1700.pdf"));
    }

    #[test]
    fn id_must_be_followed_by_hyphen_and_suffix() {
        assert!(!ProofKind::Payment.matches("ALM-1", "ALM-12-1700.jpg"));
        assert!(!ProofKind::Payment.matches("ALM-1", "ALM-1-"));
        assert!(!ProofKind::Payment.matches("ALM-1", "ALM-1"));
        assert!(!ProofKind::Payment.matches("", "-1700.jpg"));
    }

    #[test]
    fn receipt_heuristic() {
        assert!(looks_like_receipt("receipt-ALM-1-1700.png"));
        assert!(looks_like_receipt("RECEIPT-whatever"));
        assert!(looks_like_receipt("payment_receipt_final.PDF"));
        assert!(!looks_like_receipt("payment_receipt_final.docx"));
        assert!(!looks_like_receipt("ALM-1-1700.pdf"));
    }

    #[test]
    fn derives_application_id_with_inner_hyphens() {
        assert_eq!(
            application_id_from_receipt("receipt-ALM-ABC123-XYZ-1700000000.pdf").as_deref(),
            Some("ALM-ABC123-XYZ")
        );
        assert_eq!(
            application_id_from_receipt("Receipt-A-17.jpg").as_deref(),
            Some("A")
        );
        assert_eq!(application_id_from_receipt("receipt-1700.pdf"), None);
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("a.PDF"), mime::APPLICATION_PDF);
        assert_eq!(content_type_for("a.jpeg"), mime::IMAGE_JPEG);
        assert_eq!(content_type_for("a.webp").essence_str(), "image/webp");
        assert_eq!(content_type_for("noext"), mime::APPLICATION_OCTET_STREAM);
    }
}
