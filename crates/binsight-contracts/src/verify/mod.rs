use indexmap::IndexMap;

use crate::detection::result::{DetectionResult, WasteCategory};

/// Results below this confidence push the user toward manual verification.
pub const VERIFY_THRESHOLD: f64 = 0.6;

pub const VERIFIED_MESSAGE: &str = "Verified manually by the user.";

/// Primary action the UI should surface for a finished classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    /// Low confidence: manual verification is the primary action.
    VerifyManually,
    /// Confident result: show completion, keep "report issue" secondary.
    ReportIssue,
}

pub fn needs_verification(confidence: f64) -> bool {
    confidence < VERIFY_THRESHOLD
}

pub fn presentation(result: &DetectionResult) -> Presentation {
    if needs_verification(result.confidence) {
        Presentation::VerifyManually
    } else {
        Presentation::ReportIssue
    }
}

/// Fixed catalog of common item names offered by the manual-verification
/// modal, keyed by category in stable display order.
pub fn verification_catalog() -> IndexMap<WasteCategory, Vec<&'static str>> {
    let mut catalog = IndexMap::new();
    catalog.insert(
        WasteCategory::Electronic,
        vec![
            "Smartphone",
            "Laptop",
            "Tablet",
            "Headphones",
            "Phone Charger",
            "Circuit Board",
        ],
    );
    catalog.insert(
        WasteCategory::Battery,
        vec![
            "Smartphone Battery",
            "Laptop Battery",
            "AA Battery",
            "Power Bank",
        ],
    );
    catalog.insert(
        WasteCategory::Plastic,
        vec!["Plastic Bottle", "Plastic Bag", "Food Container"],
    );
    catalog.insert(
        WasteCategory::Other,
        vec!["Glass Bottle", "Aluminum Can", "Cardboard Box", "Clothing"],
    );
    catalog
}

/// Applies a manual selection as a correction: the chosen catalog entry
/// replaces the item and category, confidence becomes 1.0 and the result
/// re-enters the success path. The identifier is kept, since it still names
/// the same capture.
pub fn apply_selection(
    result: &DetectionResult,
    category: WasteCategory,
    item: &str,
) -> DetectionResult {
    DetectionResult {
        id: result.id.clone(),
        item: item.to_string(),
        category,
        confidence: 1.0,
        value: result.value,
        message: VERIFIED_MESSAGE.to_string(),
    }
}
