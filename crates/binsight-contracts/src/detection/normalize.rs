use super::answer::{CategoryHint, ClassifierFields, Indicator};
use super::result::{next_result_id, DetectionResult, WasteCategory};

pub const UNKNOWN_ITEM: &str = "Unknown Item";
pub const DEFAULT_MESSAGE: &str = "Analysis complete.";

/// Maps validated classifier fields onto the canonical [`DetectionResult`].
/// Pure and total: every input produces a result, with documented defaults
/// for absent fields and clamped numerics.
pub fn normalize(fields: ClassifierFields) -> DetectionResult {
    let category = match &fields.category {
        CategoryHint::EwasteFlag(true) => WasteCategory::Electronic,
        CategoryHint::EwasteFlag(false) => WasteCategory::Other,
        CategoryHint::Label(label) => WasteCategory::from_label(label),
        CategoryHint::Missing => WasteCategory::Other,
    };

    let confidence = match fields.indicator {
        Indicator::Unit(value) => value,
        Indicator::Percent(value) => value / 100.0,
        Indicator::Missing => 0.0,
    };
    let confidence = if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };

    let value = fields
        .credit
        .filter(|credit| credit.is_finite())
        .map(|credit| credit.max(0.0))
        .unwrap_or(0.0);

    DetectionResult {
        id: next_result_id(),
        item: fields.label.unwrap_or_else(|| UNKNOWN_ITEM.to_string()),
        category,
        confidence,
        value,
        message: fields
            .reasoning
            .unwrap_or_else(|| DEFAULT_MESSAGE.to_string()),
    }
}
