use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Closed category set the rest of the system is allowed to depend on.
/// Anything the model emits outside this set collapses to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WasteCategory {
    Electronic,
    Battery,
    Plastic,
    Other,
}

impl WasteCategory {
    pub const ALL: [WasteCategory; 4] = [
        WasteCategory::Electronic,
        WasteCategory::Battery,
        WasteCategory::Plastic,
        WasteCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WasteCategory::Electronic => "electronic",
            WasteCategory::Battery => "battery",
            WasteCategory::Plastic => "plastic",
            WasteCategory::Other => "other",
        }
    }

    /// Maps a free-text category label onto the closed set. Unrecognized
    /// labels land in `Other` rather than failing the classification.
    pub fn from_label(label: &str) -> WasteCategory {
        match label.trim().to_ascii_lowercase().as_str() {
            "electronic" | "electronics" | "e-waste" | "ewaste" => WasteCategory::Electronic,
            "battery" | "batteries" => WasteCategory::Battery,
            "plastic" | "plastics" => WasteCategory::Plastic,
            _ => WasteCategory::Other,
        }
    }
}

impl fmt::Display for WasteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical, fully-validated output of one classification. Either a whole
/// value exists (lifecycle `Success`) or nothing does; no partial results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub id: String,
    pub item: String,
    pub category: WasteCategory,
    /// Normalized trust score, always finite and within [0, 1].
    pub confidence: f64,
    /// Estimated credit, always finite and >= 0.
    pub value: f64,
    pub message: String,
}

static RESULT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identifier assigned at normalization time. Monotonic within the process
/// and never derived from model output.
pub fn next_result_id() -> String {
    let seq = RESULT_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("det-{seq:06}")
}
