pub mod answer;
pub mod normalize;
pub mod result;

pub use answer::{parse_answer, strip_code_fences, CategoryHint, ClassifierFields, Indicator, ParseOutcome};
pub use normalize::normalize;
pub use result::{DetectionResult, WasteCategory};
