use serde_json::{json, Value};

/// Instruction sent with every capture. This is a contract with the external
/// model: a bare JSON object, no prose, no markdown. The parser still
/// tolerates violations.
pub const CLASSIFY_INSTRUCTION: &str = "You are a waste-classification assistant. \
Identify the single object in the image and respond with ONLY a JSON object, \
no markdown fences and no extra prose, with exactly these fields: \
\"item\" (short display name), \
\"category\" (one of: electronic, battery, plastic, other), \
\"confidence\" (number between 0 and 1), \
\"value\" (estimated recycling credit in whole currency units, 0 if none), \
\"message\" (one short sentence justifying the classification).";

pub const TEMPERATURE: f64 = 0.1;
pub const MAX_TOKENS: u64 = 300;

/// Informational capture hints supplied by the user. Carried through to the
/// history record; the prompt does not currently use them.
#[derive(Debug, Clone, Default)]
pub struct CaptureHints {
    pub weight: Option<String>,
    pub size: Option<String>,
}

/// Immutable request value for one capture attempt. Built once, consumed by
/// exactly one gateway call.
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    model: String,
    image_data_uri: String,
    hints: CaptureHints,
}

impl ClassificationRequest {
    pub fn build(image_data_uri: String, hints: CaptureHints, model: &str) -> Self {
        Self {
            model: model.to_string(),
            image_data_uri,
            hints,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn image_data_uri(&self) -> &str {
        &self.image_data_uri
    }

    pub fn hints(&self) -> &CaptureHints {
        &self.hints
    }

    /// Chat-completions payload: one user message carrying the instruction
    /// and the image, near-deterministic sampling, bounded output length,
    /// no streaming.
    pub fn payload(&self) -> Value {
        json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": CLASSIFY_INSTRUCTION},
                    {"type": "image_url", "image_url": {"url": self.image_data_uri}},
                ],
            }],
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS,
            "stream": false,
        })
    }
}
