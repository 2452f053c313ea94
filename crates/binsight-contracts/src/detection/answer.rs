use serde_json::Value;

/// How the model reported its trust in the answer. The two backend schemas
/// disagree: the primary shape carries `confidence` on a 0-1 scale, the
/// legacy shape carries `sustainability_score`/`confidence_score` on 0-100.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Indicator {
    /// Already on the canonical 0-1 scale.
    Unit(f64),
    /// 0-100 scale, divided by 100 during normalization.
    Percent(f64),
    Missing,
}

/// Category evidence as the model supplied it, before derivation.
#[derive(Debug, Clone, PartialEq)]
pub enum CategoryHint {
    /// Legacy boolean "is relevant e-waste" flag.
    EwasteFlag(bool),
    /// Free-text category or material label.
    Label(String),
    Missing,
}

/// Validated, clamped view of one model answer. Field-level absence is
/// tolerated here; normalization applies the documented defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierFields {
    pub label: Option<String>,
    pub category: CategoryHint,
    pub indicator: Indicator,
    pub credit: Option<f64>,
    pub reasoning: Option<String>,
}

/// Tagged parse outcome; consumers pattern-match instead of assuming success.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Ok(ClassifierFields),
    Failed(String),
}

/// Removes markdown code fencing the model may wrap its answer in despite
/// being told not to. Idempotent; non-fenced input passes through trimmed.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json", "JSON", ...) directly after the opening
    // fence, whether or not the fence is on its own line. JSON payloads never
    // start with an alphanumeric run, so this cannot eat content.
    let info_end = rest
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(rest.len());
    let body = &rest[info_end..];
    body.trim().strip_suffix("```").unwrap_or(body).trim()
}

/// Parses the raw model answer into [`ClassifierFields`]. Accepts both wire
/// schemas (`item/category/confidence/value/message` and the legacy
/// `label/material/recyclable/sustainability_score/estimated_credit/reasoning`
/// shape). Structural failure is terminal; field-level problems are not.
pub fn parse_answer(raw: &str) -> ParseOutcome {
    let stripped = strip_code_fences(raw);
    let parsed: Value = match serde_json::from_str(stripped) {
        Ok(value) => value,
        Err(err) => return ParseOutcome::Failed(format!("answer is not valid JSON: {err}")),
    };
    let Some(object) = parsed.as_object() else {
        return ParseOutcome::Failed("answer JSON is not an object".to_string());
    };

    let label = string_field(object, &["item", "label"]);
    let reasoning = string_field(object, &["message", "reasoning"]);

    let category = if let Some(flag) = object.get("recyclable").and_then(Value::as_bool) {
        CategoryHint::EwasteFlag(flag)
    } else if let Some(text) = string_field(object, &["category", "material"]) {
        CategoryHint::Label(text)
    } else {
        CategoryHint::Missing
    };

    let indicator = if let Some(score) =
        number_field(object, &["sustainability_score", "confidence_score"])
    {
        Indicator::Percent(score.clamp(0.0, 100.0))
    } else if let Some(confidence) = number_field(object, &["confidence"]) {
        Indicator::Unit(confidence.clamp(0.0, 1.0))
    } else {
        Indicator::Missing
    };

    let credit = number_field(object, &["value", "estimated_credit"]).map(|value| value.max(0.0));

    ParseOutcome::Ok(ClassifierFields {
        label,
        category,
        indicator,
        credit,
        reasoning,
    })
}

fn string_field(object: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn number_field(object: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .filter_map(Value::as_f64)
        .find(|value| value.is_finite())
}
