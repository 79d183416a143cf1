use crate::errors::JudgeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeVerdict {
    pub score: u8,
    pub rationale: String,
}

fn schema(message: impl Into<String>) -> JudgeError {
    JudgeError::Schema {
        message: message.into(),
    }
}

/// Extracts the first JSON object from the judge output and validates
/// `{score: integer 0..=100, rationale: non-empty string}` without coercion.
pub fn parse_verdict(text: &str) -> Result<JudgeVerdict, JudgeError> {
    let text = text.trim();
    let start = text
        .find('{')
        .ok_or_else(|| schema("no JSON object in judge output"))?;

    let val: serde_json::Value = serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<serde_json::Value>()
        .next()
        .ok_or_else(|| schema("no JSON object in judge output"))?
        .map_err(|e| schema(format!("invalid JSON: {}", e)))?;

    let obj = val
        .as_object()
        .ok_or_else(|| schema("verdict is not an object"))?;

    let score = match obj.get("score") {
        None => return Err(schema("missing 'score'")),
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .filter(|s| *s <= 100)
            .ok_or_else(|| schema(format!("'score' must be an integer in 0..=100 (got {})", n)))?,
        Some(other) => return Err(schema(format!("'score' must be an integer (got {})", other))),
    };

    let rationale = match obj.get("rationale") {
        None => return Err(schema("missing 'rationale'")),
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(serde_json::Value::String(_)) => return Err(schema("'rationale' is empty")),
        Some(_) => return Err(schema("'rationale' must be a string")),
    };

    Ok(JudgeVerdict {
        score: score as u8,
        rationale,
    })
}
