use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("reply does not contain a JSON object")]
    MissingObject,

    #[error("reply JSON is invalid: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("reply JSON is not an object")]
    NotAnObject,

    #[error("reply is missing `{0}`")]
    MissingField(&'static str),

    #[error("reply field `{field}` is unusable: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("reply text is empty")]
    EmptyText,
}

/// Slice from the first `{` to the last `}`, dropping any prose around it.
pub fn extract_json_object(text: &str) -> Result<&str, ParseError> {
    let start = text.find('{').ok_or(ParseError::MissingObject)?;
    let end = text.rfind('}').ok_or(ParseError::MissingObject)?;
    if end <= start {
        return Err(ParseError::MissingObject);
    }
    Ok(&text[start..=end])
}

pub fn parse_json_object(text: &str) -> Result<Map<String, Value>, ParseError> {
    let json = extract_json_object(text.trim())?;
    match serde_json::from_str::<Value>(json)? {
        Value::Object(map) => Ok(map),
        _ => Err(ParseError::NotAnObject),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_surrounded_by_prose() -> anyhow::Result<()> {
        let reply = "Sure! Here is the brief:\n```json\n{\"moral\": \"sharing\"}\n```\nEnjoy.";
        let map = parse_json_object(reply)?;
        assert_eq!(map.get("moral").and_then(Value::as_str), Some("sharing"));
        Ok(())
    }

    #[test]
    fn keeps_nested_braces_intact() -> anyhow::Result<()> {
        let reply = r#"{"scores": {"tone": 9}, "issues": []}"#;
        let map = parse_json_object(reply)?;
        assert_eq!(map["scores"]["tone"], 9);
        Ok(())
    }

    #[test]
    fn reply_without_braces_is_an_error() {
        let err = parse_json_object("I could not judge this story.").unwrap_err();
        assert!(matches!(err, ParseError::MissingObject));
    }

    #[test]
    fn reversed_braces_are_an_error() {
        let err = extract_json_object("} nothing here {").unwrap_err();
        assert!(matches!(err, ParseError::MissingObject));
    }

    #[test]
    fn broken_json_is_an_error() {
        let err = parse_json_object("{\"scores\": {\"tone\": 9,}").unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson(_)));
    }
}
