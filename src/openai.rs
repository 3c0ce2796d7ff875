use crate::generator::{GenerationRequest, ServiceError};

pub fn chat_completions_endpoint(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/chat/completions")
}

pub async fn chat_completion(
    client: &reqwest::Client,
    endpoint: &str,
    api_key: &str,
    model: &str,
    request: &GenerationRequest,
) -> Result<String, ServiceError> {
    let body = serde_json::json!({
        "model": model,
        "messages": [
            { "role": "system", "content": request.system },
            { "role": "user", "content": request.prompt },
        ],
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
    });

    let response = client
        .post(endpoint)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await
        .map_err(transport_error)?;

    let status = response.status();
    let raw = response.text().await.map_err(transport_error)?;
    if !status.is_success() {
        let message = parse_error_message(&raw).unwrap_or(raw);
        return Err(ServiceError::Api {
            status: status.as_u16(),
            message,
        });
    }

    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|err| ServiceError::Decode(format!("parse completion response: {err}")))?;
    extract_message_text(&value)
}

fn transport_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout
    } else {
        ServiceError::Transport(format!("{err:#}"))
    }
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

fn extract_message_text(value: &serde_json::Value) -> Result<String, ServiceError> {
    let text = value
        .pointer("/choices/0/message/content")
        .ok_or_else(|| ServiceError::Decode("missing `choices[0].message.content`".to_owned()))?
        .as_str()
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ServiceError::EmptyOutput);
    }
    Ok(text.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_ignores_trailing_slash() {
        assert_eq!(
            chat_completions_endpoint("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn extracts_first_choice_content() -> anyhow::Result<()> {
        let value = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "Once upon a time" } }]
        });
        assert_eq!(extract_message_text(&value)?, "Once upon a time");
        Ok(())
    }

    #[test]
    fn null_content_is_empty_output() {
        let value = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": null } }]
        });
        assert!(matches!(
            extract_message_text(&value),
            Err(ServiceError::EmptyOutput)
        ));
    }

    #[test]
    fn api_error_message_is_surfaced() {
        let raw = r#"{"error": {"message": "Incorrect API key provided"}}"#;
        assert_eq!(
            parse_error_message(raw).as_deref(),
            Some("Incorrect API key provided")
        );
        assert_eq!(parse_error_message("<html>bad gateway</html>"), None);
    }
}
