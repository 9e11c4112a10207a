use crate::capability::Translator;
use crate::error::{CapabilityError, Stage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Maximum text input size for translation (64 KiB).
const MAX_TRANSLATE_INPUT_BYTES: usize = 64 * 1024;

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

/// Text translation via an HTTP JSON endpoint (LibreTranslate wire shape).
#[derive(Debug, Clone)]
pub struct HttpTranslator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTranslator {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

fn classify_request_error(e: reqwest::Error) -> CapabilityError {
    if e.is_timeout() || e.is_connect() {
        CapabilityError::Unreachable(Stage::Translate, e.to_string())
    } else {
        CapabilityError::Translate(e.to_string())
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, CapabilityError> {
        if text.len() > MAX_TRANSLATE_INPUT_BYTES {
            return Err(CapabilityError::Translate(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TRANSLATE_INPUT_BYTES
            )));
        }

        let request = TranslateRequest {
            q: text,
            source: source_language,
            target: target_language,
            format: "text",
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if status.is_server_error() {
            // The endpoint is up but struggling; same retry treatment as
            // a refused connection.
            return Err(CapabilityError::Unreachable(
                Stage::Translate,
                format!("endpoint returned {}", status),
            ));
        }
        if !status.is_success() {
            return Err(CapabilityError::Translate(format!(
                "endpoint returned {}",
                status
            )));
        }

        let body: TranslateResponse = response
            .json()
            .await
            .map_err(|e| CapabilityError::Translate(format!("invalid response body: {}", e)))?;

        Ok(body.translated_text)
    }
}
