// src/llm_extract.rs

use crate::config::{EndpointConfig, LlmBackend, LlmSection};
use crate::content::{Content, ImagePayload};
use crate::error::ModelFailure;
use crate::heuristics;
use crate::invoice::{InvoiceRecord, mock_record};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// The prompt template that instructs the model to extract structured invoice data.
const SYSTEM_PROMPT: &str = r#"You are an expert Data Extraction AI. Extract structured data from the provided invoice.
Return ONLY valid JSON. No markdown formatting. No preamble.

Required JSON Structure:
{
    "invoice_number": "string",
    "invoice_date": "YYYY-MM-DD",
    "customer_name": "string",
    "customer_address": "string",
    "subtotal": number,
    "tax": number,
    "total_amount": number,
    "line_items": [
        {
            "product_name": "string",
            "quantity": number,
            "unit_price": number,
            "line_total": number
        }
    ]
}

Mapping Rules:
- "Invoice No", "Bill No", "Ref No" -> invoice_number
- "Date", "Issued Date" -> invoice_date (Convert to YYYY-MM-DD)
- "Billed To", "Client" -> customer_name & customer_address
- "Total", "Grand Total" -> total_amount
- If a field is missing, use null."#;

/// What gets sent to the model alongside the system prompt.
#[derive(Debug, Clone, Copy)]
pub enum ModelInput<'a> {
    Text(&'a str),
    Image(&'a ImagePayload),
}

/// A chat model that turns a system prompt plus invoice content into a
/// JSON-object-shaped text response.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        input: ModelInput<'_>,
    ) -> Result<String, ModelFailure>;
}

// ---------------------------------------------------------------------------
// OpenAI-compatible chat completions
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat endpoint, resolved and ready to call.
pub struct ChatCompletionsModel {
    client: Client,
    base_url: String,
    text_model: String,
    vision_model: String,
    api_key: String,
    max_chars: usize,
}

impl ChatCompletionsModel {
    pub fn new(endpoint: &EndpointConfig, api_key: String, max_chars: usize) -> Self {
        Self {
            client: Client::new(),
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            text_model: endpoint.text_model.clone(),
            vision_model: endpoint.vision_model.clone(),
            api_key,
            max_chars,
        }
    }

    fn build_request(&self, system_prompt: &str, input: ModelInput<'_>) -> ChatRequest {
        let (model, content) = match input {
            ModelInput::Text(text) => {
                let text = truncate_chars(text, self.max_chars);
                (
                    self.text_model.clone(),
                    MessageContent::Text(format!(
                        "Extract data from this invoice text:\n\n{text}"
                    )),
                )
            }
            ModelInput::Image(image) => (
                self.vision_model.clone(),
                MessageContent::Parts(vec![
                    ContentPart::Text {
                        text: "Extract data from this invoice image.".to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image.data_url(),
                        },
                    },
                ]),
            ),
        };

        ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(system_prompt.to_string()),
                },
                ChatMessage {
                    role: "user",
                    content,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        }
    }
}

#[async_trait]
impl CompletionModel for ChatCompletionsModel {
    async fn complete(
        &self,
        system_prompt: &str,
        input: ModelInput<'_>,
    ) -> Result<String, ModelFailure> {
        let request = self.build_request(system_prompt, input);
        info!(model = %request.model, "Sending invoice to LLM");

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelFailure::Api { status, body });
        }

        let chat_response: ChatResponse = response.json().await?;
        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(ModelFailure::EmptyResponse)
    }
}

/// Cut `text` to at most `max` characters without splitting a code point.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Extract the outermost JSON object from a string that may contain
/// markdown fences or surrounding commentary.
fn extract_json_object(s: &str) -> Result<&str, ModelFailure> {
    let s = s
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let start = s
        .find('{')
        .ok_or_else(|| ModelFailure::Parse("no '{' found in LLM response".into()))?;
    let end = s
        .rfind('}')
        .ok_or_else(|| ModelFailure::Parse("no '}' found in LLM response".into()))?;
    if end <= start {
        return Err(ModelFailure::Parse("malformed JSON in LLM response".into()));
    }
    Ok(&s[start..=end])
}

/// Parse a model reply into a record. The reply only has to be a JSON
/// object; field shapes are not checked.
pub fn parse_model_reply(reply: &str) -> Result<InvoiceRecord, ModelFailure> {
    let json_str = extract_json_object(reply)?;
    let value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| ModelFailure::Parse(format!("{e}; raw: {json_str}")))?;
    if !value.is_object() {
        return Err(ModelFailure::Parse(format!("expected a JSON object; raw: {json_str}")));
    }
    serde_json::from_value(value).map_err(|e| ModelFailure::Parse(format!("{e}; raw: {json_str}")))
}

/// Key from the env var the endpoint names; blank values count as unset.
fn api_key_from_env(endpoint: &EndpointConfig) -> Option<String> {
    endpoint
        .api_key_env
        .as_deref()
        .and_then(|var| std::env::var(var).ok())
        .filter(|k| !k.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Structured data extractor
// ---------------------------------------------------------------------------

enum Strategy {
    /// No credential configured: every call yields the mock record.
    Unconfigured,
    /// Regex rules over raw text.
    Rules,
    Model(Box<dyn CompletionModel>),
}

/// Turns extracted content into an `InvoiceRecord`.
pub struct StructuredExtractor {
    strategy: Strategy,
}

impl StructuredExtractor {
    /// Build the extractor the config asks for. A remote backend whose key
    /// env var is unset or empty is treated as unconfigured.
    pub fn from_config(llm: &LlmSection) -> Self {
        match llm.backend {
            LlmBackend::Heuristics => {
                info!("Backend set to heuristics — using regex extraction");
                Self::rules()
            }
            LlmBackend::Ollama => {
                info!(url = %llm.ollama.base_url, "Using Ollama (local) backend");
                // required by API but ignored
                let model = ChatCompletionsModel::new(&llm.ollama, "ollama".into(), llm.max_chars);
                Self::with_model(Box::new(model))
            }
            LlmBackend::Remote => {
                match api_key_from_env(&llm.remote) {
                    Some(api_key) => {
                        info!(url = %llm.remote.base_url, "Using remote API backend");
                        let model = ChatCompletionsModel::new(&llm.remote, api_key, llm.max_chars);
                        Self::with_model(Box::new(model))
                    }
                    None => {
                        warn!("No LLM API key found — extraction will return mock data");
                        Self::unconfigured()
                    }
                }
            }
        }
    }

    pub fn with_model(model: Box<dyn CompletionModel>) -> Self {
        Self {
            strategy: Strategy::Model(model),
        }
    }

    pub fn rules() -> Self {
        Self {
            strategy: Strategy::Rules,
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            strategy: Strategy::Unconfigured,
        }
    }

    /// Attempt extraction, reporting why it failed instead of substituting anything.
    pub async fn try_extract(&self, content: &Content) -> Result<InvoiceRecord, ModelFailure> {
        let model = match &self.strategy {
            Strategy::Unconfigured => return Err(ModelFailure::NotConfigured),
            Strategy::Rules => {
                return match content {
                    Content::Text(text) => Ok(heuristics::extract_invoice(text)),
                    Content::Image(_) => Err(ModelFailure::UnsupportedContent(
                        "rule-based extraction needs text".into(),
                    )),
                    Content::Error(msg) => Err(ModelFailure::UnsupportedContent(msg.clone())),
                };
            }
            Strategy::Model(model) => model,
        };

        let input = match content {
            Content::Text(text) => ModelInput::Text(text),
            Content::Image(image) => ModelInput::Image(image),
            Content::Error(msg) => return Err(ModelFailure::UnsupportedContent(msg.clone())),
        };

        let reply = model.complete(SYSTEM_PROMPT, input).await?;
        parse_model_reply(&reply)
    }

    /// Never fails: any extraction failure is logged and replaced by the mock record.
    pub async fn extract(&self, content: &Content) -> InvoiceRecord {
        match self.try_extract(content).await {
            Ok(record) => {
                let (filled, total) = record.coverage();
                info!(
                    filled, total,
                    invoice_no = ?record.invoice_number,
                    line_items = record.line_items.len(),
                    "Extraction result"
                );
                record
            }
            Err(ModelFailure::NotConfigured) => {
                info!("No model configured — returning mock data");
                mock_record()
            }
            Err(e) => {
                warn!(error = %e, "LLM extraction failed — returning mock data");
                mock_record()
            }
        }
    }
}
