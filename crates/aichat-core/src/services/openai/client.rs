use std::future::Future;
use std::pin::Pin;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Url};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::error::{CompletionError, CompletionResult};
use super::models::{ChatRequest, ChatResponse, create_request};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type CompletionCallback = Box<dyn FnOnce(CompletionResult<ChatResponse>) + Send + 'static>;

pub const OPENAI_CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

/// A provider that turns a [`ChatRequest`] into a [`ChatResponse`].
///
/// Each request is one-shot: no retry, no cancellation once sent.
pub trait CompletionClient: Send + Sync + 'static {
    /// Issue the request; the returned future owns everything it needs
    fn send(&self, api_key: &str, request: ChatRequest)
    -> BoxFuture<'static, CompletionResult<ChatResponse>>;

    fn create_request(
        &self,
        user_query: &str,
        model: &str,
        system_prompt: Option<&str>,
        temperature: f64,
        max_tokens: u32,
    ) -> ChatRequest {
        create_request(user_query, model, system_prompt, temperature, max_tokens)
    }

    /// Callback flavour of [`CompletionClient::send`]. The request runs on a
    /// spawned task, so this must be called from within a tokio runtime.
    fn send_with_callback(
        &self,
        api_key: &str,
        request: ChatRequest,
        callback: CompletionCallback,
    ) -> JoinHandle<()> {
        let future = self.send(api_key, request);
        tokio::spawn(async move { callback(future.await) })
    }
}

/// Chat completions over HTTP with a bearer API key
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    endpoint: Url,
}

impl OpenAiClient {
    pub fn new() -> CompletionResult<Self> {
        Self::with_endpoint(OPENAI_CHAT_COMPLETIONS_URL)
    }

    /// Point the client at another chat completions URL.
    ///
    /// The URL is validated here so a bad configuration fails before any
    /// network attempt.
    pub fn with_endpoint(endpoint: &str) -> CompletionResult<Self> {
        let invalid = |message: String| CompletionError::InvalidEndpoint {
            url: endpoint.to_string(),
            message,
        };

        let url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
        }

        Ok(Self {
            client: Client::new(),
            endpoint: url,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl CompletionClient for OpenAiClient {
    fn send(
        &self,
        api_key: &str,
        request: ChatRequest,
    ) -> BoxFuture<'static, CompletionResult<ChatResponse>> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let authorization = format!("Bearer {}", api_key);

        Box::pin(async move {
            debug!(
                model = %request.model,
                messages = request.messages.len(),
                "Sending chat completion request"
            );

            let response = client
                .post(endpoint)
                .header(CONTENT_TYPE, "application/json")
                .header(AUTHORIZATION, authorization)
                .json(&request)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                warn!(status = status.as_u16(), "Chat completion request rejected");
                return Err(CompletionError::Status(status.as_u16()));
            }

            let body = response.bytes().await?;
            if body.is_empty() {
                return Err(CompletionError::EmptyBody);
            }

            let parsed: ChatResponse = serde_json::from_slice(&body)?;
            debug!(choices = parsed.choices.len(), "Chat completion received");
            Ok(parsed)
        })
    }
}
