use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::errors::{BotError, BotResult};
use crate::llm::provider::LlmProvider;
use crate::llm::sse_parser::{self, SseLineBuffer};
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse, StreamChunkKind};

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to build HTTP client with timeout, using defaults");
                reqwest::Client::new()
            });
        Self {
            id,
            api_base,
            api_key,
            client,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> BotResult<LlmResponse> {
        let mut body = serde_json::json!({
            "model": cfg.model,
            "messages": &messages,
            "stream": cfg.stream,
            "temperature": cfg.temperature,
        });
        if let Some(max_tokens) = cfg.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        tracing::debug!(
            provider = %self.id,
            model = %cfg.model,
            stream = cfg.stream,
            "sending LLM request"
        );
        tracing::debug!(body = %sanitized_for_log(&body), "request body (sanitized, base64 omitted)");

        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(BotError::LlmProvider(format!("{}: {}", status, err_body)));
        }

        if cfg.stream {
            self.handle_stream(response).await
        } else {
            self.handle_json(response).await
        }
    }
}

impl OpenAiCompatibleProvider {
    /// Accumulate an SSE stream into one reply.
    async fn handle_stream(&self, response: reqwest::Response) -> BotResult<LlmResponse> {
        let mut chunks = response.bytes_stream();
        let mut lines = SseLineBuffer::default();
        let mut reply = LlmResponse::default();

        let mut open = true;
        while open {
            let Some(bytes) = chunks.next().await else {
                if let Some(tail) = lines.finish() {
                    accumulate(&mut reply, &tail);
                }
                break;
            };
            for line in lines.push(&bytes?) {
                open = accumulate(&mut reply, &line);
                if !open {
                    break;
                }
            }
        }

        tracing::debug!(
            provider = %self.id,
            content_len = reply.content.len(),
            "streamed reply complete"
        );
        Ok(reply)
    }

    /// Handle a non-streaming JSON response.
    async fn handle_json(&self, response: reqwest::Response) -> BotResult<LlmResponse> {
        let json: serde_json::Value = response.json().await?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                BotError::LlmProvider("response has no choices[0].message.content".into())
            })?
            .to_string();

        tracing::debug!(
            provider = %self.id,
            content_len = content.len(),
            "reply received"
        );

        Ok(LlmResponse { content })
    }
}

/// Add one SSE line to `reply`. False once the stream signals the end.
fn accumulate(reply: &mut LlmResponse, line: &str) -> bool {
    match sse_parser::parse_sse_line(line) {
        Ok(Some(chunk)) => match chunk.kind {
            StreamChunkKind::Content => reply.content.push_str(&chunk.content),
            StreamChunkKind::Done => return false,
        },
        Ok(None) => {}
        Err(e) => tracing::debug!(error = %e, "skipping unparsable SSE line"),
    }
    true
}

/// Copy of the request body with image payloads replaced, for logging only.
fn sanitized_for_log(body: &serde_json::Value) -> String {
    let mut log_body = body.clone();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for msg in msgs {
            let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) else {
                continue;
            };
            for part in parts {
                if part.get("type").and_then(|t| t.as_str()) == Some("image_url") {
                    if let Some(url) = part.get_mut("image_url").and_then(|u| u.get_mut("url")) {
                        *url = serde_json::Value::String("<omitted_base64_image>".to_string());
                    }
                }
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_config(stream: bool) -> CallConfig {
        CallConfig {
            model: "test-model".into(),
            stream,
            temperature: 0.2,
            max_tokens: Some(10),
        }
    }

    fn provider(url: String) -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new("test".into(), url, "secret".into(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn json_reply_is_returned() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"YES"}}]}"#)
            .create_async()
            .await;

        let p = provider(format!("{}/v1/chat/completions", server.url()));
        let reply = p
            .chat(vec![ChatMessage::user("Is this a profile?")], &call_config(false))
            .await
            .unwrap();

        assert_eq!(reply.content, "YES");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn streamed_reply_is_accumulated() {
        let mut server = mockito::Server::new_async().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"the heart icon, 99\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"54\"}}]}\n\n",
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"0,17\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"28\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let reply = provider(server.url())
            .chat(vec![ChatMessage::user("Find the like button")], &call_config(true))
            .await
            .unwrap();

        assert_eq!(reply.content, "540,1728");
    }

    #[tokio::test]
    async fn error_status_becomes_provider_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(401)
            .with_body("invalid api key")
            .create_async()
            .await;

        let err = provider(server.url())
            .chat(vec![ChatMessage::user("hi")], &call_config(false))
            .await
            .unwrap_err();

        match err {
            BotError::LlmProvider(msg) => assert!(msg.contains("invalid api key")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn log_body_omits_images() {
        let body = serde_json::json!({
            "messages": [ChatMessage::user_with_image("look", "data:image/png;base64,QUJD")],
        });
        let logged = sanitized_for_log(&body);
        assert!(logged.contains("<omitted_base64_image>"));
        assert!(!logged.contains("QUJD"));
    }
}
