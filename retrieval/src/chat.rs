//! Retrieval-augmented chat over the corpus.
//!
//! Each question is embedded, the closest documents above the chat
//! threshold are extracted and handed to a [`ChatResponder`] together with
//! the recent conversation.

use std::sync::Arc;

use async_trait::async_trait;
use docvec_corpus::truncate_chars;
use docvec_embeddings::SimilarityResult;
use docvec_embeddings::provider::OPENAI_API_KEY_ENV;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::error::{Result, RetrievalError};
use crate::manager::DocumentManager;

const SYSTEM_PROMPT: &str = "You answer questions about the user's documents. \
Use the document excerpts provided when they are relevant and name the documents you rely on. \
If the excerpts do not contain the answer, say so and answer from general knowledge.";

/// A document excerpt given to the responder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDocument {
    pub doc_id: String,
    pub score: f32,
    pub text: String,
}

/// One question and its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

/// Answer to a question plus the documents it was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub answer: String,
    pub sources: Vec<SimilarityResult>,
}

/// Produces an answer from a question, context documents and history.
#[async_trait]
pub trait ChatResponder: Send + Sync {
    async fn respond(
        &self,
        question: &str,
        context: &[ContextDocument],
        history: &[ChatTurn],
    ) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// Responder backed by an OpenAI-compatible chat completions endpoint.
pub struct OpenAIChatResponder {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAIChatResponder {
    /// Create a responder with an explicit key.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Create a responder from `OPENAI_API_KEY` and the chat configuration.
    pub fn from_config(config: &ChatConfig) -> Result<Self> {
        let api_key = std::env::var(OPENAI_API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| RetrievalError::Config(format!("{OPENAI_API_KEY_ENV} is not set")))?;
        let mut responder = Self::new(api_key, &config.model);
        if let Some(base_url) = &config.base_url {
            responder = responder.with_base_url(base_url);
        }
        Ok(responder)
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_messages(
        question: &str,
        context: &[ContextDocument],
        history: &[ChatTurn],
    ) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage {
            role: "system",
            content: SYSTEM_PROMPT.to_string(),
        }];

        for turn in history {
            messages.push(ChatMessage {
                role: "user",
                content: turn.question.clone(),
            });
            messages.push(ChatMessage {
                role: "assistant",
                content: turn.answer.clone(),
            });
        }

        let content = if context.is_empty() {
            format!("No relevant documents were found.\n\nQuestion: {question}")
        } else {
            let excerpts = context
                .iter()
                .map(|doc| {
                    format!(
                        "Document: {} (similarity {:.2})\n{}",
                        doc.doc_id, doc.score, doc.text
                    )
                })
                .collect::<Vec<_>>()
                .join("\n\n---\n\n");
            format!("Relevant documents:\n\n{excerpts}\n\nQuestion: {question}")
        };
        messages.push(ChatMessage {
            role: "user",
            content,
        });
        messages
    }
}

#[async_trait]
impl ChatResponder for OpenAIChatResponder {
    async fn respond(
        &self,
        question: &str,
        context: &[ContextDocument],
        history: &[ChatTurn],
    ) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": Self::build_messages(question, context, history),
        });

        debug!("Requesting chat completion with model: {}", self.model);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Chat(format!("{status}: {error_text}")));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Chat(format!("invalid response: {e}")))?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RetrievalError::Chat("response contained no answer".to_string()))
    }
}

/// A conversation grounded on the corpus.
pub struct ChatSession {
    manager: Arc<DocumentManager>,
    responder: Arc<dyn ChatResponder>,
    config: ChatConfig,
    history: Vec<ChatTurn>,
}

impl ChatSession {
    /// Start a session using the manager's chat configuration.
    pub fn new(manager: Arc<DocumentManager>, responder: Arc<dyn ChatResponder>) -> Self {
        let config = manager.config().chat.clone();
        Self {
            manager,
            responder,
            config,
            history: Vec::new(),
        }
    }

    /// Previous turns, oldest first.
    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    /// Forget the conversation so far.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Answer `question` using the most similar documents as context.
    pub async fn ask(&mut self, question: &str) -> Result<ChatAnswer> {
        let mut sources = self
            .manager
            .search_text(question, Some(self.config.threshold))
            .await?;
        sources.truncate(self.config.max_context_documents);

        let mut context = Vec::with_capacity(sources.len());
        for source in &sources {
            match self.manager.document_text(&source.doc_id).await {
                Ok(text) => context.push(ContextDocument {
                    doc_id: source.doc_id.clone(),
                    score: source.score,
                    text: truncate_chars(&text, self.config.max_context_chars).to_string(),
                }),
                Err(e) => warn!("Skipping {} as chat context: {e}", source.doc_id),
            }
        }
        info!(
            "Answering with {} context documents: {:?}",
            context.len(),
            context.iter().map(|c| c.doc_id.as_str()).collect::<Vec<_>>()
        );

        let answer = self
            .responder
            .respond(question, &context, &self.history)
            .await?;

        self.history.push(ChatTurn {
            question: question.to_string(),
            answer: answer.clone(),
        });
        let excess = self
            .history
            .len()
            .saturating_sub(self.config.max_history_turns);
        self.history.drain(..excess);

        Ok(ChatAnswer { answer, sources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn context() -> Vec<ContextDocument> {
        vec![ContextDocument {
            doc_id: "notes/rust.md".to_string(),
            score: 0.82,
            text: "Rust has ownership.".to_string(),
        }]
    }

    #[test]
    fn test_messages_include_history_and_context() {
        let history = vec![ChatTurn {
            question: "hi".to_string(),
            answer: "hello".to_string(),
        }];
        let messages = OpenAIChatResponder::build_messages("what?", &context(), &history);

        let roles: Vec<&str> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        let last = &messages[3].content;
        assert!(last.contains("Document: notes/rust.md (similarity 0.82)"));
        assert!(last.ends_with("Question: what?"));
    }

    #[test]
    fn test_messages_without_context() {
        let messages = OpenAIChatResponder::build_messages("what?", &[], &[]);
        assert!(messages[1].content.starts_with("No relevant documents"));
    }

    #[tokio::test]
    async fn test_openai_responder() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({ "model": "gpt-test" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "Ownership." } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let responder = OpenAIChatResponder::new("test-key", "gpt-test").with_base_url(server.uri());
        let answer = responder.respond("what?", &context(), &[]).await.unwrap();
        assert_eq!(answer, "Ownership.");
    }

    #[tokio::test]
    async fn test_openai_responder_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let responder = OpenAIChatResponder::new("wrong", "gpt-test").with_base_url(server.uri());
        let err = responder.respond("what?", &[], &[]).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Chat(msg) if msg.contains("401")));
    }
}
