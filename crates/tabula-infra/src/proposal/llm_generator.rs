//! LlmProposalGenerator -- [`ProposalGenerator`] backed by an LLM provider.
//!
//! One completion per proposal: the shared system prompt, a user turn built
//! from the [`ProposalContext`], and tolerant JSON extraction on the reply.

use tabula_core::llm::box_provider::BoxLlmProvider;
use tabula_core::proposal::ProposalGenerator;
use tabula_core::proposal::parse::parse_proposal;
use tabula_core::proposal::prompt::{SYSTEM_PROMPT, build_user_prompt};
use tabula_types::config::LlmConfig;
use tabula_types::error::AttemptError;
use tabula_types::llm::{CompletionRequest, Message, MessageRole};
use tabula_types::proposal::{Proposal, ProposalContext};

pub struct LlmProposalGenerator {
    provider: BoxLlmProvider,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl LlmProposalGenerator {
    pub fn new(provider: BoxLlmProvider, config: &LlmConfig) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    fn request(&self, context: &ProposalContext) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: MessageRole::User,
                content: build_user_prompt(context),
            }],
            system: Some(SYSTEM_PROMPT.to_string()),
            max_tokens: self.max_tokens,
            temperature: Some(self.temperature),
            stop_sequences: None,
        }
    }
}

impl ProposalGenerator for LlmProposalGenerator {
    async fn propose(&self, context: &ProposalContext) -> Result<Proposal, AttemptError> {
        let request = self.request(context);
        let response = self
            .provider
            .complete(&request)
            .await
            .map_err(|e| AttemptError::ProposalUnavailable(e.to_string()))?;

        let proposal = parse_proposal(&response.content);
        match &proposal {
            Ok(p) => tracing::debug!(
                provider = self.provider.name(),
                kind = p.kind(),
                retry = ?context.retry_number,
                "proposal received"
            ),
            Err(e) => tracing::warn!(provider = self.provider.name(), error = %e, "unparseable proposal"),
        }
        proposal
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tabula_core::llm::provider::LlmProvider;
    use tabula_types::llm::{CompletionResponse, LlmError, StopReason, Usage};

    use super::*;

    /// Provider returning a fixed reply and recording requests.
    struct MockLlmProvider {
        reply: Result<String, String>,
        requests: Arc<Mutex<Vec<CompletionRequest>>>,
    }

    impl LlmProvider for MockLlmProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            match &self.reply {
                Ok(content) => Ok(CompletionResponse {
                    id: "msg_mock".to_string(),
                    content: content.clone(),
                    model: request.model.clone(),
                    stop_reason: StopReason::EndTurn,
                    usage: Usage::default(),
                }),
                Err(message) => Err(LlmError::Overloaded(message.clone())),
            }
        }
    }

    fn generator(reply: Result<&str, &str>) -> (LlmProposalGenerator, Arc<Mutex<Vec<CompletionRequest>>>) {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let provider = MockLlmProvider {
            reply: reply.map(str::to_string).map_err(str::to_string),
            requests: requests.clone(),
        };
        let generator = LlmProposalGenerator::new(BoxLlmProvider::new(provider), &LlmConfig::default());
        (generator, requests)
    }

    fn context() -> ProposalContext {
        ProposalContext {
            stats_summary: "Shape: (891, 12)".to_string(),
            user_message: "fill missing ages with the median".to_string(),
            prior_error: None,
            retry_number: None,
            max_retries: 3,
        }
    }

    #[tokio::test]
    async fn test_fenced_json_reply_becomes_code() {
        let reply = "Sure!\n```json\n{\"kind\": \"code\", \"content\": \"df['Age'] = df['Age'].fillna(df['Age'].median())\"}\n```";
        let (generator, requests) = generator(Ok(reply));

        let proposal = generator.propose(&context()).await.unwrap();
        assert_eq!(
            proposal,
            Proposal::Code("df['Age'] = df['Age'].fillna(df['Age'].median())".to_string())
        );

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].system.as_deref(), Some(SYSTEM_PROMPT));
        assert_eq!(requests[0].model, LlmConfig::default().model);
        assert!(requests[0].messages[0].content.contains("Shape: (891, 12)"));
    }

    #[tokio::test]
    async fn test_action_alias_is_accepted() {
        let (generator, _) = generator(Ok(r#"{"action": "clarify", "content": "mean or median?"}"#));
        let proposal = generator.propose(&context()).await.unwrap();
        assert_eq!(proposal, Proposal::Clarify("mean or median?".to_string()));
    }

    #[tokio::test]
    async fn test_prose_reply_is_parse_error() {
        let (generator, _) = generator(Ok("I would fill them with the median."));
        let err = generator.propose(&context()).await.unwrap_err();
        assert!(matches!(err, AttemptError::ProposalParse(_)));
    }

    #[tokio::test]
    async fn test_provider_failure_is_unavailable() {
        let (generator, _) = generator(Err("overloaded"));
        let err = generator.propose(&context()).await.unwrap_err();
        assert!(matches!(err, AttemptError::ProposalUnavailable(m) if m.contains("overloaded")));
    }

    #[tokio::test]
    async fn test_retry_context_reaches_prompt() {
        let (generator, requests) = generator(Ok(r#"{"kind": "answer", "content": "done"}"#));
        let mut ctx = context();
        ctx.prior_error = Some("KeyError: 'age'".to_string());
        ctx.retry_number = Some(1);

        generator.propose(&ctx).await.unwrap();
        let prompt = &requests.lock().unwrap()[0].messages[0].content;
        assert!(prompt.contains("KeyError: 'age'"));
        assert!(prompt.contains("attempt=\"2\" max=\"3\""));
    }
}
