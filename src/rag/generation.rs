use std::sync::Arc;
use std::time::Duration;

use super::prompts;
use crate::core::errors::RagError;
use crate::llm::{ChatRequest, Completion, Generator};

/// Wraps a `Generator` with a per-call timeout and the draft retry policy.
pub struct AnswerGenerator {
    generator: Arc<dyn Generator>,
    timeout: Duration,
    temperature: Option<f64>,
}

impl AnswerGenerator {
    pub fn new(generator: Arc<dyn Generator>, timeout: Duration) -> Self {
        Self {
            generator,
            timeout,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// First-pass answer for `question` grounded in `context`.
    ///
    /// A transient failure (timeout, connection error, 5xx) is retried once.
    /// An empty completion is `EmptyGeneration` and is never retried.
    pub async fn draft(&self, context: &str, question: &str) -> Result<String, RagError> {
        let request = prompts::answer_request(context, question);

        let completion = match self.complete(request.clone()).await {
            Err(err) if err.is_transient() => {
                tracing::warn!("Generator call failed ({}), retrying once", err);
                self.complete(request).await?
            }
            other => other?,
        };

        if completion.is_empty() {
            return Err(RagError::EmptyGeneration);
        }
        Ok(completion.content)
    }

    /// Single bounded call, no retry.
    pub async fn complete(&self, mut request: ChatRequest) -> Result<Completion, RagError> {
        if request.temperature.is_none() {
            request.temperature = self.temperature;
        }

        match tokio::time::timeout(self.timeout, self.generator.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(RagError::Transport(format!(
                "{} timed out after {:?}",
                self.generator.name(),
                self.timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedGenerator {
        replies: Mutex<VecDeque<Result<Completion, RagError>>>,
        calls: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedGenerator {
        fn new(replies: Vec<Result<Completion, RagError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: ChatRequest) -> Result<Completion, RagError> {
            self.calls.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RagError::Generation("script exhausted".into())))
        }
    }

    struct StalledGenerator;

    #[async_trait]
    impl Generator for StalledGenerator {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn complete(&self, _request: ChatRequest) -> Result<Completion, RagError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Completion::new("too late"))
        }
    }

    #[tokio::test]
    async fn transient_failure_is_retried_once() {
        let generator = ScriptedGenerator::new(vec![
            Err(RagError::transport("connection reset")),
            Ok(Completion::new("<answer>Cats purr.</answer>")),
        ]);
        let answer = AnswerGenerator::new(generator.clone(), Duration::from_secs(5))
            .draft("ctx", "q")
            .await
            .expect("second attempt succeeds");

        assert_eq!(answer, "<answer>Cats purr.</answer>");
        assert_eq!(generator.call_count(), 2);
    }

    #[tokio::test]
    async fn second_transient_failure_is_returned() {
        let generator = ScriptedGenerator::new(vec![
            Err(RagError::transport("reset")),
            Err(RagError::transport("reset again")),
            Ok(Completion::new("never reached")),
        ]);
        let err = AnswerGenerator::new(generator.clone(), Duration::from_secs(5))
            .draft("ctx", "q")
            .await
            .expect_err("retry budget is one");

        assert!(err.is_transient());
        assert_eq!(generator.call_count(), 2);
    }

    #[tokio::test]
    async fn empty_completion_is_not_retried() {
        let generator = ScriptedGenerator::new(vec![
            Ok(Completion::new("   ")),
            Ok(Completion::new("unused")),
        ]);
        let err = AnswerGenerator::new(generator.clone(), Duration::from_secs(5))
            .draft("ctx", "q")
            .await
            .expect_err("empty");

        assert!(matches!(err, RagError::EmptyGeneration));
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn deterministic_failure_is_not_retried() {
        let generator = ScriptedGenerator::new(vec![Err(RagError::Generation("400".into()))]);
        let err = AnswerGenerator::new(generator.clone(), Duration::from_secs(5))
            .draft("ctx", "q")
            .await
            .expect_err("hard failure");

        assert!(matches!(err, RagError::Generation(_)));
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn temperature_is_applied_to_requests() {
        let generator = ScriptedGenerator::new(vec![Ok(Completion::new("ok"))]);
        AnswerGenerator::new(generator.clone(), Duration::from_secs(5))
            .with_temperature(0.3)
            .draft("ctx", "q")
            .await
            .expect("draft");

        let calls = generator.calls.lock().unwrap();
        assert_eq!(calls[0].temperature, Some(0.3));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_calls_time_out_as_transient() {
        let err = AnswerGenerator::new(Arc::new(StalledGenerator), Duration::from_secs(2))
            .complete(ChatRequest::new(vec![]))
            .await
            .expect_err("timeout");
        assert!(err.is_transient());
    }
}
