//! Draft verification and answer-marker extraction.
//!
//! The loop runs one verification round per query:
//!
//! ```text
//! Drafted -> Verifying -> Accepted | Corrected -> Extracted
//! ```
//!
//! A disabled loop, a failed verification call or an empty verification
//! reply all land in `Accepted` with the draft untouched.

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::generation::AnswerGenerator;
use super::prompts;
use super::types::{DialogTurn, Stage, StageDegraded};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationState {
    Drafted,
    Verifying,
    Accepted,
    Corrected,
    Extracted,
}

impl fmt::Display for VerificationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Drafted => "drafted",
            Self::Verifying => "verifying",
            Self::Accepted => "accepted",
            Self::Corrected => "corrected",
            Self::Extracted => "extracted",
        };
        f.write_str(name)
    }
}

/// Final answer text together with the marker it was taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// Content of `<perfect_answer>…</perfect_answer>`.
    Improved(String),
    /// Content of `<answer>…</answer>`.
    Answer(String),
    /// No usable marker; the raw text as-is.
    Unmarked(String),
}

impl Extraction {
    pub fn text(&self) -> &str {
        match self {
            Self::Improved(text) | Self::Answer(text) | Self::Unmarked(text) => text,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Improved(_) => "improved",
            Self::Answer(_) => "answer",
            Self::Unmarked(_) => "unmarked",
        }
    }
}

// Closing tag tolerates inner whitespace, e.g. "</perfect_ answer>".
static IMPROVED_MARKER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?is)<\s*perfect_\s*answer\s*>(.*?)<\s*/\s*perfect_\s*answer\s*>").ok()
});

static ANSWER_MARKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)<\s*answer\s*>(.*?)<\s*/\s*answer\s*>").ok());

static AFFIRMATIVE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(да|yes)\b").ok());

/// First non-blank span captured by `re`, trimmed.
fn first_span(re: &Option<Regex>, text: &str) -> Option<String> {
    re.as_ref()?
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .find(|span| !span.is_empty())
        .map(str::to_string)
}

/// Picks the answer out of model output.
///
/// Precedence: the first non-empty improved span, then the first non-empty
/// plain answer span, then the whole text unchanged.
pub fn extract_answer(text: &str) -> Extraction {
    if let Some(span) = first_span(&IMPROVED_MARKER, text) {
        return Extraction::Improved(span);
    }
    if let Some(span) = first_span(&ANSWER_MARKER, text) {
        return Extraction::Answer(span);
    }
    Extraction::Unmarked(text.to_string())
}

/// Leading sentence of the reply, cut before any improved marker. The
/// proposed answer and the reasoning after the verdict never count.
fn verdict(reply: &str) -> &str {
    let head = IMPROVED_MARKER
        .as_ref()
        .and_then(|re| re.find(reply))
        .map_or(reply, |m| &reply[..m.start()]);
    head.trim_start()
        .split(['.', '!', '?', '\n'])
        .next()
        .unwrap_or_default()
}

/// The improved answer carried by a verification reply, if the reply
/// asks for a correction and actually supplies one.
pub fn correction_from(reply: &str) -> Option<String> {
    let verdict = verdict(reply);
    let affirmed = AFFIRMATIVE.as_ref().is_some_and(|re| re.is_match(verdict));
    if !affirmed {
        return None;
    }
    first_span(&IMPROVED_MARKER, reply)
}

#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    /// `Accepted` or `Corrected`.
    pub decision: VerificationState,
    pub answer: Extraction,
    pub transitions: Vec<VerificationState>,
    pub degraded: Option<StageDegraded>,
}

pub struct VerificationLoop {
    generator: Arc<AnswerGenerator>,
    enabled: bool,
}

impl VerificationLoop {
    pub fn new(generator: Arc<AnswerGenerator>, enabled: bool) -> Self {
        Self { generator, enabled }
    }

    /// Judges `turn.draft_answer` against its context and returns the
    /// extracted final answer. Never fails.
    pub async fn run(&self, turn: &DialogTurn) -> VerificationOutcome {
        let mut transitions = vec![VerificationState::Drafted];

        if !self.enabled {
            return Self::accept(turn, transitions, None);
        }

        transitions.push(VerificationState::Verifying);
        let request = prompts::verification_request(&turn.context, &turn.question, &turn.draft_answer);

        let reply = match self.generator.complete(request).await {
            Ok(completion) if !completion.is_empty() => completion.content,
            Ok(_) => {
                let degraded = StageDegraded::new(Stage::Verification, "empty verification reply");
                return Self::accept(turn, transitions, Some(degraded));
            }
            Err(err) => {
                let degraded = StageDegraded::new(Stage::Verification, err.to_string());
                return Self::accept(turn, transitions, Some(degraded));
            }
        };

        match correction_from(&reply) {
            Some(improved) => {
                tracing::info!("Verification corrected the draft answer");
                transitions.push(VerificationState::Corrected);
                transitions.push(VerificationState::Extracted);
                VerificationOutcome {
                    decision: VerificationState::Corrected,
                    answer: Extraction::Improved(improved),
                    transitions,
                    degraded: None,
                }
            }
            None => {
                tracing::debug!("Verification accepted the draft answer");
                Self::accept(turn, transitions, None)
            }
        }
    }

    fn accept(
        turn: &DialogTurn,
        mut transitions: Vec<VerificationState>,
        degraded: Option<StageDegraded>,
    ) -> VerificationOutcome {
        transitions.push(VerificationState::Accepted);
        transitions.push(VerificationState::Extracted);
        VerificationOutcome {
            decision: VerificationState::Accepted,
            answer: extract_answer(&turn.draft_answer),
            transitions,
            degraded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::RagError;
    use crate::llm::{ChatRequest, Completion, Generator};
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedReply(Result<&'static str, &'static str>);

    #[async_trait]
    impl Generator for FixedReply {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _request: ChatRequest) -> Result<Completion, RagError> {
            match self.0 {
                Ok(text) => Ok(Completion::new(text)),
                Err(msg) => Err(RagError::Generation(msg.to_string())),
            }
        }
    }

    fn verifier(reply: Result<&'static str, &'static str>, enabled: bool) -> VerificationLoop {
        let generator = AnswerGenerator::new(Arc::new(FixedReply(reply)), Duration::from_secs(5));
        VerificationLoop::new(Arc::new(generator), enabled)
    }

    fn turn(draft: &str) -> DialogTurn {
        DialogTurn {
            question: "Do cats purr?".to_string(),
            draft_answer: draft.to_string(),
            context: "Документ 1 [Источник: a.txt, Страница: 1]:\nCats purr.\n".to_string(),
        }
    }

    #[test]
    fn extraction_prefers_improved_then_answer_then_raw() {
        assert_eq!(
            extract_answer("x <answer>a</answer> <perfect_answer> b </perfect_answer>"),
            Extraction::Improved("b".into())
        );
        assert_eq!(
            extract_answer("Because... <answer> Cats purr. </answer> done"),
            Extraction::Answer("Cats purr.".into())
        );
        assert_eq!(extract_answer("plain text"), Extraction::Unmarked("plain text".into()));
    }

    #[test]
    fn extraction_tolerates_spaced_closing_tag_and_multiline_spans() {
        assert_eq!(
            extract_answer("<perfect_answer>line one\nline two</perfect_ answer>"),
            Extraction::Improved("line one\nline two".into())
        );
        assert_eq!(
            extract_answer("<ANSWER>\nYes.\n</Answer>"),
            Extraction::Answer("Yes.".into())
        );
    }

    #[test]
    fn first_non_empty_span_wins() {
        assert_eq!(
            extract_answer("<answer> </answer><answer>second</answer><answer>third</answer>"),
            Extraction::Answer("second".into())
        );
        assert_eq!(
            extract_answer("<perfect_answer></perfect_answer><answer>kept</answer>"),
            Extraction::Answer("kept".into())
        );
    }

    #[test]
    fn unterminated_marker_falls_back_to_raw_text() {
        let raw = "<answer>never closed";
        assert_eq!(extract_answer(raw), Extraction::Unmarked(raw.into()));
    }

    #[test]
    fn correction_needs_keyword_and_span() {
        assert_eq!(
            correction_from("Да. <perfect_answer>Better.</perfect_answer>"),
            Some("Better.".into())
        );
        assert_eq!(correction_from("yes, but I have nothing better"), None);
        assert_eq!(correction_from("Нет. <perfect_answer>ignored</perfect_answer>"), None);
        // "Дата" must not count as "да".
        assert_eq!(correction_from("Дата: <perfect_answer>x</perfect_answer>"), None);
    }

    #[test]
    fn keyword_counts_only_in_the_verdict() {
        assert_eq!(
            correction_from(
                "Нет, корректировка не требуется. <perfect_answer>Да, кошки мурлычут.</perfect_answer>"
            ),
            None
        );
        assert_eq!(
            correction_from("No. The draft's 'yes' is right. <perfect_answer>Cats purr.</perfect_answer>"),
            None
        );
        assert_eq!(
            correction_from("\n  Yes, the draft misses a detail.\n<perfect_answer>Cats purr loudly.</perfect_answer>"),
            Some("Cats purr loudly.".into())
        );
    }

    #[tokio::test]
    async fn negative_verdict_keeps_the_draft_even_with_keyword_in_span() {
        let draft = turn("<answer>Cats purr.</answer>");
        let outcome = verifier(
            Ok("Нет, корректировка не требуется. <perfect_answer>Да, кошки мурлычут.</perfect_answer>"),
            true,
        )
        .run(&draft)
        .await;

        assert_eq!(outcome.decision, VerificationState::Accepted);
        assert_eq!(outcome.answer, Extraction::Answer("Cats purr.".into()));
    }

    #[tokio::test]
    async fn corrected_reply_replaces_the_draft() {
        let outcome = verifier(Ok("Да, нужна правка. <perfect_answer>Cats purr loudly.</perfect_answer>"), true)
            .run(&turn("<answer>Cats purr.</answer>"))
            .await;

        assert_eq!(outcome.decision, VerificationState::Corrected);
        assert_eq!(outcome.answer, Extraction::Improved("Cats purr loudly.".into()));
        assert_eq!(
            outcome.transitions,
            vec![
                VerificationState::Drafted,
                VerificationState::Verifying,
                VerificationState::Corrected,
                VerificationState::Extracted,
            ]
        );
    }

    #[tokio::test]
    async fn accepted_output_matches_disabled_output() {
        let draft = turn("Reasoning first. <answer>Cats purr.</answer>");

        let accepted = verifier(Ok("Нет, ответ корректен."), true).run(&draft).await;
        let disabled = verifier(Ok("unused"), false).run(&draft).await;

        assert_eq!(accepted.decision, VerificationState::Accepted);
        assert_eq!(accepted.answer, disabled.answer);
        assert_eq!(accepted.answer, Extraction::Answer("Cats purr.".into()));
        assert_eq!(
            disabled.transitions,
            vec![
                VerificationState::Drafted,
                VerificationState::Accepted,
                VerificationState::Extracted,
            ]
        );
    }

    #[tokio::test]
    async fn failed_or_empty_verification_keeps_the_draft() {
        let failed = verifier(Err("boom"), true).run(&turn("raw draft")).await;
        assert_eq!(failed.decision, VerificationState::Accepted);
        assert_eq!(failed.answer, Extraction::Unmarked("raw draft".into()));
        assert_eq!(failed.degraded.map(|d| d.stage), Some(Stage::Verification));

        let empty = verifier(Ok("  "), true).run(&turn("raw draft")).await;
        assert_eq!(empty.decision, VerificationState::Accepted);
        assert!(empty.degraded.is_some());
    }
}
