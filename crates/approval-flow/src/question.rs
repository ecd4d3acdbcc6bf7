//! Clarification-question state machine.

use std::collections::BTreeMap;
use tiller_domain::{EngineError, EngineResult, Question};
use tracing::{debug, warn};

/// Per-thread question state: `no-question ⇄ awaiting-answer`.
#[derive(Debug, Default)]
pub struct QuestionMachine {
    pending: Option<Question>,
}

impl QuestionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// A question event arrived from the stream.
    ///
    /// At most one question is pending at a time; a new one replaces
    /// an unanswered predecessor.
    pub fn observe_question(&mut self, question: Question) {
        if self.pending.is_some() {
            warn!("New question replaces an unanswered one");
        }
        debug!(question_id = %question.id, "Question raised");
        self.pending = Some(question);
    }

    /// The pending question, if the thread is awaiting an answer.
    pub fn pending(&self) -> Option<&Question> {
        self.pending.as_ref()
    }

    /// Validate and consume an answer.
    ///
    /// Fails with `IncompleteAnswer` when required keys are missing,
    /// leaving the question pending. On success the machine returns to
    /// `no-question` and the answered question is handed back so the
    /// caller can forward the answers to the subprocess.
    pub fn answer(&mut self, answers: &BTreeMap<String, String>) -> EngineResult<Question> {
        let question = self
            .pending
            .as_ref()
            .ok_or_else(|| EngineError::InvalidState("no question awaiting an answer".to_string()))?;

        let missing = question.missing_keys(answers);
        if !missing.is_empty() {
            return Err(EngineError::IncompleteAnswer { missing });
        }

        // Checked above, so the take cannot fail.
        Ok(self.pending.take().unwrap())
    }

    /// Drop any pending question (thread restart).
    pub fn clear(&mut self) {
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiller_domain::{QuestionId, ThreadId};

    fn question(required: &[&str]) -> Question {
        Question {
            id: QuestionId::new(),
            thread_id: ThreadId::new(),
            prompt: "Which runtime?".to_string(),
            options: vec![],
            required_keys: required.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn answer_without_pending_question_is_invalid() {
        let mut machine = QuestionMachine::new();
        let err = machine.answer(&BTreeMap::new()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[test]
    fn incomplete_answer_keeps_question_pending() {
        let mut machine = QuestionMachine::new();
        machine.observe_question(question(&["runtime", "version"]));

        let mut answers = BTreeMap::new();
        answers.insert("runtime".to_string(), "tokio".to_string());

        match machine.answer(&answers).unwrap_err() {
            EngineError::IncompleteAnswer { missing } => {
                assert_eq!(missing, vec!["version".to_string()]);
            }
            other => panic!("expected IncompleteAnswer, got {other:?}"),
        }
        assert!(machine.pending().is_some());
    }

    #[test]
    fn complete_answer_clears_the_question() {
        let mut machine = QuestionMachine::new();
        machine.observe_question(question(&["runtime"]));

        let mut answers = BTreeMap::new();
        answers.insert("runtime".to_string(), "tokio".to_string());

        let answered = machine.answer(&answers).unwrap();
        assert_eq!(answered.prompt, "Which runtime?");
        assert!(machine.pending().is_none());
    }

    #[test]
    fn new_question_replaces_unanswered_one() {
        let mut machine = QuestionMachine::new();
        machine.observe_question(question(&["a"]));
        let second = question(&["b"]);
        let second_id = second.id.clone();
        machine.observe_question(second);

        assert_eq!(machine.pending().unwrap().id, second_id);
    }
}
