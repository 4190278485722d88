use crate::error::AttemptError;
use crate::grading::grade;
use crate::models::{AnswerMap, QuestionType, Quiz, QuizResult};
use crate::session::SessionState;
use crate::timer::{format_clock, is_low_time, Countdown, Tick};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitTrigger {
    Manual,
    Timer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerStatus {
    Active,
    Submitted,
    Abandoned,
}

/// Receives the graded result of a finalized attempt together with its
/// final state. Called at most once per attempt.
pub trait ResultSink: Send + Sync {
    fn accept(&self, final_state: &AttemptSnapshot, trigger: SubmitTrigger, result: &QuizResult);
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Running(u32),
    AutoSubmitted(QuizResult),
    Idle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptSnapshot {
    pub attempt_id: Uuid,
    pub quiz_id: String,
    pub status: RunnerStatus,
    pub current_question_index: usize,
    pub total_questions: usize,
    pub answers: AnswerMap,
    pub remaining_seconds: u32,
    pub display: String,
    pub low_time: bool,
    pub started_at: DateTime<Utc>,
}

/// Drives one attempt: answers, navigation, the countdown and the one-time
/// hand-off to grading.
pub struct QuizRunner {
    attempt_id: Uuid,
    quiz: Arc<Quiz>,
    session: SessionState,
    countdown: Countdown,
    status: RunnerStatus,
    started_at: DateTime<Utc>,
    sink: Arc<dyn ResultSink>,
}

impl QuizRunner {
    pub fn new(attempt_id: Uuid, quiz: Arc<Quiz>, sink: Arc<dyn ResultSink>) -> Self {
        let session = SessionState::start(&quiz);
        let countdown = Countdown::new(session.remaining_seconds);
        Self {
            attempt_id,
            quiz,
            session,
            countdown,
            status: RunnerStatus::Active,
            started_at: Utc::now(),
            sink,
        }
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn status(&self) -> RunnerStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == RunnerStatus::Active
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    fn ensure_active(&self) -> Result<(), AttemptError> {
        match self.status {
            RunnerStatus::Active => Ok(()),
            RunnerStatus::Submitted => Err(AttemptError::AlreadySubmitted),
            RunnerStatus::Abandoned => Err(AttemptError::Abandoned),
        }
    }

    pub fn select_option(&mut self, question_id: &str, option_id: &str) -> Result<(), AttemptError> {
        self.ensure_active()?;
        let question = self
            .quiz
            .question(question_id)
            .ok_or_else(|| AttemptError::UnknownQuestion(question_id.to_string()))?;
        if question.question_type == QuestionType::Text {
            return Err(AttemptError::AnswerKindMismatch {
                question_id: question_id.to_string(),
            });
        }
        if !question.has_option(option_id) {
            return Err(AttemptError::UnknownOption {
                question_id: question_id.to_string(),
                option_id: option_id.to_string(),
            });
        }
        let allow_multi = question.allows_multi_select();
        self.session.select_option(question_id, option_id, allow_multi);
        Ok(())
    }

    pub fn set_text_answer(&mut self, question_id: &str, value: &str) -> Result<(), AttemptError> {
        self.ensure_active()?;
        let question = self
            .quiz
            .question(question_id)
            .ok_or_else(|| AttemptError::UnknownQuestion(question_id.to_string()))?;
        if question.question_type != QuestionType::Text {
            return Err(AttemptError::AnswerKindMismatch {
                question_id: question_id.to_string(),
            });
        }
        self.session.set_text_answer(question_id, value);
        Ok(())
    }

    pub fn go_next(&mut self) -> Result<(), AttemptError> {
        self.ensure_active()?;
        self.session.go_next();
        Ok(())
    }

    pub fn go_previous(&mut self) -> Result<(), AttemptError> {
        self.ensure_active()?;
        self.session.go_previous();
        Ok(())
    }

    /// Manual submission; only from the last question and once confirmed.
    pub fn submit(&mut self, confirmed: bool) -> Result<QuizResult, AttemptError> {
        self.ensure_active()?;
        if !self.session.is_on_last_question() {
            return Err(AttemptError::NotOnLastQuestion);
        }
        if !confirmed {
            return Err(AttemptError::NotConfirmed);
        }
        self.finalize(SubmitTrigger::Manual)
            .ok_or(AttemptError::AlreadySubmitted)
    }

    pub fn tick(&mut self) -> TickOutcome {
        if !self.is_active() {
            return TickOutcome::Idle;
        }
        match self.countdown.tick() {
            Tick::Running(remaining) => {
                self.session.remaining_seconds = remaining;
                debug!(attempt_id = %self.attempt_id, remaining, "timer tick");
                TickOutcome::Running(remaining)
            }
            Tick::Expired => {
                self.session.remaining_seconds = 0;
                match self.finalize(SubmitTrigger::Timer) {
                    Some(result) => TickOutcome::AutoSubmitted(result),
                    None => TickOutcome::Idle,
                }
            }
            Tick::Stopped => TickOutcome::Idle,
        }
    }

    /// The taker left without submitting. Stops the countdown; no result is
    /// produced.
    pub fn abandon(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = RunnerStatus::Abandoned;
        self.countdown.cancel();
        info!(attempt_id = %self.attempt_id, quiz_id = %self.quiz.id, "attempt abandoned");
        true
    }

    fn finalize(&mut self, trigger: SubmitTrigger) -> Option<QuizResult> {
        if self.status != RunnerStatus::Active {
            return None;
        }
        self.status = RunnerStatus::Submitted;
        self.countdown.cancel();

        let result = grade(&self.quiz, &self.session.answers);
        info!(
            attempt_id = %self.attempt_id,
            quiz_id = %self.quiz.id,
            trigger = ?trigger,
            correct = result.correct_count,
            total = result.total,
            "attempt finalized"
        );
        self.sink.accept(&self.snapshot(), trigger, &result);
        Some(result)
    }

    pub fn snapshot(&self) -> AttemptSnapshot {
        let remaining = self.session.remaining_seconds;
        AttemptSnapshot {
            attempt_id: self.attempt_id,
            quiz_id: self.session.quiz_id.clone(),
            status: self.status,
            current_question_index: self.session.current_question_index,
            total_questions: self.session.question_count(),
            answers: self.session.answers.clone(),
            remaining_seconds: remaining,
            display: format_clock(remaining),
            low_time: is_low_time(remaining),
            started_at: self.started_at,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::fixtures::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct CountingSink {
        pub calls: Mutex<Vec<(Uuid, SubmitTrigger, QuizResult)>>,
    }

    impl CountingSink {
        pub fn count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl ResultSink for CountingSink {
        fn accept(&self, final_state: &AttemptSnapshot, trigger: SubmitTrigger, result: &QuizResult) {
            assert_eq!(final_state.status, RunnerStatus::Submitted);
            self.calls
                .lock()
                .unwrap()
                .push((final_state.attempt_id, trigger, result.clone()));
        }
    }

    fn runner_with(quiz: Quiz) -> (QuizRunner, Arc<CountingSink>) {
        let sink = Arc::new(CountingSink::default());
        let runner = QuizRunner::new(Uuid::new_v4(), Arc::new(quiz), sink.clone());
        (runner, sink)
    }

    fn expire(runner: &mut QuizRunner) -> TickOutcome {
        loop {
            match runner.tick() {
                TickOutcome::Running(_) => continue,
                other => return other,
            }
        }
    }

    #[test]
    fn manual_submit_grades_once() {
        let (mut runner, sink) = runner_with(water_quiz());
        runner.select_option("q1", "o2").unwrap();
        runner.go_next().unwrap();
        runner.set_text_answer("q2", "Water").unwrap();

        let result = runner.submit(true).unwrap();
        assert_eq!(result.correct_count, 2);
        assert_eq!(result.percentage, 100.0);
        assert_eq!(runner.status(), RunnerStatus::Submitted);

        assert_eq!(runner.submit(true), Err(AttemptError::AlreadySubmitted));
        assert_eq!(expire(&mut runner), TickOutcome::Idle);
        assert_eq!(sink.count(), 1);
        assert_eq!(sink.calls.lock().unwrap()[0].1, SubmitTrigger::Manual);
    }

    #[test]
    fn timer_expiry_auto_submits_and_blocks_manual_submit() {
        let (mut runner, sink) = runner_with(water_quiz());
        runner.select_option("q1", "o1").unwrap();

        match expire(&mut runner) {
            TickOutcome::AutoSubmitted(result) => {
                assert_eq!(result.correct_count, 0);
                assert_eq!(result.total, 2);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(runner.snapshot().remaining_seconds, 0);

        runner.go_next().unwrap_err();
        assert_eq!(runner.submit(true), Err(AttemptError::AlreadySubmitted));
        assert_eq!(runner.tick(), TickOutcome::Idle);
        assert_eq!(sink.count(), 1);
        assert_eq!(sink.calls.lock().unwrap()[0].1, SubmitTrigger::Timer);
    }

    #[test]
    fn timer_runs_for_full_time_limit() {
        let (mut runner, _sink) = runner_with(water_quiz());
        let mut ticks = 0;
        while let TickOutcome::Running(_) = runner.tick() {
            ticks += 1;
        }
        assert_eq!(ticks, 59);
    }

    #[test]
    fn submit_requires_last_question_and_confirmation() {
        let (mut runner, sink) = runner_with(water_quiz());
        assert_eq!(runner.submit(true), Err(AttemptError::NotOnLastQuestion));
        runner.go_next().unwrap();
        assert_eq!(runner.submit(false), Err(AttemptError::NotConfirmed));
        assert!(runner.is_active());
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn answers_are_checked_against_the_quiz() {
        let (mut runner, _sink) = runner_with(water_quiz());
        assert!(matches!(
            runner.select_option("nope", "o1"),
            Err(AttemptError::UnknownQuestion(_))
        ));
        assert!(matches!(
            runner.select_option("q1", "o9"),
            Err(AttemptError::UnknownOption { .. })
        ));
        assert!(matches!(
            runner.select_option("q2", "o1"),
            Err(AttemptError::AnswerKindMismatch { .. })
        ));
        assert!(matches!(
            runner.set_text_answer("q1", "ice"),
            Err(AttemptError::AnswerKindMismatch { .. })
        ));
    }

    #[test]
    fn multi_select_is_derived_from_the_key() {
        let quiz = quiz(vec![choice(
            "q1",
            &[("a", "A"), ("b", "B"), ("c", "C")],
            &["a", "c"],
        )]);
        let (mut runner, _sink) = runner_with(quiz);
        runner.select_option("q1", "c").unwrap();
        runner.select_option("q1", "a").unwrap();
        assert_eq!(runner.session().answers["q1"], vec!["c", "a"]);
        let result = runner.submit(true).unwrap();
        assert_eq!(result.correct_count, 1);
    }

    #[test]
    fn abandon_cancels_timer_without_result() {
        let (mut runner, sink) = runner_with(water_quiz());
        assert!(runner.abandon());
        assert!(!runner.abandon());
        assert_eq!(runner.tick(), TickOutcome::Idle);
        assert_eq!(runner.submit(true), Err(AttemptError::Abandoned));
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn snapshot_reflects_session() {
        let (mut runner, _sink) = runner_with(water_quiz());
        runner.tick();
        runner.go_next().unwrap();
        let snap = runner.snapshot();
        assert_eq!(snap.current_question_index, 1);
        assert_eq!(snap.total_questions, 2);
        assert_eq!(snap.remaining_seconds, 59);
        assert_eq!(snap.display, "00:59");
        assert!(snap.low_time);
        assert_eq!(snap.status, RunnerStatus::Active);
    }
}
