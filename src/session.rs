use crate::models::{AnswerMap, Quiz};
use serde::Serialize;

/// Per-attempt position and captured answers. Owned by exactly one attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub quiz_id: String,
    pub current_question_index: usize,
    pub answers: AnswerMap,
    pub remaining_seconds: u32,
    #[serde(skip)]
    question_count: usize,
}

impl SessionState {
    pub fn start(quiz: &Quiz) -> Self {
        Self {
            quiz_id: quiz.id.clone(),
            current_question_index: 0,
            answers: AnswerMap::new(),
            remaining_seconds: quiz.time_limit_seconds(),
            question_count: quiz.questions.len(),
        }
    }

    pub fn question_count(&self) -> usize {
        self.question_count
    }

    pub fn is_on_last_question(&self) -> bool {
        self.current_question_index + 1 >= self.question_count
    }

    /// Radio semantics when `allow_multi` is false, checkbox toggle otherwise.
    pub fn select_option(&mut self, question_id: &str, option_id: &str, allow_multi: bool) {
        if !allow_multi {
            self.answers
                .insert(question_id.to_string(), vec![option_id.to_string()]);
            return;
        }
        let selected = self.answers.entry(question_id.to_string()).or_default();
        if let Some(pos) = selected.iter().position(|id| id == option_id) {
            selected.remove(pos);
        } else {
            selected.push(option_id.to_string());
        }
    }

    /// Stores the raw text; normalization is left to grading.
    pub fn set_text_answer(&mut self, question_id: &str, value: &str) {
        self.answers
            .insert(question_id.to_string(), vec![value.to_string()]);
    }

    pub fn go_next(&mut self) {
        if self.current_question_index + 1 < self.question_count {
            self.current_question_index += 1;
        }
    }

    pub fn go_previous(&mut self) {
        self.current_question_index = self.current_question_index.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::*;

    #[test]
    fn starts_at_first_question_with_full_time() {
        let mut quiz = water_quiz();
        quiz.time_limit_minutes = 3;
        let state = SessionState::start(&quiz);
        assert_eq!(state.current_question_index, 0);
        assert!(state.answers.is_empty());
        assert_eq!(state.remaining_seconds, 180);
        assert_eq!(state.question_count(), 2);
    }

    #[test]
    fn single_select_replaces_previous_choice() {
        let mut state = SessionState::start(&water_quiz());
        state.select_option("q1", "o1", false);
        state.select_option("q1", "o2", false);
        assert_eq!(state.answers["q1"], vec!["o2"]);
    }

    #[test]
    fn multi_select_toggles_and_keeps_order() {
        let mut state = SessionState::start(&water_quiz());
        state.select_option("q1", "o3", true);
        state.select_option("q1", "o1", true);
        state.select_option("q1", "o2", true);
        assert_eq!(state.answers["q1"], vec!["o3", "o1", "o2"]);
        state.select_option("q1", "o1", true);
        assert_eq!(state.answers["q1"], vec!["o3", "o2"]);
    }

    #[test]
    fn text_answer_is_stored_raw() {
        let mut state = SessionState::start(&water_quiz());
        state.set_text_answer("q2", "  Water ");
        state.set_text_answer("q2", " WATER ");
        assert_eq!(state.answers["q2"], vec![" WATER "]);
    }

    #[test]
    fn navigation_is_clamped() {
        let mut state = SessionState::start(&water_quiz());
        state.go_previous();
        assert_eq!(state.current_question_index, 0);
        state.go_next();
        assert_eq!(state.current_question_index, 1);
        assert!(state.is_on_last_question());
        state.go_next();
        assert_eq!(state.current_question_index, 1);
        state.go_previous();
        assert_eq!(state.current_question_index, 0);
    }
}
