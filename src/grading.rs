use crate::models::{AnswerMap, Question, QuestionResult, QuestionType, Quiz, QuizResult};
use std::collections::BTreeSet;
use tracing::warn;

const UNKNOWN_OPTION_TEXT: &str = "N/A";

fn normalize_text(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Decides whether `submitted` answers `question`. Never panics; a skipped
/// question is simply incorrect.
pub fn is_correct(question: &Question, submitted: &[String]) -> bool {
    if submitted.is_empty() {
        return false;
    }
    match question.question_type {
        QuestionType::MultipleChoice | QuestionType::TrueFalse => {
            // A key that names a missing option can never be matched.
            if question.correct_answers.is_empty() || !question.dangling_key_ids().is_empty() {
                return false;
            }
            let expected: BTreeSet<&str> =
                question.correct_answers.iter().map(String::as_str).collect();
            let actual: BTreeSet<&str> = submitted.iter().map(String::as_str).collect();
            expected == actual
        }
        QuestionType::Text => {
            let value = normalize_text(&submitted[0]);
            if value.is_empty() {
                return false;
            }
            question
                .correct_answers
                .iter()
                .map(|accepted| normalize_text(accepted))
                .any(|accepted| accepted == value)
        }
    }
}

fn display_tokens(question: &Question, tokens: &[String]) -> Vec<String> {
    match question.question_type {
        QuestionType::Text => tokens.to_vec(),
        QuestionType::MultipleChoice | QuestionType::TrueFalse => tokens
            .iter()
            .map(|id| {
                question
                    .option(id)
                    .map(|o| o.text.clone())
                    .unwrap_or_else(|| UNKNOWN_OPTION_TEXT.to_string())
            })
            .collect(),
    }
}

pub fn percentage(correct: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        (correct as f64) * 100.0 / (total as f64)
    }
}

/// Scores `answers` against the quiz's answer key. Questions missing from
/// the map count as unanswered.
pub fn grade(quiz: &Quiz, answers: &AnswerMap) -> QuizResult {
    let mut correct_count = 0u32;
    let mut per_question = Vec::with_capacity(quiz.questions.len());

    for question in &quiz.questions {
        let dangling = question.dangling_key_ids();
        if !dangling.is_empty() {
            warn!(
                quiz_id = %quiz.id,
                question_id = %question.id,
                missing = ?dangling,
                "answer key references unknown options, question cannot be scored"
            );
        }

        let submitted = answers.get(&question.id).map(Vec::as_slice).unwrap_or(&[]);
        let correct = is_correct(question, submitted);
        if correct {
            correct_count += 1;
        }
        per_question.push(QuestionResult {
            question_id: question.id.clone(),
            is_correct: correct,
            user_answer: display_tokens(question, submitted),
            correct_answer: display_tokens(question, &question.correct_answers),
        });
    }

    let total = per_question.len() as u32;
    QuizResult {
        quiz_id: quiz.id.clone(),
        per_question,
        correct_count,
        total,
        percentage: percentage(correct_count, total),
    }
}
