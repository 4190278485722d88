use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    Text,
}

impl QuestionType {
    pub fn is_choice(self) -> bool {
        matches!(self, QuestionType::MultipleChoice | QuestionType::TrueFalse)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizOption {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub text: String,
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Vec<QuizOption>,
    pub correct_answers: Vec<String>,
}

impl Question {
    /// Multi-select is only offered for multiple-choice questions whose key
    /// holds more than one option.
    pub fn allows_multi_select(&self) -> bool {
        self.question_type == QuestionType::MultipleChoice && self.correct_answers.len() > 1
    }

    pub fn option(&self, option_id: &str) -> Option<&QuizOption> {
        self.options.iter().find(|o| o.id == option_id)
    }

    pub fn has_option(&self, option_id: &str) -> bool {
        self.option(option_id).is_some()
    }

    /// Key ids that do not name any option of this question.
    pub fn dangling_key_ids(&self) -> Vec<&str> {
        if !self.question_type.is_choice() {
            return Vec::new();
        }
        self.correct_answers
            .iter()
            .filter(|id| !self.has_option(id))
            .map(String::as_str)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "timeLimit")]
    pub time_limit_minutes: u32,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub assigned_user_ids: BTreeSet<String>,
    pub questions: Vec<Question>,
}

impl Quiz {
    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    pub fn time_limit_seconds(&self) -> u32 {
        self.time_limit_minutes.saturating_mul(60)
    }

    pub fn is_visible_to(&self, user_id: Option<&str>) -> bool {
        match self.visibility {
            Visibility::Public => true,
            Visibility::Private => user_id
                .map(|id| self.assigned_user_ids.contains(id))
                .unwrap_or(false),
        }
    }
}

/// Question id to the submitted tokens: option ids for choice questions, a
/// single raw string for text questions.
pub type AnswerMap = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    pub question_id: String,
    pub is_correct: bool,
    pub user_answer: Vec<String>,
    pub correct_answer: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    pub quiz_id: String,
    pub per_question: Vec<QuestionResult>,
    pub correct_count: u32,
    pub total: u32,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub issue: String,
}

fn issue(field: String, text: &str) -> ValidationIssue {
    ValidationIssue {
        field,
        issue: text.into(),
    }
}

pub fn validate_quiz(quiz: &Quiz) -> Result<(), Vec<ValidationIssue>> {
    let mut issues = Vec::new();
    if quiz.title.trim().is_empty() {
        issues.push(issue("title".into(), "must not be empty"));
    }
    if quiz.time_limit_minutes < 1 {
        issues.push(issue("timeLimit".into(), "must be at least 1 minute"));
    }
    if quiz.questions.is_empty() {
        issues.push(issue("questions".into(), "must contain at least one question"));
    }
    if quiz.visibility == Visibility::Public && !quiz.assigned_user_ids.is_empty() {
        issues.push(issue(
            "assignedUserIds".into(),
            "must be empty for a public quiz",
        ));
    }

    let mut question_ids = HashSet::new();
    for (i, q) in quiz.questions.iter().enumerate() {
        if q.id.trim().is_empty() {
            issues.push(issue(format!("questions[{i}].id"), "must not be empty"));
        }
        if !question_ids.insert(q.id.as_str()) {
            issues.push(issue(format!("questions[{i}].id"), "must be unique"));
        }
        if q.text.trim().is_empty() {
            issues.push(issue(format!("questions[{i}].text"), "must not be empty"));
        }
        if q.correct_answers.is_empty() {
            issues.push(issue(
                format!("questions[{i}].correctAnswers"),
                "must not be empty",
            ));
        }

        match q.question_type {
            QuestionType::Text => {
                if !q.options.is_empty() {
                    issues.push(issue(
                        format!("questions[{i}].options"),
                        "must be empty for a text question",
                    ));
                }
                for (k, answer) in q.correct_answers.iter().enumerate() {
                    if answer.trim().is_empty() {
                        issues.push(issue(
                            format!("questions[{i}].correctAnswers[{k}]"),
                            "must not be empty",
                        ));
                    } else if answer.trim() != answer.as_str() || answer.to_lowercase() != *answer {
                        issues.push(issue(
                            format!("questions[{i}].correctAnswers[{k}]"),
                            "must be lowercase and trimmed",
                        ));
                    }
                }
            }
            QuestionType::MultipleChoice | QuestionType::TrueFalse => {
                if q.options.len() < 2 {
                    issues.push(issue(
                        format!("questions[{i}].options"),
                        "must contain at least 2 options",
                    ));
                }
                let mut option_ids = HashSet::new();
                for (j, opt) in q.options.iter().enumerate() {
                    if opt.id.trim().is_empty() || opt.text.trim().is_empty() {
                        issues.push(issue(
                            format!("questions[{i}].options[{j}]"),
                            "id/text must not be empty",
                        ));
                    }
                    if !option_ids.insert(opt.id.as_str()) {
                        issues.push(issue(
                            format!("questions[{i}].options[{j}].id"),
                            "must be unique",
                        ));
                    }
                }
                if q.question_type == QuestionType::TrueFalse && q.correct_answers.len() > 1 {
                    issues.push(issue(
                        format!("questions[{i}].correctAnswers"),
                        "must hold exactly one option for true/false",
                    ));
                }
                let mut seen = HashSet::new();
                for (k, id) in q.correct_answers.iter().enumerate() {
                    if !seen.insert(id.as_str()) {
                        issues.push(issue(
                            format!("questions[{i}].correctAnswers[{k}]"),
                            "must be unique",
                        ));
                    }
                    if !q.has_option(id) {
                        issues.push(issue(
                            format!("questions[{i}].correctAnswers[{k}]"),
                            "must reference existing option id",
                        ));
                    }
                }
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}
