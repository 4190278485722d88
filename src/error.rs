use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub field: String,
    pub issue: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: ErrorPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ErrorDetail>,
    pub request_id: String,
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Vec<ErrorDetail>,
    pub request_id: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: Vec::new(),
            request_id: request_id.into(),
        }
    }

    pub fn with_details(mut self, details: Vec<ErrorDetail>) -> Self {
        self.details = details;
        self
    }

    pub fn not_found(message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message, request_id)
    }

    pub fn from_attempt(err: AttemptError, request_id: impl Into<String>) -> Self {
        let (status, code) = err.status_and_code();
        let mut app = Self::new(status, code, err.to_string(), request_id);
        if let Some(field) = err.field() {
            app = app.with_details(vec![ErrorDetail {
                field: field.into(),
                issue: err.to_string(),
            }]);
        }
        app
    }

    pub fn from_shuffle(err: ShuffleError, request_id: impl Into<String>) -> Self {
        match err {
            ShuffleError::Empty => Self::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                err.to_string(),
                request_id,
            )
            .with_details(vec![ErrorDetail {
                field: "questions".into(),
                issue: "must contain at least one non-blank question".into(),
            }]),
            ShuffleError::Upstream(_) => Self::new(
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_ERROR",
                err.to_string(),
                request_id,
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let payload = ErrorBody {
            error: ErrorPayload {
                code: self.code,
                message: self.message,
                details: self.details,
                request_id: self.request_id,
            },
        };
        (self.status, Json(payload)).into_response()
    }
}

/// Rejections raised by a running attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptError {
    #[error("attempt already submitted")]
    AlreadySubmitted,
    #[error("attempt was abandoned")]
    Abandoned,
    #[error("question {0} is not part of this quiz")]
    UnknownQuestion(String),
    #[error("option {option_id} does not belong to question {question_id}")]
    UnknownOption { question_id: String, option_id: String },
    #[error("question {question_id} does not accept this kind of answer")]
    AnswerKindMismatch { question_id: String },
    #[error("quiz can only be submitted from the last question")]
    NotOnLastQuestion,
    #[error("submission must be confirmed")]
    NotConfirmed,
    #[error("attempt is no longer running")]
    Closed,
}

impl AttemptError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AttemptError::AlreadySubmitted | AttemptError::Abandoned => {
                (StatusCode::CONFLICT, "CONFLICT")
            }
            AttemptError::UnknownQuestion(_) | AttemptError::UnknownOption { .. } => {
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            AttemptError::AnswerKindMismatch { .. }
            | AttemptError::NotOnLastQuestion
            | AttemptError::NotConfirmed => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AttemptError::Closed => (StatusCode::GONE, "GONE"),
        }
    }

    fn field(&self) -> Option<&'static str> {
        match self {
            AttemptError::UnknownQuestion(_) | AttemptError::AnswerKindMismatch { .. } => {
                Some("questionId")
            }
            AttemptError::UnknownOption { .. } => Some("optionId"),
            AttemptError::NotConfirmed => Some("confirmed"),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShuffleError {
    #[error("no questions provided to shuffle")]
    Empty,
    #[error("question shuffle failed: {0}")]
    Upstream(#[from] anyhow::Error),
}
