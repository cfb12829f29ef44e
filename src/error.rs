use crate::models::{QuestionId, QuestionType, ValidationIssue};
use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("exam {exam_id} is malformed ({} issues)", .issues.len())]
    Invalid {
        exam_id: String,
        issues: Vec<ValidationIssue>,
    },
    #[error("exam id {0} is declared twice")]
    Duplicate(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("question {0} is not part of this exam")]
    UnknownQuestion(QuestionId),
    #[error("question {question_id} expects a {expected} answer")]
    AnswerShape {
        question_id: QuestionId,
        expected: &'static str,
    },
    #[error("{option:?} is not an option of question {question_id}")]
    UnknownOption {
        question_id: QuestionId,
        option: String,
    },
    #[error("{option:?} is selected more than once for question {question_id}")]
    DuplicateOption {
        question_id: QuestionId,
        option: String,
    },
    #[error("question {question_id} is {q_type:?}, not multiple-select")]
    NotMultipleSelect {
        question_id: QuestionId,
        q_type: QuestionType,
    },
    #[error("submission has not been requested")]
    SubmitNotRequested,
    #[error("session is already submitted")]
    Closed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub field: String,
    pub issue: String,
}

impl From<ValidationIssue> for ErrorDetail {
    fn from(issue: ValidationIssue) -> Self {
        Self {
            field: issue.field,
            issue: issue.issue,
        }
    }
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

    pub fn unauthorized(request_id: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "not logged in", request_id)
    }

    pub fn session(err: SessionError, request_id: impl Into<String>) -> Self {
        let (status, code) = match &err {
            SessionError::UnknownQuestion(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            SessionError::AnswerShape { .. }
            | SessionError::UnknownOption { .. }
            | SessionError::DuplicateOption { .. }
            | SessionError::NotMultipleSelect { .. } => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            SessionError::SubmitNotRequested | SessionError::Closed => (StatusCode::CONFLICT, "CONFLICT"),
        };
        Self::new(status, code, err.to_string(), request_id)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_errors_map_to_statuses() {
        let err = AppError::session(SessionError::UnknownQuestion(9), "r1");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert!(err.message.contains("question 9"));

        let err = AppError::session(SessionError::Closed, "r2");
        assert_eq!(err.status, StatusCode::CONFLICT);

        let err = AppError::session(
            SessionError::AnswerShape { question_id: 2, expected: "list" },
            "r3",
        );
        assert_eq!(err.code, "VALIDATION_ERROR");
        assert_eq!(err.message, "question 2 expects a list answer");
    }
}
