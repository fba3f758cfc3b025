use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PetitionError>;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures reported by the petition store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Vote already recorded for this voter and petition")]
    DuplicateVote,

    #[error("Petition not found")]
    NotFound,

    #[error("Petition goal already reached")]
    GoalReached,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// User-visible error classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    PolicyViolation,
    Internal,
}

/// Errors returned by the vote coordinator
#[derive(Error, Debug)]
pub enum PetitionError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid vote type: {0:?}")]
    InvalidVoteType(String),

    #[error("Petition not found")]
    NotFound,

    #[error("User has already voted on this petition")]
    AlreadyVoted,

    #[error("Voting is closed for this petition")]
    VotingClosed,

    #[error("Petition goal has been reached")]
    GoalReached,

    #[error("Store failure: {0}")]
    Store(StoreError),
}

impl From<StoreError> for PetitionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => PetitionError::NotFound,
            StoreError::DuplicateVote => PetitionError::AlreadyVoted,
            StoreError::GoalReached => PetitionError::GoalReached,
            other => PetitionError::Store(other),
        }
    }
}

impl PetitionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PetitionError::Validation(_) | PetitionError::InvalidVoteType(_) => {
                ErrorKind::Validation
            }
            PetitionError::NotFound => ErrorKind::NotFound,
            PetitionError::AlreadyVoted => ErrorKind::Conflict,
            PetitionError::VotingClosed | PetitionError::GoalReached => ErrorKind::PolicyViolation,
            PetitionError::Store(_) => ErrorKind::Internal,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            PetitionError::Validation(_) => "validation_error",
            PetitionError::InvalidVoteType(_) => "invalid_vote_type",
            PetitionError::NotFound => "not_found",
            PetitionError::AlreadyVoted => "already_voted",
            PetitionError::VotingClosed => "voting_closed",
            PetitionError::GoalReached => "goal_reached",
            PetitionError::Store(_) => "internal_error",
        }
    }
}

impl ResponseError for PetitionError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        // Store internals stay in the logs
        let error_message = match self {
            PetitionError::Store(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        HttpResponse::build(status_code).json(json!({
            "error": {
                "code": status_code.as_u16(),
                "message": error_message,
                "type": self.error_type()
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::PolicyViolation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
