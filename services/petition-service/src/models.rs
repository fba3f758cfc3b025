use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::config::PaginationConfig;
use crate::errors::PetitionError;

// ============================================================================
// PETITIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Petition {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub goal: i64,
    pub votes_in_favor: i64,
    pub votes_against: i64,
    pub voting_deadline: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Petition {
    /// Build a fresh petition from a validated request
    pub fn from_request(request: NewPetition) -> Self {
        let now = Utc::now();
        Petition {
            id: Uuid::new_v4(),
            owner_id: request.owner_id,
            title: request.title,
            description: request.description,
            goal: request.goal,
            votes_in_favor: 0,
            votes_against: 0,
            voting_deadline: request.voting_deadline,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn total_votes(&self) -> i64 {
        self.votes_in_favor + self.votes_against
    }

    pub fn goal_reached(&self) -> bool {
        self.total_votes() >= self.goal
    }

    pub fn voting_closed_at(&self, now: DateTime<Utc>) -> bool {
        now > self.voting_deadline
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Petition creation request, as handed over by the HTTP layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPetition {
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub goal: i64,
    pub voting_deadline: DateTime<Utc>,
}

impl NewPetition {
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), PetitionError> {
        if self.title.trim().is_empty() {
            return Err(PetitionError::Validation("title is required".to_string()));
        }
        if self.description.trim().is_empty() {
            return Err(PetitionError::Validation("description is required".to_string()));
        }
        if self.goal < 1 {
            return Err(PetitionError::Validation("goal must be at least 1".to_string()));
        }
        if self.voting_deadline <= now {
            return Err(PetitionError::Validation(
                "voting deadline must be in the future".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// VOTES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Favor,
    Against,
}

impl VoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::Favor => "favor",
            VoteType::Against => "against",
        }
    }
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VoteType {
    type Err = PetitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "favor" => Ok(VoteType::Favor),
            "against" => Ok(VoteType::Against),
            other => Err(PetitionError::InvalidVoteType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PetitionVote {
    pub id: Uuid,
    pub voter_id: Uuid,
    pub petition_id: Uuid,
    pub vote_type: VoteType,
    pub created_at: DateTime<Utc>,
}

impl PetitionVote {
    pub fn new(voter_id: Uuid, petition_id: Uuid, vote_type: VoteType) -> Self {
        PetitionVote {
            id: Uuid::new_v4(),
            voter_id,
            petition_id,
            vote_type,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// LISTINGS
// ============================================================================

/// A resolved listing request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRequest {
    /// Every live petition
    All,
    /// A window of the listing; `page` is set when `offset` is a multiple of `limit`
    Page {
        limit: i64,
        offset: i64,
        page: Option<i64>,
    },
}

impl PageRequest {
    /// Apply defaults and bounds to the caller's optional limit/offset
    pub fn resolve(
        limit: Option<i64>,
        offset: Option<i64>,
        config: &PaginationConfig,
    ) -> Result<Self, PetitionError> {
        if let Some(offset) = offset {
            if offset < 0 {
                return Err(PetitionError::Validation("offset must not be negative".to_string()));
            }
        }
        if let Some(limit) = limit {
            if limit < 1 {
                return Err(PetitionError::Validation("limit must be at least 1".to_string()));
            }
        }

        let limit = match (limit, offset) {
            (None, None) => return Ok(PageRequest::All),
            (Some(limit), _) => limit.min(config.max_page_size),
            (None, Some(_)) => config.default_page_size,
        };
        let offset = offset.unwrap_or(0);
        let page = (offset % limit == 0).then(|| offset / limit + 1);

        Ok(PageRequest::Page {
            limit,
            offset,
            page,
        })
    }
}
