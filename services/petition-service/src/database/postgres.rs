use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgPoolOptions};
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::{PetitionStore, TallyCallback, VoteTransaction};
use crate::config::DatabaseConfig;
use crate::errors::{StoreError, StoreResult};
use crate::models::{Petition, PetitionVote, VoteType};

pub type DbPool = Pool<Postgres>;

const PETITION_COLUMNS: &str = "id, owner_id, title, description, goal, votes_in_favor, \
     votes_against, voting_deadline, deleted_at, created_at, updated_at";

// Increments refuse to push a petition past its goal
const INCREMENT_FAVOR: &str = r#"
    UPDATE petitions
    SET votes_in_favor = votes_in_favor + 1,
        updated_at = NOW()
    WHERE id = $1
      AND deleted_at IS NULL
      AND votes_in_favor + votes_against < goal
"#;

const INCREMENT_AGAINST: &str = r#"
    UPDATE petitions
    SET votes_against = votes_against + 1,
        updated_at = NOW()
    WHERE id = $1
      AND deleted_at IS NULL
      AND votes_in_favor + votes_against < goal
"#;

pub async fn create_pool(config: &DatabaseConfig) -> StoreResult<DbPool> {
    info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(&config.url)
        .await?;

    info!("Database connection pool created successfully");

    // Test the connection
    sqlx::query("SELECT 1").fetch_one(&pool).await?;

    info!("Database connection verified");

    Ok(pool)
}

/// Map constraint violations onto store errors
fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::DuplicateVote;
        }
        if db.is_foreign_key_violation() {
            return StoreError::NotFound;
        }
    }
    StoreError::Database(err)
}

async fn increment_on(
    conn: &mut PgConnection,
    petition_id: Uuid,
    vote_type: VoteType,
) -> StoreResult<()> {
    let sql = match vote_type {
        VoteType::Favor => INCREMENT_FAVOR,
        VoteType::Against => INCREMENT_AGAINST,
    };

    let result = sqlx::query(sql).bind(petition_id).execute(&mut *conn).await?;
    if result.rows_affected() == 1 {
        return Ok(());
    }

    let live: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM petitions WHERE id = $1 AND deleted_at IS NULL")
            .bind(petition_id)
            .fetch_optional(&mut *conn)
            .await?;

    match live {
        Some(_) => Err(StoreError::GoalReached),
        None => Err(StoreError::NotFound),
    }
}

/// Tally writes bound to an open transaction
struct PgVoteTransaction<'c> {
    conn: &'c mut PgConnection,
}

#[async_trait]
impl<'c> VoteTransaction for PgVoteTransaction<'c> {
    async fn increment_tally(&mut self, petition_id: Uuid, vote_type: VoteType) -> StoreResult<()> {
        increment_on(&mut *self.conn, petition_id, vote_type).await
    }
}

#[derive(Clone)]
pub struct PgPetitionStore {
    pool: DbPool,
}

impl PgPetitionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PetitionStore for PgPetitionStore {
    async fn create(&self, petition: &Petition) -> StoreResult<Petition> {
        let sql = format!(
            r#"
            INSERT INTO petitions ({columns})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {columns}
            "#,
            columns = PETITION_COLUMNS
        );

        let created = sqlx::query_as::<_, Petition>(&sql)
            .bind(petition.id)
            .bind(petition.owner_id)
            .bind(&petition.title)
            .bind(&petition.description)
            .bind(petition.goal)
            .bind(petition.votes_in_favor)
            .bind(petition.votes_against)
            .bind(petition.voting_deadline)
            .bind(petition.deleted_at)
            .bind(petition.created_at)
            .bind(petition.updated_at)
            .fetch_one(&self.pool)
            .await?;

        debug!("Inserted petition {}", created.id);
        Ok(created)
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Petition> {
        let sql = format!(
            "SELECT {} FROM petitions WHERE id = $1 AND deleted_at IS NULL",
            PETITION_COLUMNS
        );

        sqlx::query_as::<_, Petition>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn get_all_paginated(
        &self,
        limit: Option<i64>,
        offset: i64,
    ) -> StoreResult<Vec<Petition>> {
        // LIMIT NULL is no limit
        let sql = format!(
            r#"
            SELECT {}
            FROM petitions
            WHERE deleted_at IS NULL
            ORDER BY created_at DESC, id
            LIMIT $1 OFFSET $2
            "#,
            PETITION_COLUMNS
        );

        let petitions = sqlx::query_as::<_, Petition>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(petitions)
    }

    async fn has_voted(&self, voter_id: Uuid, petition_id: Uuid) -> StoreResult<bool> {
        let row: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM petition_votes
                WHERE voter_id = $1 AND petition_id = $2
            )
            "#,
        )
        .bind(voter_id)
        .bind(petition_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    async fn vote_in_favor(&self, petition_id: Uuid) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await?;
        increment_on(&mut conn, petition_id, VoteType::Favor).await
    }

    async fn vote_against(&self, petition_id: Uuid) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await?;
        increment_on(&mut conn, petition_id, VoteType::Against).await
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE petitions
            SET deleted_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn vote_with_transaction(
        &self,
        vote: PetitionVote,
        callback: TallyCallback,
    ) -> StoreResult<PetitionVote> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO petition_votes (id, voter_id, petition_id, vote_type, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(vote.id)
        .bind(vote.voter_id)
        .bind(vote.petition_id)
        .bind(vote.vote_type.as_str())
        .bind(vote.created_at)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        // Dropping `tx` on error rolls the insert back
        {
            let mut scope = PgVoteTransaction { conn: &mut *tx };
            callback(&mut scope).await?;
        }

        tx.commit().await?;

        debug!(
            "Committed {} vote by {} on petition {}",
            vote.vote_type, vote.voter_id, vote.petition_id
        );
        Ok(vote)
    }
}
