//! `PostgresTierStore` - Production Storage
//!
//! `TigerStyle`: Real database storage with explicit schema.
//!
//! # Schema
//!
//! Five logical tables, each keyed by (agent_id, user_id) plus a natural key:
//!
//! ```sql
//! episodic_memory      (id PK)
//! discovered_patterns  (agent_id, user_id, category, description PK)
//! memory_evolution_log (agent_id, user_id, generation PK)
//! memory_access_audit  (id PK)
//! memory_sharing_rules (id PK)
//! ```
//!
//! Time-range predicates use the `created_at` index; content search is a
//! case-insensitive substring match over the JSON-encoded content column.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use super::audit::{AuditEntry, SharingRule};
use super::backend::{TierStore, TypeAggregate};
use super::episode::{Episode, EpisodeType, MemoryTier};
use super::error::{StoreError, StoreResult};
use super::evolution_log::EvolutionLogEntry;
use super::pattern::{DiscoveredPattern, PatternCategory};
use super::query::EpisodeQuery;

// =============================================================================
// PostgresTierStore
// =============================================================================

/// PostgreSQL tier store for production use.
///
/// `TigerStyle`: Connection pooling, explicit schema, proper error handling.
#[derive(Clone, Debug)]
pub struct PostgresTierStore {
    pool: PgPool,
}

impl PostgresTierStore {
    /// Create a new `PostgresTierStore` with a connection string.
    ///
    /// # Errors
    /// Returns an error if the connection fails or the schema cannot be
    /// initialized.
    pub async fn new(connection_string: &str) -> StoreResult<Self> {
        // Preconditions
        assert!(
            !connection_string.is_empty(),
            "connection string cannot be empty"
        );
        assert!(
            connection_string.starts_with("postgres://")
                || connection_string.starts_with("postgresql://"),
            "connection string must be a postgres URL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(connection_string)
            .await
            .map_err(|e| StoreError::connection(format!("failed to connect: {e}")))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create from an existing pool.
    ///
    /// Useful when sharing a pool across components.
    pub async fn from_pool(pool: PgPool) -> StoreResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Initialize the database schema.
    async fn init_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS episodic_memory (
                id TEXT PRIMARY KEY,
                agent_id BIGINT NOT NULL,
                user_id TEXT NOT NULL,
                session_id TEXT,
                tier TEXT NOT NULL,
                episode_type TEXT NOT NULL,
                content JSONB NOT NULL DEFAULT 'null',
                context JSONB NOT NULL DEFAULT 'null',
                importance DOUBLE PRECISION NOT NULL,
                satisfaction DOUBLE PRECISION,
                promoted_to_semantic BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_episodic_owner
                ON episodic_memory(agent_id, user_id);
            CREATE INDEX IF NOT EXISTS idx_episodic_created
                ON episodic_memory(created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_episodic_type
                ON episodic_memory(episode_type);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::internal(format!("failed to create episodic schema: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS discovered_patterns (
                agent_id BIGINT NOT NULL,
                user_id TEXT NOT NULL,
                category TEXT NOT NULL,
                descriptor TEXT NOT NULL,
                description TEXT NOT NULL,
                confidence DOUBLE PRECISION NOT NULL,
                support BIGINT NOT NULL,
                parameters JSONB NOT NULL DEFAULT '{}',
                discovered_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (agent_id, user_id, category, description)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::internal(format!("failed to create patterns schema: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memory_access_audit (
                id TEXT PRIMARY KEY,
                agent_id BIGINT NOT NULL,
                user_id TEXT NOT NULL,
                operation TEXT NOT NULL,
                context_id TEXT NOT NULL,
                target_context_id TEXT,
                allowed BOOLEAN NOT NULL,
                reason TEXT NOT NULL,
                occurred_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_audit_owner
                ON memory_access_audit(agent_id, user_id, occurred_at DESC);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::internal(format!("failed to create audit schema: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memory_sharing_rules (
                id TEXT PRIMARY KEY,
                from_context_id TEXT NOT NULL,
                to_context_id TEXT NOT NULL,
                operations JSONB NOT NULL DEFAULT '[]',
                allow_access BOOLEAN NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                expires_at TIMESTAMPTZ
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::internal(format!("failed to create rules schema: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memory_evolution_log (
                agent_id BIGINT NOT NULL,
                user_id TEXT NOT NULL,
                generation BIGINT NOT NULL,
                reason TEXT NOT NULL,
                strategies_changed JSONB NOT NULL DEFAULT '[]',
                average_fitness DOUBLE PRECISION NOT NULL,
                occurred_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (agent_id, user_id, generation)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::internal(format!("failed to create evolution schema: {e}")))?;

        Ok(())
    }

    /// Get the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close all connections in the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Classify a sqlx error into the store error taxonomy.
fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut => StoreError::timeout(0),
        sqlx::Error::Io(io) => StoreError::connection(io.to_string()),
        other => StoreError::query(other.to_string()),
    }
}

// =============================================================================
// Row Mapping
// =============================================================================

fn row_to_episode(row: &PgRow) -> StoreResult<Episode> {
    let tier_str: String = row
        .try_get("tier")
        .map_err(|e| StoreError::internal(e.to_string()))?;
    let tier = MemoryTier::parse(&tier_str)
        .ok_or_else(|| StoreError::internal(format!("invalid tier: {tier_str}")))?;

    let type_str: String = row
        .try_get("episode_type")
        .map_err(|e| StoreError::internal(e.to_string()))?;
    let episode_type = EpisodeType::parse(&type_str)
        .ok_or_else(|| StoreError::internal(format!("invalid episode type: {type_str}")))?;

    Ok(Episode {
        id: row
            .try_get("id")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        agent_id: row
            .try_get("agent_id")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        user_id: row
            .try_get("user_id")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        session_id: row
            .try_get("session_id")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        tier,
        episode_type,
        content: row
            .try_get("content")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        context: row
            .try_get("context")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        importance: row
            .try_get("importance")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        satisfaction: row
            .try_get("satisfaction")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        promoted_to_semantic: row
            .try_get("promoted_to_semantic")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StoreError::internal(e.to_string()))?,
    })
}

fn row_to_pattern(row: &PgRow) -> StoreResult<DiscoveredPattern> {
    let category_str: String = row
        .try_get("category")
        .map_err(|e| StoreError::internal(e.to_string()))?;
    let category = PatternCategory::parse(&category_str)
        .ok_or_else(|| StoreError::internal(format!("invalid category: {category_str}")))?;

    Ok(DiscoveredPattern {
        agent_id: row
            .try_get("agent_id")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        user_id: row
            .try_get("user_id")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        category,
        descriptor: row
            .try_get("descriptor")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        description: row
            .try_get("description")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        confidence: row
            .try_get("confidence")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        support: row
            .try_get::<i64, _>("support")
            .map_err(|e| StoreError::internal(e.to_string()))? as u64,
        parameters: row
            .try_get("parameters")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        discovered_at: row
            .try_get("discovered_at")
            .map_err(|e| StoreError::internal(e.to_string()))?,
    })
}

fn row_to_audit(row: &PgRow) -> StoreResult<AuditEntry> {
    Ok(AuditEntry {
        id: row
            .try_get("id")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        agent_id: row
            .try_get("agent_id")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        user_id: row
            .try_get("user_id")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        operation: row
            .try_get("operation")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        context_id: row
            .try_get("context_id")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        target_context_id: row
            .try_get("target_context_id")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        allowed: row
            .try_get("allowed")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        reason: row
            .try_get("reason")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        occurred_at: row
            .try_get("occurred_at")
            .map_err(|e| StoreError::internal(e.to_string()))?,
    })
}

fn row_to_rule(row: &PgRow) -> StoreResult<SharingRule> {
    let operations_json: serde_json::Value = row
        .try_get("operations")
        .map_err(|e| StoreError::internal(e.to_string()))?;
    // Defensive parse: malformed persisted JSON degrades to an empty list
    let operations: Vec<String> = serde_json::from_value(operations_json).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "malformed operations list in sharing rule, using empty");
        Vec::new()
    });

    Ok(SharingRule {
        id: row
            .try_get("id")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        from_context_id: row
            .try_get("from_context_id")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        to_context_id: row
            .try_get("to_context_id")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        operations,
        allow: row
            .try_get("allow_access")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        expires_at: row
            .try_get("expires_at")
            .map_err(|e| StoreError::internal(e.to_string()))?,
    })
}

fn row_to_evolution_entry(row: &PgRow) -> StoreResult<EvolutionLogEntry> {
    let changed_json: serde_json::Value = row
        .try_get("strategies_changed")
        .map_err(|e| StoreError::internal(e.to_string()))?;
    let strategies_changed: Vec<String> =
        serde_json::from_value(changed_json).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "malformed strategies list in evolution log, using empty");
            Vec::new()
        });

    Ok(EvolutionLogEntry {
        agent_id: row
            .try_get("agent_id")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        user_id: row
            .try_get("user_id")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        generation: row
            .try_get::<i64, _>("generation")
            .map_err(|e| StoreError::internal(e.to_string()))? as u64,
        reason: row
            .try_get("reason")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        strategies_changed,
        average_fitness: row
            .try_get("average_fitness")
            .map_err(|e| StoreError::internal(e.to_string()))?,
        occurred_at: row
            .try_get("occurred_at")
            .map_err(|e| StoreError::internal(e.to_string()))?,
    })
}

// =============================================================================
// TierStore impl
// =============================================================================

#[async_trait]
impl TierStore for PostgresTierStore {
    #[tracing::instrument(skip(self, episode), fields(episode_id = %episode.id))]
    async fn insert_episode(&self, episode: &Episode) -> StoreResult<String> {
        sqlx::query(
            r#"
            INSERT INTO episodic_memory
                (id, agent_id, user_id, session_id, tier, episode_type,
                 content, context, importance, satisfaction,
                 promoted_to_semantic, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&episode.id)
        .bind(episode.agent_id)
        .bind(&episode.user_id)
        .bind(&episode.session_id)
        .bind(episode.tier.as_str())
        .bind(episode.episode_type.as_str())
        .bind(&episode.content)
        .bind(&episode.context)
        .bind(episode.importance)
        .bind(episode.satisfaction)
        .bind(episode.promoted_to_semantic)
        .bind(episode.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(episode.id.clone())
    }

    async fn get_episode(&self, id: &str) -> StoreResult<Option<Episode>> {
        let row = sqlx::query("SELECT * FROM episodic_memory WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.as_ref().map(row_to_episode).transpose()
    }

    #[tracing::instrument(skip(self, query), fields(agent_id = query.agent_id))]
    async fn query_episodes(&self, query: &EpisodeQuery) -> StoreResult<Vec<Episode>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM episodic_memory
            WHERE agent_id = $1
              AND user_id = $2
              AND importance >= $3
              AND ($4::text IS NULL OR session_id = $4)
              AND ($5::text IS NULL OR episode_type = $5)
              AND ($6::timestamptz IS NULL OR created_at >= $6)
              AND ($7::timestamptz IS NULL OR created_at < $7)
              AND ($8 OR promoted_to_semantic = FALSE)
            ORDER BY created_at DESC, id ASC
            LIMIT $9
            "#,
        )
        .bind(query.agent_id)
        .bind(&query.user_id)
        .bind(query.min_importance)
        .bind(&query.session_id)
        .bind(query.episode_type.map(|t| t.as_str().to_string()))
        .bind(query.since)
        .bind(query.until)
        .bind(query.include_promoted)
        .bind(query.limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(row_to_episode).collect()
    }

    async fn search_episodes(
        &self,
        agent_id: i64,
        user_id: &str,
        needle: &str,
        limit: usize,
    ) -> StoreResult<Vec<Episode>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM episodic_memory
            WHERE agent_id = $1
              AND user_id = $2
              AND content::text ILIKE '%' || $3 || '%'
            ORDER BY created_at DESC, id ASC
            LIMIT $4
            "#,
        )
        .bind(agent_id)
        .bind(user_id)
        .bind(needle)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(row_to_episode).collect()
    }

    async fn mark_promoted(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE episodic_memory
            SET promoted_to_semantic = TRUE
            WHERE id = $1 AND promoted_to_semantic = FALSE
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Distinguish "already promoted" from "missing"
        let exists = sqlx::query("SELECT 1 FROM episodic_memory WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .is_some();

        if exists {
            Ok(false)
        } else {
            Err(StoreError::not_found(id))
        }
    }

    async fn count_episodes(&self, agent_id: i64, user_id: &str) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM episodic_memory WHERE agent_id = $1 AND user_id = $2",
        )
        .bind(agent_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(count as u64)
    }

    async fn count_promoted(&self, agent_id: i64, user_id: &str) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM episodic_memory
            WHERE agent_id = $1 AND user_id = $2 AND promoted_to_semantic = TRUE
            "#,
        )
        .bind(agent_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(count as u64)
    }

    async fn count_foreign_records(
        &self,
        agent_id: i64,
        user_id: &str,
        tier: MemoryTier,
    ) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM episodic_memory
            WHERE agent_id = $1 AND tier = $3 AND user_id != $2
            "#,
        )
        .bind(agent_id)
        .bind(user_id)
        .bind(tier.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(count as u64)
    }

    async fn type_aggregates(
        &self,
        agent_id: i64,
        user_id: &str,
    ) -> StoreResult<Vec<TypeAggregate>> {
        let rows = sqlx::query(
            r#"
            SELECT episode_type,
                   COUNT(*) AS count,
                   AVG(importance) AS avg_importance,
                   AVG(satisfaction) AS avg_satisfaction
            FROM episodic_memory
            WHERE agent_id = $1 AND user_id = $2
            GROUP BY episode_type
            ORDER BY episode_type
            "#,
        )
        .bind(agent_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|row| {
                let type_str: String = row
                    .try_get("episode_type")
                    .map_err(|e| StoreError::internal(e.to_string()))?;
                let episode_type = EpisodeType::parse(&type_str).ok_or_else(|| {
                    StoreError::internal(format!("invalid episode type: {type_str}"))
                })?;

                Ok(TypeAggregate {
                    episode_type,
                    count: row
                        .try_get::<i64, _>("count")
                        .map_err(|e| StoreError::internal(e.to_string()))?
                        as u64,
                    avg_importance: row
                        .try_get("avg_importance")
                        .map_err(|e| StoreError::internal(e.to_string()))?,
                    avg_satisfaction: row
                        .try_get("avg_satisfaction")
                        .map_err(|e| StoreError::internal(e.to_string()))?,
                })
            })
            .collect()
    }

    async fn upsert_pattern(&self, pattern: &DiscoveredPattern) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO discovered_patterns
                (agent_id, user_id, category, descriptor, description,
                 confidence, support, parameters, discovered_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (agent_id, user_id, category, description)
            DO UPDATE SET
                descriptor = EXCLUDED.descriptor,
                confidence = EXCLUDED.confidence,
                support = EXCLUDED.support,
                parameters = EXCLUDED.parameters,
                discovered_at = EXCLUDED.discovered_at
            "#,
        )
        .bind(pattern.agent_id)
        .bind(&pattern.user_id)
        .bind(pattern.category.as_str())
        .bind(&pattern.descriptor)
        .bind(&pattern.description)
        .bind(pattern.confidence)
        .bind(pattern.support as i64)
        .bind(&pattern.parameters)
        .bind(pattern.discovered_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn list_patterns(
        &self,
        agent_id: i64,
        user_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<DiscoveredPattern>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM discovered_patterns
            WHERE agent_id = $1 AND user_id = $2
            ORDER BY confidence DESC, description ASC
            LIMIT $3
            "#,
        )
        .bind(agent_id)
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(row_to_pattern).collect()
    }

    async fn count_patterns(&self, agent_id: i64, user_id: &str) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM discovered_patterns WHERE agent_id = $1 AND user_id = $2",
        )
        .bind(agent_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(count as u64)
    }

    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO memory_access_audit
                (id, agent_id, user_id, operation, context_id,
                 target_context_id, allowed, reason, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.agent_id)
        .bind(&entry.user_id)
        .bind(&entry.operation)
        .bind(&entry.context_id)
        .bind(&entry.target_context_id)
        .bind(entry.allowed)
        .bind(&entry.reason)
        .bind(entry.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn list_audit(
        &self,
        agent_id: i64,
        user_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<AuditEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM memory_access_audit
            WHERE agent_id = $1 AND user_id = $2
            ORDER BY occurred_at DESC, id ASC
            LIMIT $3
            "#,
        )
        .bind(agent_id)
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(row_to_audit).collect()
    }

    async fn upsert_sharing_rule(&self, rule: &SharingRule) -> StoreResult<()> {
        let operations = serde_json::to_value(&rule.operations)
            .map_err(|e| StoreError::serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO memory_sharing_rules
                (id, from_context_id, to_context_id, operations,
                 allow_access, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                operations = EXCLUDED.operations,
                allow_access = EXCLUDED.allow_access,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.from_context_id)
        .bind(&rule.to_context_id)
        .bind(&operations)
        .bind(rule.allow)
        .bind(rule.created_at)
        .bind(rule.expires_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn list_sharing_rules(&self, limit: usize) -> StoreResult<Vec<SharingRule>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM memory_sharing_rules
            ORDER BY created_at DESC, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(row_to_rule).collect()
    }

    async fn append_evolution_log(&self, entry: &EvolutionLogEntry) -> StoreResult<()> {
        let strategies = serde_json::to_value(&entry.strategies_changed)
            .map_err(|e| StoreError::serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO memory_evolution_log
                (agent_id, user_id, generation, reason, strategies_changed,
                 average_fitness, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (agent_id, user_id, generation) DO UPDATE SET
                reason = EXCLUDED.reason,
                strategies_changed = EXCLUDED.strategies_changed,
                average_fitness = EXCLUDED.average_fitness,
                occurred_at = EXCLUDED.occurred_at
            "#,
        )
        .bind(entry.agent_id)
        .bind(&entry.user_id)
        .bind(entry.generation as i64)
        .bind(&entry.reason)
        .bind(&strategies)
        .bind(entry.average_fitness)
        .bind(entry.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn list_evolution_log(
        &self,
        agent_id: i64,
        user_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<EvolutionLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM memory_evolution_log
            WHERE agent_id = $1 AND user_id = $2
            ORDER BY generation DESC
            LIMIT $3
            "#,
        )
        .bind(agent_id)
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(row_to_evolution_entry).collect()
    }

    async fn clear(&self) -> StoreResult<()> {
        for table in [
            "episodic_memory",
            "discovered_patterns",
            "memory_access_audit",
            "memory_sharing_rules",
            "memory_evolution_log",
        ] {
            sqlx::query(&format!("TRUNCATE TABLE {table}"))
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }
        Ok(())
    }
}
