//! SQLite persistence behind explicit repository interfaces
//!
//! Every write is a keyed upsert on natural uniqueness and retries on
//! "database is locked" (see [`crate::utils::retry_on_lock`]). Analysis packs
//! escalate lite to full and never regress: the upsert refuses to replace a
//! full-tier row with a lite-tier one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use trawl_common::models::{
    ActionLabel, AnalysisPack, CandidateItem, ComposedOutput, Draft, FactorBreakdown,
    HeuristicScore, TokenUsage,
};
use trawl_common::time::{from_millis, to_millis};
use trawl_common::{Error, Result};

use crate::utils::retry_on_lock;

/// Default upper bound on lock retries per write
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// Keyed persistence of one record type
#[async_trait]
pub trait Repository<K, R>: Send + Sync
where
    K: Send + Sync,
    R: Send + Sync,
{
    /// Insert or replace the record stored under `key`
    async fn save_or_update(&self, key: &K, record: &R) -> Result<()>;

    async fn find(&self, key: &K) -> Result<Option<R>>;
}

/// Natural key of an analysis pack
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackKey {
    pub item_id: String,
    pub persona_id: String,
}

impl PackKey {
    pub fn new(item_id: &str, persona_id: &str) -> Self {
        Self {
            item_id: item_id.to_string(),
            persona_id: persona_id.to_string(),
        }
    }

    pub fn of(pack: &AnalysisPack) -> Self {
        Self::new(&pack.item_id, &pack.persona_id)
    }
}

/// Natural key of a heuristic score
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScoreKey {
    pub item_id: String,
    pub persona_id: String,
    pub version: String,
}

impl ScoreKey {
    pub fn of(score: &HeuristicScore) -> Self {
        Self {
            item_id: score.item_id.clone(),
            persona_id: score.persona_id.clone(),
            version: score.version.clone(),
        }
    }
}

/// Candidate item plus the ingest-derived keys
#[derive(Debug, Clone, PartialEq)]
pub struct StoredItem {
    pub item: CandidateItem,
    /// SHA-256 of guid-or-canonical-url
    pub dedup_key: String,
    /// SHA-256 of normalized title and text head
    pub content_hash: String,
    pub fetched_at: DateTime<Utc>,
}

/// Outcome of one source fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Ok,
    Failed,
}

impl FetchStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Failed => "failed",
        }
    }
}

/// SQLite-backed store shared by every pipeline stage
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn with_max_lock_wait(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ========================================================================
    // Items
    // ========================================================================

    /// Insert an item unless its id or dedup key is already stored
    ///
    /// Returns `true` when a new row was written. Feeds that reuse short ids
    /// (`"1"`, `"2"`) collide on the primary key; the first delivery wins.
    pub async fn insert_item(&self, stored: &StoredItem) -> Result<bool> {
        let item = &stored.item;
        let published_at = to_millis(item.published_at);
        let fetched_at = to_millis(stored.fetched_at);
        let word_count = item.word_count.map(i64::from);

        retry_on_lock("insert_item", self.max_lock_wait_ms, || async {
            let result = sqlx::query(
                r#"
                INSERT INTO items (
                    id, dedup_key, source_id, title, url, guid, published_at,
                    language, word_count, source_domain, text, content_hash,
                    is_duplicate, fetched_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(&item.id)
            .bind(&stored.dedup_key)
            .bind(&item.source_id)
            .bind(&item.title)
            .bind(&item.url)
            .bind(&item.guid)
            .bind(published_at)
            .bind(&item.language)
            .bind(word_count)
            .bind(&item.source_domain)
            .bind(&item.text)
            .bind(&stored.content_hash)
            .bind(item.is_duplicate)
            .bind(fetched_at)
            .execute(&self.pool)
            .await?;

            Ok(result.rows_affected() > 0)
        })
        .await
    }

    /// True when another source already delivered content with this fingerprint
    pub async fn content_seen_from_other_source(
        &self,
        content_hash: &str,
        source_id: &str,
    ) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM items WHERE content_hash = ? AND source_id != ?",
        )
        .bind(content_hash)
        .bind(source_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn get_item(&self, id: &str) -> Result<Option<CandidateItem>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", ITEM_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(item_from_row).transpose()
    }

    /// Items published at or after `since`, newest first
    pub async fn items_published_since(&self, since: DateTime<Utc>) -> Result<Vec<CandidateItem>> {
        let rows = sqlx::query(&format!(
            "{} WHERE published_at >= ? ORDER BY published_at DESC, id ASC",
            ITEM_SELECT
        ))
        .bind(to_millis(since))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(item_from_row).collect()
    }

    // ========================================================================
    // Source fetches
    // ========================================================================

    pub async fn record_source_fetch(
        &self,
        source_id: &str,
        status: FetchStatus,
        item_count: usize,
        error: Option<&str>,
    ) -> Result<()> {
        let now = to_millis(trawl_common::time::now());
        let item_count = item_count as i64;

        retry_on_lock("record_source_fetch", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO source_fetches (source_id, last_fetch_at, last_status, item_count, error)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(source_id) DO UPDATE SET
                    last_fetch_at = excluded.last_fetch_at,
                    last_status = excluded.last_status,
                    item_count = excluded.item_count,
                    error = excluded.error
                "#,
            )
            .bind(source_id)
            .bind(now)
            .bind(status.as_str())
            .bind(item_count)
            .bind(error)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    /// Most recent successful fetch among `source_ids`
    pub async fn latest_successful_fetch(
        &self,
        source_ids: &[String],
    ) -> Result<Option<DateTime<Utc>>> {
        let mut latest: Option<i64> = None;
        for source_id in source_ids {
            let at: Option<i64> = sqlx::query_scalar(
                "SELECT last_fetch_at FROM source_fetches WHERE source_id = ? AND last_status = 'ok'",
            )
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await?;
            latest = latest.max(at);
        }
        Ok(latest.map(from_millis))
    }

    // ========================================================================
    // Analysis pack queries
    // ========================================================================

    /// Existing packs for `item_ids`, keyed by item id
    pub async fn packs_for_items(
        &self,
        persona_id: &str,
        item_ids: &[String],
    ) -> Result<HashMap<String, AnalysisPack>> {
        let mut packs = HashMap::new();
        for item_id in item_ids {
            if let Some(pack) = self.find(&PackKey::new(item_id, persona_id)).await? {
                packs.insert(item_id.clone(), pack);
            }
        }
        Ok(packs)
    }

    /// `(item_id, topic)` of done packs updated at or after `since`, newest first
    pub async fn recent_topics(
        &self,
        persona_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query(
            r#"
            SELECT item_id, topic FROM analysis_packs
            WHERE persona_id = ? AND status = 'done' AND topic IS NOT NULL AND updated_at >= ?
            ORDER BY updated_at DESC, item_id ASC
            "#,
        )
        .bind(persona_id)
        .bind(to_millis(since))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Ok((row.try_get("item_id")?, row.try_get("topic")?)))
            .collect()
    }

    /// Done packs updated at or after `since`, best score first
    ///
    /// With `action`, only packs carrying that label are returned. Ties break
    /// on recency then item id.
    pub async fn top_packs(
        &self,
        persona_id: &str,
        since: DateTime<Utc>,
        action: Option<ActionLabel>,
        limit: usize,
    ) -> Result<Vec<AnalysisPack>> {
        let rows = sqlx::query(&format!(
            r#"{}
            WHERE persona_id = ? AND status = 'done' AND overall_score IS NOT NULL
              AND updated_at >= ? AND (? IS NULL OR action = ?)
            ORDER BY overall_score DESC, updated_at DESC, item_id ASC
            LIMIT ?
            "#,
            PACK_SELECT
        ))
        .bind(persona_id)
        .bind(to_millis(since))
        .bind(action.map(|a| a.as_str()))
        .bind(action.map(|a| a.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(pack_from_row).collect()
    }

    /// Packs worth delivering: done, not `skip`, full tier ahead of lite on ties
    pub async fn deliverable_packs(
        &self,
        persona_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<AnalysisPack>> {
        let rows = sqlx::query(&format!(
            r#"{}
            WHERE persona_id = ? AND status = 'done' AND overall_score IS NOT NULL
              AND (action IS NULL OR action != 'skip') AND updated_at >= ?
            ORDER BY overall_score DESC, CASE tier WHEN 'full' THEN 0 ELSE 1 END ASC, item_id ASC
            LIMIT ?
            "#,
            PACK_SELECT
        ))
        .bind(persona_id)
        .bind(to_millis(since))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(pack_from_row).collect()
    }

    /// Heuristic scores recorded under one weight version
    pub async fn scores_for_version(
        &self,
        persona_id: &str,
        version: &str,
    ) -> Result<Vec<HeuristicScore>> {
        let rows = sqlx::query(
            r#"
            SELECT item_id, persona_id, version, score, breakdown, computed_at
            FROM heuristic_scores WHERE persona_id = ? AND version = ?
            ORDER BY score DESC, item_id ASC
            "#,
        )
        .bind(persona_id)
        .bind(version)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(score_from_row).collect()
    }
}

// ============================================================================
// Repositories
// ============================================================================

#[async_trait]
impl Repository<ScoreKey, HeuristicScore> for SqliteStore {
    async fn save_or_update(&self, key: &ScoreKey, record: &HeuristicScore) -> Result<()> {
        let breakdown = serde_json::to_string(&record.breakdown)?;
        let computed_at = to_millis(record.computed_at);

        retry_on_lock("save_heuristic_score", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO heuristic_scores (item_id, persona_id, version, score, breakdown, computed_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(item_id, persona_id, version) DO UPDATE SET
                    score = excluded.score,
                    breakdown = excluded.breakdown,
                    computed_at = excluded.computed_at
                "#,
            )
            .bind(&key.item_id)
            .bind(&key.persona_id)
            .bind(&key.version)
            .bind(record.score)
            .bind(&breakdown)
            .bind(computed_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn find(&self, key: &ScoreKey) -> Result<Option<HeuristicScore>> {
        let row = sqlx::query(
            r#"
            SELECT item_id, persona_id, version, score, breakdown, computed_at
            FROM heuristic_scores WHERE item_id = ? AND persona_id = ? AND version = ?
            "#,
        )
        .bind(&key.item_id)
        .bind(&key.persona_id)
        .bind(&key.version)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(score_from_row).transpose()
    }
}

#[async_trait]
impl Repository<PackKey, AnalysisPack> for SqliteStore {
    /// Upsert; a lite record never replaces a full one
    async fn save_or_update(&self, key: &PackKey, record: &AnalysisPack) -> Result<()> {
        let dimension_scores = serde_json::to_string(&record.dimension_scores)?;
        let reasons = serde_json::to_string(&record.reasons)?;
        let key_points = serde_json::to_string(&record.key_points)?;
        let quotes = serde_json::to_string(&record.quotes)?;
        let action = record.action.map(|a| a.as_str());
        let updated_at = to_millis(record.updated_at);
        let prompt_tokens = record.usage.prompt_tokens as i64;
        let completion_tokens = record.usage.completion_tokens as i64;

        retry_on_lock("save_analysis_pack", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO analysis_packs (
                    item_id, persona_id, tier, status, topic, summary_short, summary_long,
                    dimension_scores, overall_score, action, reasons, suggested_angle,
                    key_points, quotes, model, prompt_version, prompt_tokens,
                    completion_tokens, error, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(item_id, persona_id) DO UPDATE SET
                    tier = excluded.tier,
                    status = excluded.status,
                    topic = excluded.topic,
                    summary_short = excluded.summary_short,
                    summary_long = excluded.summary_long,
                    dimension_scores = excluded.dimension_scores,
                    overall_score = excluded.overall_score,
                    action = excluded.action,
                    reasons = excluded.reasons,
                    suggested_angle = excluded.suggested_angle,
                    key_points = excluded.key_points,
                    quotes = excluded.quotes,
                    model = excluded.model,
                    prompt_version = excluded.prompt_version,
                    prompt_tokens = excluded.prompt_tokens,
                    completion_tokens = excluded.completion_tokens,
                    error = excluded.error,
                    updated_at = excluded.updated_at
                WHERE analysis_packs.tier != 'full' OR excluded.tier = 'full'
                "#,
            )
            .bind(&key.item_id)
            .bind(&key.persona_id)
            .bind(record.tier.as_str())
            .bind(record.status.as_str())
            .bind(&record.topic)
            .bind(&record.summary_short)
            .bind(&record.summary_long)
            .bind(&dimension_scores)
            .bind(record.overall_score)
            .bind(action)
            .bind(&reasons)
            .bind(&record.suggested_angle)
            .bind(&key_points)
            .bind(&quotes)
            .bind(&record.model)
            .bind(&record.prompt_version)
            .bind(prompt_tokens)
            .bind(completion_tokens)
            .bind(&record.error)
            .bind(updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn find(&self, key: &PackKey) -> Result<Option<AnalysisPack>> {
        let row = sqlx::query(&format!("{} WHERE item_id = ? AND persona_id = ?", PACK_SELECT))
            .bind(&key.item_id)
            .bind(&key.persona_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(pack_from_row).transpose()
    }
}

#[async_trait]
impl Repository<Uuid, Draft> for SqliteStore {
    async fn save_or_update(&self, key: &Uuid, record: &Draft) -> Result<()> {
        let id = key.to_string();
        let item_ids = serde_json::to_string(&record.item_ids)?;
        let output = record.output.as_ref().map(serde_json::to_string).transpose()?;
        let created_at = to_millis(record.created_at);
        let updated_at = to_millis(record.updated_at);

        retry_on_lock("save_draft", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO drafts (
                    id, persona_id, platform, merge_strategy, item_ids, commentary,
                    status, output, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    commentary = excluded.commentary,
                    status = excluded.status,
                    output = excluded.output,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&id)
            .bind(&record.persona_id)
            .bind(record.platform.as_str())
            .bind(record.merge_strategy.as_str())
            .bind(&item_ids)
            .bind(&record.commentary)
            .bind(record.status.as_str())
            .bind(&output)
            .bind(created_at)
            .bind(updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn find(&self, key: &Uuid) -> Result<Option<Draft>> {
        let row = sqlx::query(
            r#"
            SELECT id, persona_id, platform, merge_strategy, item_ids, commentary,
                   status, output, created_at, updated_at
            FROM drafts WHERE id = ?
            "#,
        )
        .bind(key.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(draft_from_row).transpose()
    }
}

// ============================================================================
// Row mapping
// ============================================================================

const ITEM_SELECT: &str = r#"
    SELECT id, source_id, title, url, guid, published_at, language, word_count,
           source_domain, text, is_duplicate
    FROM items"#;

const PACK_SELECT: &str = r#"
    SELECT item_id, persona_id, tier, status, topic, summary_short, summary_long,
           dimension_scores, overall_score, action, reasons, suggested_angle,
           key_points, quotes, model, prompt_version, prompt_tokens,
           completion_tokens, error, updated_at
    FROM analysis_packs"#;

fn item_from_row(row: &SqliteRow) -> Result<CandidateItem> {
    let word_count: Option<i64> = row.try_get("word_count")?;
    Ok(CandidateItem {
        id: row.try_get("id")?,
        source_id: row.try_get("source_id")?,
        title: row.try_get("title")?,
        url: row.try_get("url")?,
        guid: row.try_get("guid")?,
        published_at: from_millis(row.try_get("published_at")?),
        language: row.try_get("language")?,
        word_count: word_count.and_then(|wc| u32::try_from(wc).ok()),
        source_domain: row.try_get("source_domain")?,
        text: row.try_get("text")?,
        is_duplicate: row.try_get("is_duplicate")?,
    })
}

fn score_from_row(row: &SqliteRow) -> Result<HeuristicScore> {
    let breakdown: String = row.try_get("breakdown")?;
    let breakdown: FactorBreakdown = serde_json::from_str(&breakdown)?;
    Ok(HeuristicScore {
        item_id: row.try_get("item_id")?,
        persona_id: row.try_get("persona_id")?,
        version: row.try_get("version")?,
        score: row.try_get("score")?,
        breakdown,
        computed_at: from_millis(row.try_get("computed_at")?),
    })
}

fn pack_from_row(row: &SqliteRow) -> Result<AnalysisPack> {
    let tier: String = row.try_get("tier")?;
    let status: String = row.try_get("status")?;
    let action: Option<String> = row.try_get("action")?;
    let dimension_scores: String = row.try_get("dimension_scores")?;
    let reasons: String = row.try_get("reasons")?;
    let key_points: String = row.try_get("key_points")?;
    let quotes: String = row.try_get("quotes")?;
    let prompt_tokens: i64 = row.try_get("prompt_tokens")?;
    let completion_tokens: i64 = row.try_get("completion_tokens")?;

    Ok(AnalysisPack {
        item_id: row.try_get("item_id")?,
        persona_id: row.try_get("persona_id")?,
        tier: tier.parse()?,
        status: status.parse()?,
        topic: row.try_get("topic")?,
        summary_short: row.try_get("summary_short")?,
        summary_long: row.try_get("summary_long")?,
        dimension_scores: serde_json::from_str::<BTreeMap<String, f64>>(&dimension_scores)?,
        overall_score: row.try_get("overall_score")?,
        action: action.map(|a| a.parse::<ActionLabel>()).transpose()?,
        reasons: serde_json::from_str(&reasons)?,
        suggested_angle: row.try_get("suggested_angle")?,
        key_points: serde_json::from_str(&key_points)?,
        quotes: serde_json::from_str(&quotes)?,
        model: row.try_get("model")?,
        prompt_version: row.try_get("prompt_version")?,
        usage: TokenUsage {
            prompt_tokens: prompt_tokens.max(0) as u64,
            completion_tokens: completion_tokens.max(0) as u64,
        },
        error: row.try_get("error")?,
        updated_at: from_millis(row.try_get("updated_at")?),
    })
}

fn draft_from_row(row: &SqliteRow) -> Result<Draft> {
    let id: String = row.try_get("id")?;
    let platform: String = row.try_get("platform")?;
    let merge_strategy: String = row.try_get("merge_strategy")?;
    let status: String = row.try_get("status")?;
    let item_ids: String = row.try_get("item_ids")?;
    let output: Option<String> = row.try_get("output")?;

    Ok(Draft {
        id: Uuid::parse_str(&id)
            .map_err(|e| Error::InvalidInput(format!("bad draft id {}: {}", id, e)))?,
        persona_id: row.try_get("persona_id")?,
        platform: platform.parse()?,
        merge_strategy: merge_strategy.parse()?,
        item_ids: serde_json::from_str(&item_ids)?,
        commentary: row.try_get("commentary")?,
        status: status.parse()?,
        output: output
            .as_deref()
            .map(serde_json::from_str::<ComposedOutput>)
            .transpose()?,
        created_at: from_millis(row.try_get("created_at")?),
        updated_at: from_millis(row.try_get("updated_at")?),
    })
}
