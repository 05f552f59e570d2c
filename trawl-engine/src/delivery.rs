//! Read-only delivery digest
//!
//! Ranked list of analysis packs for a persona, as consumed by the periodic
//! delivery channel. `skip` and failed packs are excluded; at equal score a
//! full-tier pack ranks ahead of a lite one.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use trawl_common::models::{ActionLabel, Tier};

use crate::error::PipelineResult;
use crate::store::SqliteStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryEntry {
    pub item_id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub score: f64,
    pub action: Option<ActionLabel>,
    pub tier: Tier,
    pub summary_short: Option<String>,
    pub suggested_angle: Option<String>,
}

/// Top `limit` deliverable packs updated within `window_hours` of `now`
pub async fn delivery_digest(
    store: &SqliteStore,
    persona_id: &str,
    window_hours: u32,
    limit: usize,
    now: DateTime<Utc>,
) -> PipelineResult<Vec<DeliveryEntry>> {
    let since = now - Duration::hours(i64::from(window_hours));
    let packs = store.deliverable_packs(persona_id, since, limit).await?;

    let mut entries = Vec::with_capacity(packs.len());
    for pack in packs {
        let item = store.get_item(&pack.item_id).await?;
        entries.push(DeliveryEntry {
            title: item.as_ref().map(|i| i.title.clone()),
            url: item.map(|i| i.url),
            score: pack.overall_score.unwrap_or(0.0),
            action: pack.action,
            tier: pack.tier,
            summary_short: pack.summary_short,
            suggested_angle: pack.suggested_angle,
            item_id: pack.item_id,
        });
    }
    Ok(entries)
}
