//! Creature enrichment for newly created tasks.
//!
//! # Responsibility
//! - Derive a lookup key from the task text.
//! - Resolve the key through a `CreatureLookup` and format the result.
//! - Write the enrichment back to the task without ever failing creation.
//!
//! # Invariants
//! - Enrichment runs once, at creation; edits never re-trigger it.
//! - Any lookup failure leaves the enrichment fields empty.

mod pokeapi;

pub use pokeapi::PokeApiClient;

use crate::model::task::Enrichment;
use crate::store::{TaskPatch, TaskStore};
use async_trait::async_trait;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Fixed stat label abbreviations, in display order.
const STAT_LABELS: &[(&str, &str)] = &[
    ("hp", "HP"),
    ("attack", "Atk"),
    ("defense", "Def"),
    ("special-attack", "SpA"),
    ("special-defense", "SpD"),
    ("speed", "Spd"),
];

/// Structured result of a name lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatureRecord {
    pub name: String,
    /// Category tags in slot order.
    pub types: Vec<String>,
    /// `(stat name, base value)` pairs as returned by the service.
    pub stats: Vec<(String, u32)>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    NotFound(String),
    Http { status: u16 },
    Timeout,
    Transport(String),
    Malformed(String),
}

impl Display for LookupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(key) => write!(f, "no creature named `{key}`"),
            Self::Http { status } => write!(f, "lookup service returned HTTP {status}"),
            Self::Timeout => write!(f, "lookup timed out"),
            Self::Transport(message) => write!(f, "lookup transport error: {message}"),
            Self::Malformed(message) => write!(f, "malformed lookup response: {message}"),
        }
    }
}

impl Error for LookupError {}

/// Read-only name lookup service.
#[async_trait]
pub trait CreatureLookup: Send + Sync {
    /// Resolves a lower-cased name to structured data.
    async fn lookup(&self, key: &str) -> Result<CreatureRecord, LookupError>;
}

/// Returns the lookup key for `text`: its last word, lower-cased.
pub fn lookup_key(text: &str) -> Option<String> {
    text.split_whitespace()
        .last()
        .map(str::to_lowercase)
        .filter(|key| !key.is_empty())
}

/// Formats a lookup record into the task enrichment fields.
pub fn build_enrichment(record: &CreatureRecord) -> Enrichment {
    Enrichment {
        name: capitalize(&record.name),
        types: record
            .types
            .iter()
            .map(|value| capitalize(value))
            .collect::<Vec<_>>()
            .join(", "),
        stat_summary: format_stats(&record.stats),
        image_url: record.image_url.clone().unwrap_or_default(),
    }
}

/// Formats stats as `HP: 35, Atk: 55, ...` using the fixed label table.
///
/// Stats outside the table are skipped; known stats keep table order.
pub fn format_stats(stats: &[(String, u32)]) -> String {
    STAT_LABELS
        .iter()
        .filter_map(|(name, label)| {
            stats
                .iter()
                .find(|(stat, _)| stat == name)
                .map(|(_, value)| format!("{label}: {value}"))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Resolves `key`, returning empty enrichment on any failure.
pub async fn resolve_enrichment(lookup: &dyn CreatureLookup, key: &str) -> Enrichment {
    match lookup.lookup(key).await {
        Ok(record) => {
            info!("event=enrichment_lookup module=enrichment status=ok");
            build_enrichment(&record)
        }
        Err(LookupError::NotFound(_)) => {
            info!("event=enrichment_lookup module=enrichment status=miss");
            Enrichment::default()
        }
        Err(err) => {
            warn!("event=enrichment_lookup module=enrichment status=error error={err}");
            Enrichment::default()
        }
    }
}

/// Looks up `key` and writes the result onto task `id` of `user_id`.
///
/// Nothing is written when the lookup produced no data; write failures
/// (for example the task was deleted meanwhile) are logged and dropped.
pub async fn enrich_task(
    store: Arc<dyn TaskStore>,
    lookup: Arc<dyn CreatureLookup>,
    user_id: String,
    id: String,
    key: String,
) {
    let enrichment = resolve_enrichment(lookup.as_ref(), &key).await;
    if enrichment.is_empty() {
        return;
    }

    let patch = TaskPatch {
        enrichment: Some(enrichment),
        ..TaskPatch::default()
    };
    if let Err(err) = store.update_fields(&user_id, &id, &patch) {
        warn!("event=enrichment_write module=enrichment status=error error={err}");
    }
}
