//! Bounded, newest-first record of past script generations.

use crate::params::ScriptParams;
use crate::storage::KeyValueStore;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

pub const HISTORY_KEY: &str = "ps_history";
pub const MAX_HISTORY_ITEMS: usize = 50;

/// One stored generation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub params: ScriptParams,
    pub content: String,
}

impl HistoryItem {
    pub fn new(params: ScriptParams, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: now_millis(),
            params,
            content,
        }
    }

    pub fn created_at(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.timestamp) * 1_000_000).ok()
    }
}

pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

pub struct HistoryStore<S: KeyValueStore> {
    storage: S,
    items: Vec<HistoryItem>,
    capacity: usize,
}

impl<S: KeyValueStore> HistoryStore<S> {
    /// Reads the persisted collection. Unreadable or corrupt data is logged
    /// and replaced by an empty history.
    pub fn load(storage: S) -> Self {
        Self::with_capacity(storage, MAX_HISTORY_ITEMS)
    }

    pub fn with_capacity(storage: S, capacity: usize) -> Self {
        let mut items = read_items(&storage);
        items.truncate(capacity);
        debug!("Loaded {} history item(s)", items.len());
        Self {
            storage,
            items,
            capacity,
        }
    }

    pub fn items(&self) -> &[HistoryItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, id: &str) -> Option<&HistoryItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Finds an item by full id or by a prefix that matches exactly one id.
    pub fn find(&self, id_or_prefix: &str) -> Option<&HistoryItem> {
        if let Some(item) = self.get(id_or_prefix) {
            return Some(item);
        }
        if id_or_prefix.is_empty() {
            return None;
        }

        let mut matches = self
            .items
            .iter()
            .filter(|item| item.id.starts_with(id_or_prefix));
        match (matches.next(), matches.next()) {
            (Some(item), None) => Some(item),
            _ => None,
        }
    }

    /// Prepends `item`, evicts the oldest entries beyond capacity and
    /// persists the result.
    pub fn insert(&mut self, item: HistoryItem) -> Result<()> {
        self.items.insert(0, item);
        if self.items.len() > self.capacity {
            let evicted = self.items.len() - self.capacity;
            self.items.truncate(self.capacity);
            debug!("Evicted {} history item(s) beyond capacity", evicted);
        }
        self.persist()
    }

    /// Removes the item with `id`. Returns `false` (and writes nothing) when
    /// no such item exists.
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        if self.items.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Copies out the stored snapshot without touching the store.
    pub fn restore(&self, id: &str) -> Option<(ScriptParams, String)> {
        self.get(id)
            .map(|item| (item.params.clone(), item.content.clone()))
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn persist(&mut self) -> Result<()> {
        let json = serde_json::to_string(&self.items).context("Failed to serialize history")?;
        self.storage
            .set(HISTORY_KEY, &json)
            .context("Failed to persist history")
    }
}

fn read_items<S: KeyValueStore>(storage: &S) -> Vec<HistoryItem> {
    let raw = match storage.get(HISTORY_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(err) => {
            warn!("Failed to read history, starting empty: {:#}", err);
            return Vec::new();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(items) => items,
        Err(err) => {
            warn!("Failed to parse history, starting empty: {}", err);
            Vec::new()
        }
    }
}
