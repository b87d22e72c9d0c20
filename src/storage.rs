use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::{BoundingBox, Category, ClassifiedDetection};

/// Session ids are coarse wall-clock stamps, matching the exported filenames.
pub fn new_session_id() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// One persisted detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub class_id: u32,
    pub class_name: String,
    pub category: Category,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Query filter. All conditions are conjunctive; `limit` keeps the newest
/// matching entries.
#[derive(Clone, Debug, Default)]
pub struct LogFilter {
    pub limit: Option<usize>,
    pub classes: Option<Vec<String>>,
    pub category: Option<Category>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl LogFilter {
    fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(classes) = &self.classes {
            if !classes.iter().any(|name| name == &entry.class_name) {
                return false;
            }
        }
        if let Some(category) = self.category {
            if entry.category != category {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.timestamp > until {
                return false;
            }
        }
        true
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogStatistics {
    pub total_detections: u64,
    pub organic_count: u64,
    pub inorganic_count: u64,
    pub organic_percentage: f32,
    pub inorganic_percentage: f32,
    pub class_counts: BTreeMap<String, u64>,
    pub session_id: String,
}

fn statistics_over<'a>(
    entries: impl Iterator<Item = &'a LogEntry>,
    session_id: &str,
) -> LogStatistics {
    let mut total = 0u64;
    let mut organic = 0u64;
    let mut class_counts: BTreeMap<String, u64> = BTreeMap::new();
    for entry in entries {
        total += 1;
        if entry.category == Category::Organic {
            organic += 1;
        }
        *class_counts.entry(entry.class_name.clone()).or_insert(0) += 1;
    }
    let inorganic = total - organic;
    let percent = |count: u64| -> f32 {
        if total == 0 {
            0.0
        } else {
            ((count as f32 / total as f32) * 1000.0).round() / 10.0
        }
    };
    LogStatistics {
        total_detections: total,
        organic_count: organic,
        inorganic_count: inorganic,
        organic_percentage: percent(organic),
        inorganic_percentage: percent(inorganic),
        class_counts,
        session_id: session_id.to_string(),
    }
}

/// Rolling detection log.
///
/// Entries only ever get appended or expire; `clear` starts a new session.
pub trait LogStore: Send {
    fn session_id(&self) -> &str;

    fn append_batch(&mut self, detections: &[ClassifiedDetection]) -> Result<Vec<LogEntry>>;

    /// Matching entries, newest first.
    fn query(&self, filter: &LogFilter) -> Result<Vec<LogEntry>>;

    fn statistics(&self) -> Result<LogStatistics>;

    fn count(&self) -> Result<u64>;

    /// Empty the log and start a new session. Returns the new session id.
    fn clear(&mut self) -> Result<String>;

    /// Drop entries older than the retention window. Returns how many were
    /// removed.
    fn prune(&mut self, retention: Duration) -> Result<u64>;
}

// -------------------- SQLite store --------------------

pub struct SqliteLogStore {
    conn: Connection,
    session_id: String,
}

impl SqliteLogStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let mut store = Self {
            conn,
            session_id: new_session_id(),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS detection_log (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              created_at INTEGER NOT NULL,
              timestamp TEXT NOT NULL,
              session_id TEXT NOT NULL,
              class_id INTEGER NOT NULL,
              class_name TEXT NOT NULL,
              category TEXT NOT NULL,
              confidence REAL NOT NULL,
              x1 REAL NOT NULL,
              y1 REAL NOT NULL,
              x2 REAL NOT NULL,
              y2 REAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_log_created ON detection_log(created_at);
            "#,
        )?;
        Ok(())
    }

    fn read_all_desc(&self) -> Result<Vec<LogEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, timestamp, session_id, class_id, class_name, category,
                   confidence, x1, y1, x2, y2
            FROM detection_log ORDER BY id DESC
            "#,
        )?;
        let mut rows = stmt.query([])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            let timestamp: String = row.get(1)?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| anyhow!("corrupt detection log timestamp: {}", e))?
                .with_timezone(&Utc);
            let category: String = row.get(5)?;
            let class_id: i64 = row.get(3)?;
            entries.push(LogEntry {
                id: row.get(0)?,
                timestamp,
                session_id: row.get(2)?,
                class_id: u32::try_from(class_id)
                    .map_err(|_| anyhow!("corrupt detection log class id {}", class_id))?,
                class_name: row.get(4)?,
                category: category.parse()?,
                confidence: row.get::<_, f64>(6)? as f32,
                bbox: BoundingBox {
                    x1: row.get::<_, f64>(7)? as f32,
                    y1: row.get::<_, f64>(8)? as f32,
                    x2: row.get::<_, f64>(9)? as f32,
                    y2: row.get::<_, f64>(10)? as f32,
                },
            });
        }
        Ok(entries)
    }
}

impl LogStore for SqliteLogStore {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn append_batch(&mut self, detections: &[ClassifiedDetection]) -> Result<Vec<LogEntry>> {
        let now = Utc::now();
        let created_at = now.timestamp();
        let timestamp = now.to_rfc3339();

        let mut entries = Vec::with_capacity(detections.len());
        let tx = self.conn.transaction()?;
        for det in detections {
            tx.execute(
                r#"
                INSERT INTO detection_log(
                    created_at, timestamp, session_id, class_id, class_name,
                    category, confidence, x1, y1, x2, y2
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
                params![
                    created_at,
                    timestamp,
                    self.session_id,
                    det.class_id as i64,
                    det.class_name,
                    det.category.as_str(),
                    det.confidence as f64,
                    det.bbox.x1 as f64,
                    det.bbox.y1 as f64,
                    det.bbox.x2 as f64,
                    det.bbox.y2 as f64,
                ],
            )?;
            entries.push(LogEntry {
                id: tx.last_insert_rowid(),
                timestamp: now,
                session_id: self.session_id.clone(),
                class_id: det.class_id,
                class_name: det.class_name.clone(),
                category: det.category,
                confidence: det.confidence,
                bbox: det.bbox,
            });
        }
        tx.commit()?;
        Ok(entries)
    }

    fn query(&self, filter: &LogFilter) -> Result<Vec<LogEntry>> {
        let limit = filter.limit.unwrap_or(usize::MAX);
        Ok(self
            .read_all_desc()?
            .into_iter()
            .filter(|entry| filter.matches(entry))
            .take(limit)
            .collect())
    }

    fn statistics(&self) -> Result<LogStatistics> {
        let entries = self.read_all_desc()?;
        Ok(statistics_over(entries.iter(), &self.session_id))
    }

    fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM detection_log", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn clear(&mut self) -> Result<String> {
        self.conn.execute("DELETE FROM detection_log", [])?;
        self.session_id = new_session_id();
        Ok(self.session_id.clone())
    }

    fn prune(&mut self, retention: Duration) -> Result<u64> {
        let cutoff = Utc::now().timestamp() - retention.as_secs() as i64;
        let removed = self.conn.execute(
            "DELETE FROM detection_log WHERE created_at < ?1",
            params![cutoff],
        )?;
        Ok(removed as u64)
    }
}

// -------------------- In-memory store --------------------

/// In-memory store for tests and the demo binary.
pub struct InMemoryLogStore {
    entries: Vec<LogEntry>,
    next_id: i64,
    session_id: String,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
            session_id: new_session_id(),
        }
    }
}

impl Default for InMemoryLogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LogStore for InMemoryLogStore {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn append_batch(&mut self, detections: &[ClassifiedDetection]) -> Result<Vec<LogEntry>> {
        let now = Utc::now();
        let mut appended = Vec::with_capacity(detections.len());
        for det in detections {
            let entry = LogEntry {
                id: self.next_id,
                timestamp: now,
                session_id: self.session_id.clone(),
                class_id: det.class_id,
                class_name: det.class_name.clone(),
                category: det.category,
                confidence: det.confidence,
                bbox: det.bbox,
            };
            self.next_id += 1;
            self.entries.push(entry.clone());
            appended.push(entry);
        }
        Ok(appended)
    }

    fn query(&self, filter: &LogFilter) -> Result<Vec<LogEntry>> {
        let limit = filter.limit.unwrap_or(usize::MAX);
        Ok(self
            .entries
            .iter()
            .rev()
            .filter(|entry| filter.matches(entry))
            .take(limit)
            .cloned()
            .collect())
    }

    fn statistics(&self) -> Result<LogStatistics> {
        Ok(statistics_over(self.entries.iter(), &self.session_id))
    }

    fn count(&self) -> Result<u64> {
        Ok(self.entries.len() as u64)
    }

    fn clear(&mut self) -> Result<String> {
        self.entries.clear();
        self.session_id = new_session_id();
        Ok(self.session_id.clone())
    }

    fn prune(&mut self, retention: Duration) -> Result<u64> {
        let retention = chrono::Duration::from_std(retention)
            .map_err(|_| anyhow!("retention out of range"))?;
        let cutoff = Utc::now() - retention;
        let before = self.entries.len();
        self.entries.retain(|entry| entry.timestamp >= cutoff);
        Ok((before - self.entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn classified(class_id: u32, name: &str, category: Category, conf: f32) -> ClassifiedDetection {
        ClassifiedDetection {
            class_id,
            class_name: name.to_string(),
            category,
            confidence: conf,
            bbox: BoundingBox {
                x1: 5.0,
                y1: 5.0,
                x2: 50.0,
                y2: 60.0,
            },
        }
    }

    fn seed(store: &mut dyn LogStore) {
        store
            .append_batch(&[
                classified(0, "bag", Category::Inorganic, 0.91),
                classified(1, "banana_peel", Category::Organic, 0.82),
            ])
            .unwrap();
        store
            .append_batch(&[classified(2, "bottle", Category::Inorganic, 0.77)])
            .unwrap();
    }

    #[test]
    fn in_memory_query_is_newest_first_with_limit() {
        let mut store = InMemoryLogStore::new();
        seed(&mut store);

        let all = store.query(&LogFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].class_name, "bottle");
        assert_eq!(all[2].class_name, "bag");

        let limited = store
            .query(&LogFilter {
                limit: Some(2),
                ..LogFilter::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].class_name, "bottle");
    }

    #[test]
    fn filters_by_class_and_category() {
        let mut store = InMemoryLogStore::new();
        seed(&mut store);

        let organic = store
            .query(&LogFilter {
                category: Some(Category::Organic),
                ..LogFilter::default()
            })
            .unwrap();
        assert_eq!(organic.len(), 1);
        assert_eq!(organic[0].class_name, "banana_peel");

        let named = store
            .query(&LogFilter {
                classes: Some(vec!["bag".to_string(), "bottle".to_string()]),
                ..LogFilter::default()
            })
            .unwrap();
        assert_eq!(named.len(), 2);
    }

    #[test]
    fn statistics_counts_and_percentages() {
        let mut store = InMemoryLogStore::new();
        seed(&mut store);

        let stats = store.statistics().unwrap();
        assert_eq!(stats.total_detections, 3);
        assert_eq!(stats.inorganic_count, 2);
        assert_eq!(stats.organic_count, 1);
        assert_eq!(stats.inorganic_percentage, 66.7);
        assert_eq!(stats.organic_percentage, 33.3);
        assert_eq!(stats.class_counts.get("bag"), Some(&1));
        assert_eq!(stats.session_id, store.session_id());
    }

    #[test]
    fn empty_statistics_are_all_zero() {
        let store = InMemoryLogStore::new();
        let stats = store.statistics().unwrap();
        assert_eq!(stats.total_detections, 0);
        assert_eq!(stats.organic_percentage, 0.0);
        assert_eq!(stats.inorganic_percentage, 0.0);
        assert!(stats.class_counts.is_empty());
    }

    #[test]
    fn clear_starts_a_new_session() {
        let mut store = InMemoryLogStore::new();
        seed(&mut store);
        let old_session = store.session_id().to_string();

        let new_session = store.clear().unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(store.session_id(), new_session);
        // Session ids are second-resolution stamps; equality is possible
        // within the same second, but the log must be empty either way.
        let _ = old_session;
    }

    #[test]
    fn in_memory_prune_expires_old_entries() {
        let mut store = InMemoryLogStore::new();
        seed(&mut store);
        // Backdate the first entry past any retention window.
        store.entries[0].timestamp = Utc::now() - chrono::Duration::days(30);

        let removed = store.prune(Duration::from_secs(60 * 60)).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count().unwrap(), 2);

        let removed = store.prune(Duration::from_secs(60 * 60)).unwrap();
        assert_eq!(removed, 0);
    }

    #[test]
    fn sqlite_round_trip_and_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("ecosort.db");
        let db_path = db_path.to_string_lossy().to_string();

        {
            let mut store = SqliteLogStore::open(&db_path).unwrap();
            seed(&mut store);
            let entries = store.query(&LogFilter::default()).unwrap();
            assert_eq!(entries.len(), 3);
            assert_eq!(entries[0].class_name, "bottle");
            assert_eq!(entries[0].category, Category::Inorganic);
        }

        // Entries persist across reopen; the session id is fresh.
        let store = SqliteLogStore::open(&db_path).unwrap();
        assert_eq!(store.count().unwrap(), 3);
        let stats = store.statistics().unwrap();
        assert_eq!(stats.total_detections, 3);
    }

    #[test]
    fn sqlite_prune_expires_old_entries() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("ecosort.db");
        let mut store = SqliteLogStore::open(&db_path.to_string_lossy()).unwrap();
        seed(&mut store);

        // Backdate one row under the store's nose.
        let old = Utc::now().timestamp() - 60 * 60 * 24 * 30;
        store
            .conn
            .execute(
                "UPDATE detection_log SET created_at = ?1 WHERE id = 1",
                params![old],
            )
            .unwrap();

        let removed = store.prune(Duration::from_secs(60 * 60)).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn sqlite_clear_resets_log() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("ecosort.db");
        let mut store = SqliteLogStore::open(&db_path.to_string_lossy()).unwrap();
        seed(&mut store);

        store.clear().unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.query(&LogFilter::default()).unwrap().is_empty());
    }
}
