//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::model::{Collection, CollectionFeature, ExtractedRow, Section};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{CollectionRecord, RunRecord, RunStatus};
use crate::HarvestError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

const COLLECTION_COLUMNS: &str = "id, collection_key, title, category_name, category_id,
     database_name, publication_year, record_count, feature, collection_group, description,
     native_culture_id, source_info, source_created, source_updated, is_yearbook,
     can_save_image, navigation_levels, created_at, updated_at";

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, status";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        let conn = init_database(path)?;
        conn.execute_batch(
            "
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;
        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunStatus::Failed),
    })
}

fn collection_from_row(row: &Row<'_>) -> rusqlite::Result<CollectionRecord> {
    let feature: Option<String> = row.get(8)?;
    let navigation_levels: Option<String> = row.get(17)?;

    Ok(CollectionRecord {
        id: row.get(0)?,
        collection: Collection {
            key: row.get(1)?,
            title: row.get(2)?,
            category_name: row.get(3)?,
            category_id: row.get(4)?,
            database_name: row.get(5)?,
            publication_year: row.get(6)?,
            record_count: row.get(7)?,
            feature: feature.as_deref().and_then(CollectionFeature::from_db_string),
            collection_group: row.get(9)?,
            description: row.get(10)?,
            native_culture_id: row.get(11)?,
            source_info: row.get(12)?,
            source_created: row.get(13)?,
            source_updated: row.get(14)?,
            is_yearbook: row.get(15)?,
            can_save_image: row.get(16)?,
            navigation_levels: navigation_levels
                .as_deref()
                .map(Collection::parse_navigation_levels),
        },
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
    })
}

/// Writes one observation, keeping stored values for attributes it lacks
fn upsert_collection_on(conn: &Connection, collection: &Collection) -> StorageResult<i64> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO collections (
            collection_key, title, category_name, category_id, database_name,
            publication_year, record_count, feature, collection_group, description,
            native_culture_id, source_info, source_created, source_updated, is_yearbook,
            can_save_image, navigation_levels, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?18)
         ON CONFLICT(collection_key) DO UPDATE SET
            title = COALESCE(excluded.title, collections.title),
            category_name = COALESCE(excluded.category_name, collections.category_name),
            category_id = COALESCE(excluded.category_id, collections.category_id),
            database_name = COALESCE(excluded.database_name, collections.database_name),
            publication_year = COALESCE(excluded.publication_year, collections.publication_year),
            record_count = COALESCE(excluded.record_count, collections.record_count),
            feature = COALESCE(excluded.feature, collections.feature),
            collection_group = COALESCE(excluded.collection_group, collections.collection_group),
            description = COALESCE(excluded.description, collections.description),
            native_culture_id = COALESCE(excluded.native_culture_id, collections.native_culture_id),
            source_info = COALESCE(excluded.source_info, collections.source_info),
            source_created = COALESCE(excluded.source_created, collections.source_created),
            source_updated = COALESCE(excluded.source_updated, collections.source_updated),
            is_yearbook = COALESCE(excluded.is_yearbook, collections.is_yearbook),
            can_save_image = COALESCE(excluded.can_save_image, collections.can_save_image),
            navigation_levels = COALESCE(excluded.navigation_levels, collections.navigation_levels),
            updated_at = excluded.updated_at",
        params![
            collection.key,
            collection.title,
            collection.category_name,
            collection.category_id,
            collection.database_name,
            collection.publication_year,
            collection.record_count,
            collection.feature.map(|f| f.to_db_string()),
            collection.collection_group,
            collection.description,
            collection.native_culture_id,
            collection.source_info,
            collection.source_created,
            collection.source_updated,
            collection.is_yearbook,
            collection.can_save_image,
            collection.navigation_levels_db(),
            now,
        ],
    )?;

    let id = conn.query_row(
        "SELECT id FROM collections WHERE collection_key = ?1",
        params![collection.key],
        |row| row.get(0),
    )?;
    Ok(id)
}

fn insert_sections(
    conn: &Connection,
    collection_id: i64,
    parent_id: Option<i64>,
    depth: usize,
    sections: &[Section],
) -> StorageResult<usize> {
    let mut written = 0;
    for (position, section) in sections.iter().enumerate() {
        conn.execute(
            "INSERT INTO sections
             (collection_id, parent_id, depth, position, value, label, description, has_children)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                collection_id,
                parent_id,
                depth as i64,
                position as i64,
                section.value,
                section.label,
                section.description,
                section.has_children,
            ],
        )?;
        let id = conn.last_insert_rowid();
        written += 1 + insert_sections(conn, collection_id, Some(id), depth + 1, &section.children)?;
    }
    Ok(written)
}

struct SectionRow {
    id: i64,
    section: Section,
}

fn build_tree(
    parent: Option<i64>,
    by_parent: &mut HashMap<Option<i64>, Vec<SectionRow>>,
) -> Vec<Section> {
    let rows = by_parent.remove(&parent).unwrap_or_default();
    rows.into_iter()
        .map(|row| {
            let mut section = row.section;
            section.children = build_tree(Some(row.id), by_parent);
            section
        })
        .collect()
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self, status: Option<RunStatus>) -> StorageResult<Option<RunRecord>> {
        let run = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {} FROM runs WHERE status = ?1 ORDER BY id DESC LIMIT 1",
                    RUN_COLUMNS
                );
                self.conn
                    .query_row(&sql, params![status.to_db_string()], run_from_row)
                    .optional()?
            }
            None => {
                let sql = format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS);
                self.conn.query_row(&sql, [], run_from_row).optional()?
            }
        };
        Ok(run)
    }

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let finished_at = if status == RunStatus::Running {
            None
        } else {
            Some(now)
        };
        let changed = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), finished_at, run_id],
        )?;
        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn complete_run(&mut self, run_id: i64) -> StorageResult<()> {
        self.update_run_status(run_id, RunStatus::Completed)
    }

    fn count_runs_by_status(&self, status: RunStatus) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM runs WHERE status = ?1",
            params![status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Collections =====

    fn upsert_collection(&mut self, collection: &Collection) -> StorageResult<i64> {
        upsert_collection_on(&self.conn, collection)
    }

    fn upsert_collections(&mut self, collections: &[Collection]) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        for collection in collections {
            upsert_collection_on(&tx, collection)?;
        }
        tx.commit()?;
        Ok(collections.len())
    }

    fn get_collection(&self, key: &str) -> StorageResult<Option<CollectionRecord>> {
        let sql = format!(
            "SELECT {} FROM collections WHERE collection_key = ?1",
            COLLECTION_COLUMNS
        );
        let record = self
            .conn
            .query_row(&sql, params![key], collection_from_row)
            .optional()?;
        Ok(record)
    }

    fn list_collections(&self) -> StorageResult<Vec<CollectionRecord>> {
        let sql = format!(
            "SELECT {} FROM collections ORDER BY collection_key",
            COLLECTION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map([], collection_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn count_collections(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM collections", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Section Trees =====

    fn replace_sections(&mut self, key: &str, sections: &[Section]) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO collections (collection_key, created_at, updated_at)
             VALUES (?1, ?2, ?2)",
            params![key, now],
        )?;
        let collection_id: i64 = tx.query_row(
            "SELECT id FROM collections WHERE collection_key = ?1",
            params![key],
            |row| row.get(0),
        )?;

        tx.execute(
            "DELETE FROM sections WHERE collection_id = ?1",
            params![collection_id],
        )?;
        let written = insert_sections(&tx, collection_id, None, 1, sections)?;

        tx.execute(
            "UPDATE collections SET updated_at = ?1 WHERE id = ?2",
            params![now, collection_id],
        )?;
        tx.commit()?;

        Ok(written)
    }

    fn get_sections(&self, key: &str) -> StorageResult<Vec<Section>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.parent_id, s.value, s.label, s.description, s.has_children
             FROM sections s
             JOIN collections c ON c.id = s.collection_id
             WHERE c.collection_key = ?1
             ORDER BY s.depth, s.position",
        )?;

        let rows = stmt
            .query_map(params![key], |row| {
                let parent_id: Option<i64> = row.get(1)?;
                let mut section = Section::new(row.get::<_, String>(2)?, row.get::<_, String>(3)?);
                section.description = row.get(4)?;
                section.has_children = row.get(5)?;
                Ok((
                    parent_id,
                    SectionRow {
                        id: row.get(0)?,
                        section,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut by_parent: HashMap<Option<i64>, Vec<SectionRow>> = HashMap::new();
        for (parent_id, row) in rows {
            by_parent.entry(parent_id).or_default().push(row);
        }

        Ok(build_tree(None, &mut by_parent))
    }

    fn count_sections(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sections", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Row Tables =====

    fn append_rows(&mut self, table: &str, rows: &[ExtractedRow]) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO row_tables (name, created_at) VALUES (?1, ?2)",
            params![table, now],
        )?;

        let mut inserted = 0;
        for row in rows {
            let data = serde_json::to_string(row)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            inserted += tx.execute(
                "INSERT OR IGNORE INTO extracted_rows (table_name, fingerprint, data, captured_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![table, row.fingerprint(), data, now],
            )?;
        }

        tx.commit()?;
        Ok(inserted)
    }

    fn get_rows(&self, table: &str) -> StorageResult<Vec<ExtractedRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT data FROM extracted_rows WHERE table_name = ?1 ORDER BY id")?;

        let raw = stmt
            .query_map(params![table], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        raw.iter()
            .map(|data| {
                serde_json::from_str(data).map_err(|e| StorageError::Serialization(e.to_string()))
            })
            .collect()
    }

    fn count_rows(&self, table: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM extracted_rows WHERE table_name = ?1",
            params![table],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn list_row_tables(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.name, COUNT(r.id)
             FROM row_tables t
             LEFT JOIN extracted_rows r ON r.table_name = t.name
             GROUP BY t.name
             ORDER BY t.name",
        )?;

        let tables = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as u64)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tables)
    }
}

/// Initializes or opens a database at the given path
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(Connection)` - Successfully opened/created database
/// * `Err(rusqlite::Error)` - Failed to open database
pub fn init_database(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
    ",
    )?;

    initialize_schema(&conn)?;

    Ok(conn)
}
