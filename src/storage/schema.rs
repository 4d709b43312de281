//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Catalog Harvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track fetch runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- One row per source collection key
CREATE TABLE IF NOT EXISTS collections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collection_key TEXT NOT NULL UNIQUE,
    title TEXT,
    category_name TEXT,
    category_id TEXT,
    database_name TEXT,
    publication_year INTEGER,
    record_count INTEGER,
    feature TEXT,
    collection_group TEXT,
    description TEXT,
    native_culture_id TEXT,
    source_info TEXT,
    source_created TEXT,
    source_updated TEXT,
    is_yearbook INTEGER,
    can_save_image INTEGER,
    navigation_levels TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_collections_feature ON collections(feature);
CREATE INDEX IF NOT EXISTS idx_collections_year ON collections(publication_year);

-- Browse taxonomy, one row per node
CREATE TABLE IF NOT EXISTS sections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
    parent_id INTEGER REFERENCES sections(id) ON DELETE CASCADE,
    depth INTEGER NOT NULL,
    position INTEGER NOT NULL,
    value TEXT NOT NULL,
    label TEXT NOT NULL,
    description TEXT,
    has_children INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_sections_collection ON sections(collection_id);
CREATE INDEX IF NOT EXISTS idx_sections_parent ON sections(parent_id);

-- Named per-collection row tables
CREATE TABLE IF NOT EXISTS row_tables (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

-- Extracted rows, deduplicated by fingerprint within a table
CREATE TABLE IF NOT EXISTS extracted_rows (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name TEXT NOT NULL REFERENCES row_tables(name),
    fingerprint TEXT NOT NULL,
    data TEXT NOT NULL,
    captured_at TEXT NOT NULL,
    UNIQUE(table_name, fingerprint)
);

CREATE INDEX IF NOT EXISTS idx_extracted_rows_table ON extracted_rows(table_name);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
