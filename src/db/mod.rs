//! Database module for SQLite persistence.
//!
//! SQLite is the application's own store; the externally managed Supabase
//! schema is reached only through the sync engine.

mod repository;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Run embedded migrations
    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            email TEXT,
            role TEXT NOT NULL DEFAULT 'standard_user',
            office_id INTEGER,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS offices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // The membership user_id column is TEXT: the schema predates the
    // numeric user ids and lookups compare against the stringified id.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS office_memberships (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            office_id INTEGER NOT NULL,
            UNIQUE (user_id, office_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contacts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            contact_type TEXT NOT NULL,
            first_name TEXT NOT NULL DEFAULT '',
            last_name TEXT NOT NULL DEFAULT '',
            name TEXT,
            email TEXT,
            phone TEXT,
            street_address TEXT,
            city TEXT,
            state TEXT,
            zip_code TEXT,
            notes TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            user_id INTEGER,
            office_id INTEGER,
            has_conflict INTEGER NOT NULL DEFAULT 0,
            conflict_data TEXT,
            last_synced_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS person_details (
            contact_id INTEGER PRIMARY KEY REFERENCES contacts(id),
            birthday TEXT,
            marital_status TEXT,
            spouse_name TEXT,
            facebook_url TEXT,
            pipeline_stage TEXT,
            assignment TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS church_details (
            contact_id INTEGER PRIMARY KEY REFERENCES contacts(id),
            denomination TEXT,
            pastor_name TEXT,
            pastor_email TEXT,
            pastor_phone TEXT,
            congregation_size INTEGER,
            pipeline_stage TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL DEFAULT '',
            description TEXT,
            due_date TEXT,
            completed INTEGER NOT NULL DEFAULT 0,
            person_id INTEGER,
            church_id INTEGER,
            office_id INTEGER,
            assigned_to_id INTEGER,
            created_by_id INTEGER,
            last_synced_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS communications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            comm_type TEXT NOT NULL DEFAULT '',
            subject TEXT,
            message TEXT,
            direction TEXT,
            person_id INTEGER,
            church_id INTEGER,
            office_id INTEGER,
            user_id INTEGER,
            sent_at TEXT,
            last_synced_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_contacts_type ON contacts(contact_type);
        CREATE INDEX IF NOT EXISTS idx_contacts_office ON contacts(office_id);
        CREATE INDEX IF NOT EXISTS idx_contacts_user ON contacts(user_id);
        CREATE INDEX IF NOT EXISTS idx_memberships_user ON office_memberships(user_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_assigned ON tasks(assigned_to_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_created_by ON tasks(created_by_id);
        CREATE INDEX IF NOT EXISTS idx_communications_user ON communications(user_id);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
