//! Durable state for the supervisor and registry cache (spec §4.9).
//!
//! Backed by `sqlx`'s `Any` driver so the same query text runs against
//! either SQLite (the default, a file under `<data_dir>/db/`) or a
//! URL-supplied Postgres-compatible database. Sessions with the pool are
//! short; nothing here holds a long-lived row handle.

pub mod record;

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{Any, Pool, Row};
use uuid::Uuid;

use record::{ExternalServerRecord, InstallMethod, PackageRegistryType, RegistryCacheEntry, ServerStatus, TransportType};

#[async_trait]
pub trait PersistenceLayer: Send + Sync {
    async fn insert_server(&self, record: &ExternalServerRecord) -> anyhow::Result<()>;
    async fn update_server(&self, record: &ExternalServerRecord) -> anyhow::Result<()>;
    async fn delete_server(&self, id: &str) -> anyhow::Result<()>;
    async fn get_server(&self, id: &str) -> anyhow::Result<Option<ExternalServerRecord>>;
    async fn get_server_by_namespace(&self, namespace: &str) -> anyhow::Result<Option<ExternalServerRecord>>;
    async fn list_servers(&self) -> anyhow::Result<Vec<ExternalServerRecord>>;

    async fn upsert_cache_entry(&self, entry: &RegistryCacheEntry) -> anyhow::Result<()>;
    async fn get_cache_entry(&self, server_name: &str) -> anyhow::Result<Option<RegistryCacheEntry>>;
}

pub struct SqlxPersistence {
    pool: Pool<Any>,
}

impl SqlxPersistence {
    /// Opens (and, for SQLite, creates) the database at `database_url`, or
    /// falls back to a SQLite file under `<data_dir>/db/tooldock.db`.
    pub async fn connect(database_url: Option<&str>, data_dir: &Path) -> anyhow::Result<Self> {
        sqlx::any::install_default_drivers();
        let url = match database_url {
            Some(url) if !url.trim().is_empty() => url.to_owned(),
            _ => {
                let db_dir = data_dir.join("db");
                std::fs::create_dir_all(&db_dir)?;
                let path = db_dir.join("tooldock.db");
                format!("sqlite://{}?mode=rwc", path.display())
            }
        };
        let pool = AnyPoolOptions::new().max_connections(5).connect(&url).await?;
        let persistence = Self { pool };
        persistence.migrate().await?;
        Ok(persistence)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS external_servers (
                id TEXT PRIMARY KEY,
                namespace TEXT UNIQUE NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS external_registry_cache (
                server_name TEXT PRIMARY KEY
            )",
        )
        .execute(&self.pool)
        .await?;

        // Additive schema: add any column this version needs that an older
        // row-store might be missing. Failures (column already exists) are
        // swallowed; columns are never dropped.
        let server_columns = [
            ("server_name", "TEXT"),
            ("version", "TEXT"),
            ("install_method", "TEXT"),
            ("package_identifier", "TEXT"),
            ("package_registry_type", "TEXT"),
            ("repo_url", "TEXT"),
            ("entrypoint", "TEXT"),
            ("startup_command", "TEXT"),
            ("command_args", "TEXT"),
            ("env_vars", "TEXT"),
            ("config_file", "TEXT"),
            ("transport_type", "TEXT"),
            ("server_url", "TEXT"),
            ("port", "INTEGER"),
            ("venv_path", "TEXT"),
            ("status", "TEXT"),
            ("pid", "INTEGER"),
            ("last_error", "TEXT"),
            ("auto_start", "INTEGER"),
            ("created_at", "TEXT"),
            ("updated_at", "TEXT"),
        ];
        for (column, ty) in server_columns {
            let _ = sqlx::query(&format!("ALTER TABLE external_servers ADD COLUMN {column} {ty}"))
                .execute(&self.pool)
                .await;
        }

        let cache_columns = [
            ("latest_version", "TEXT"),
            ("metadata_json", "TEXT"),
            ("updated_at", "TEXT"),
        ];
        for (column, ty) in cache_columns {
            let _ = sqlx::query(&format!(
                "ALTER TABLE external_registry_cache ADD COLUMN {column} {ty}"
            ))
            .execute(&self.pool)
            .await;
        }

        Ok(())
    }

    fn row_to_record(row: &AnyRow) -> anyhow::Result<ExternalServerRecord> {
        let command_args: String = row.try_get("command_args").unwrap_or_default();
        let env_vars: String = row.try_get("env_vars").unwrap_or_default();
        let created_at: String = row.try_get("created_at").unwrap_or_default();
        let updated_at: String = row.try_get("updated_at").unwrap_or_default();

        Ok(ExternalServerRecord {
            id: row.try_get("id")?,
            namespace: row.try_get("namespace")?,
            server_name: row.try_get("server_name").unwrap_or_default(),
            version: row.try_get("version").ok(),
            install_method: InstallMethod::parse(&row.try_get::<String, _>("install_method").unwrap_or_default())
                .unwrap_or(InstallMethod::Manual),
            package_identifier: row.try_get("package_identifier").ok(),
            package_registry_type: row
                .try_get::<String, _>("package_registry_type")
                .ok()
                .and_then(|s| PackageRegistryType::parse(&s)),
            repo_url: row.try_get("repo_url").ok(),
            entrypoint: row.try_get("entrypoint").ok(),
            startup_command: row.try_get("startup_command").ok(),
            command_args: serde_json::from_str(&command_args).unwrap_or_default(),
            env_vars: serde_json::from_str(&env_vars).unwrap_or_default(),
            config_file: row.try_get("config_file").ok(),
            transport_type: TransportType::parse(&row.try_get::<String, _>("transport_type").unwrap_or_default())
                .unwrap_or(TransportType::Stdio),
            server_url: row.try_get("server_url").ok(),
            port: row.try_get("port").ok(),
            venv_path: row.try_get("venv_path").ok(),
            status: ServerStatus::parse(&row.try_get::<String, _>("status").unwrap_or_default()),
            pid: row.try_get("pid").ok(),
            last_error: row.try_get("last_error").ok(),
            auto_start: row.try_get::<i64, _>("auto_start").unwrap_or(0) != 0,
            created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
            updated_at: updated_at.parse().unwrap_or_else(|_| Utc::now()),
        })
    }
}

#[async_trait]
impl PersistenceLayer for SqlxPersistence {
    async fn insert_server(&self, record: &ExternalServerRecord) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO external_servers (
                id, namespace, server_name, version, install_method, package_identifier,
                package_registry_type, repo_url, entrypoint, startup_command, command_args,
                env_vars, config_file, transport_type, server_url, port, venv_path, status,
                pid, last_error, auto_start, created_at, updated_at
            ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(&record.id)
        .bind(&record.namespace)
        .bind(&record.server_name)
        .bind(&record.version)
        .bind(record.install_method.as_str())
        .bind(&record.package_identifier)
        .bind(record.package_registry_type.map(PackageRegistryType::as_str))
        .bind(&record.repo_url)
        .bind(&record.entrypoint)
        .bind(&record.startup_command)
        .bind(serde_json::to_string(&record.command_args)?)
        .bind(serde_json::to_string(&record.env_vars)?)
        .bind(&record.config_file)
        .bind(record.transport_type.as_str())
        .bind(&record.server_url)
        .bind(record.port)
        .bind(&record.venv_path)
        .bind(record.status.as_str())
        .bind(record.pid)
        .bind(&record.last_error)
        .bind(i64::from(record.auto_start))
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_server(&self, record: &ExternalServerRecord) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE external_servers SET
                server_name=?, version=?, install_method=?, package_identifier=?,
                package_registry_type=?, repo_url=?, entrypoint=?, startup_command=?,
                command_args=?, env_vars=?, config_file=?, transport_type=?, server_url=?,
                port=?, venv_path=?, status=?, pid=?, last_error=?, auto_start=?, updated_at=?
            WHERE id=?",
        )
        .bind(&record.server_name)
        .bind(&record.version)
        .bind(record.install_method.as_str())
        .bind(&record.package_identifier)
        .bind(record.package_registry_type.map(PackageRegistryType::as_str))
        .bind(&record.repo_url)
        .bind(&record.entrypoint)
        .bind(&record.startup_command)
        .bind(serde_json::to_string(&record.command_args)?)
        .bind(serde_json::to_string(&record.env_vars)?)
        .bind(&record.config_file)
        .bind(record.transport_type.as_str())
        .bind(&record.server_url)
        .bind(record.port)
        .bind(&record.venv_path)
        .bind(record.status.as_str())
        .bind(record.pid)
        .bind(&record.last_error)
        .bind(i64::from(record.auto_start))
        .bind(Utc::now().to_rfc3339())
        .bind(&record.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_server(&self, id: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM external_servers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_server(&self, id: &str) -> anyhow::Result<Option<ExternalServerRecord>> {
        let row = sqlx::query("SELECT * FROM external_servers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_record(&r)).transpose()
    }

    async fn get_server_by_namespace(&self, namespace: &str) -> anyhow::Result<Option<ExternalServerRecord>> {
        let row = sqlx::query("SELECT * FROM external_servers WHERE namespace = ?")
            .bind(namespace)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_record(&r)).transpose()
    }

    async fn list_servers(&self) -> anyhow::Result<Vec<ExternalServerRecord>> {
        let rows = sqlx::query("SELECT * FROM external_servers").fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn upsert_cache_entry(&self, entry: &RegistryCacheEntry) -> anyhow::Result<()> {
        let existing = self.get_cache_entry(&entry.server_name).await?;
        if existing.is_some() {
            sqlx::query(
                "UPDATE external_registry_cache SET latest_version=?, metadata_json=?, updated_at=? WHERE server_name=?",
            )
            .bind(&entry.latest_version)
            .bind(serde_json::to_string(&entry.metadata_json)?)
            .bind(entry.updated_at.to_rfc3339())
            .bind(&entry.server_name)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                "INSERT INTO external_registry_cache (server_name, latest_version, metadata_json, updated_at) VALUES (?,?,?,?)",
            )
            .bind(&entry.server_name)
            .bind(&entry.latest_version)
            .bind(serde_json::to_string(&entry.metadata_json)?)
            .bind(entry.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn get_cache_entry(&self, server_name: &str) -> anyhow::Result<Option<RegistryCacheEntry>> {
        let row = sqlx::query("SELECT * FROM external_registry_cache WHERE server_name = ?")
            .bind(server_name)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            None => Ok(None),
            Some(row) => {
                let metadata_json: String = row.try_get("metadata_json").unwrap_or_default();
                let updated_at: String = row.try_get("updated_at").unwrap_or_default();
                Ok(Some(RegistryCacheEntry {
                    server_name: row.try_get("server_name")?,
                    latest_version: row.try_get("latest_version").ok(),
                    metadata_json: serde_json::from_str(&metadata_json).unwrap_or(serde_json::Value::Null),
                    updated_at: updated_at.parse().unwrap_or_else(|_| Utc::now()),
                }))
            }
        }
    }
}

pub fn new_server_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use record::{InstallMethod, ServerStatus, TransportType};

    async fn fresh_store() -> SqlxPersistence {
        let dir = tempfile::tempdir().expect("tempdir");
        SqlxPersistence::connect(None, dir.path()).await.expect("connect")
    }

    fn sample_record() -> ExternalServerRecord {
        let now = Utc::now();
        ExternalServerRecord {
            id: new_server_id(),
            namespace: "weather".to_owned(),
            server_name: "weather-mcp".to_owned(),
            version: None,
            install_method: InstallMethod::Manual,
            package_identifier: None,
            package_registry_type: None,
            repo_url: None,
            entrypoint: None,
            startup_command: Some("weather-server".to_owned()),
            command_args: vec![],
            env_vars: HashMap::new(),
            config_file: None,
            transport_type: TransportType::Stdio,
            server_url: None,
            port: None,
            venv_path: None,
            status: ServerStatus::Stopped,
            pid: None,
            last_error: None,
            auto_start: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn round_trips_a_record() {
        let store = fresh_store().await;
        let record = sample_record();
        store.insert_server(&record).await.unwrap();
        let fetched = store.get_server(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched.namespace, "weather");
        assert_eq!(fetched.status.as_str(), "stopped");
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let store = fresh_store().await;
        let record = sample_record();
        store.insert_server(&record).await.unwrap();
        store.delete_server(&record.id).await.unwrap();
        assert!(store.get_server(&record.id).await.unwrap().is_none());
    }
}
