//! SQLite-backed steps

use super::{table, Row};
use crate::core::{
    config::StepConfig,
    plugin::{Data, Extract, Load, Plugin, PluginKind, PluginStep, PostProcess, PreProcess, TransformLoad},
    registry::PluginRegistry,
};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Number};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

pub(super) fn register(registry: &mut PluginRegistry) {
    super::add(registry, PluginKind::Extract, "sqlite", |config| {
        Ok(PluginStep::Extract(Arc::new(SqliteRead::from_config(config)?)))
    });
    super::add(registry, PluginKind::Load, "sqlite", |config| {
        Ok(PluginStep::Load(Arc::new(SqliteWrite::from_config(config)?)))
    });
    super::add(registry, PluginKind::TransformLoad, "sqlite", |config| {
        Ok(PluginStep::TransformLoad(Arc::new(SqliteExecute::from_config(config)?)))
    });
    super::add(registry, PluginKind::Pre, "sqlite", |config| {
        Ok(PluginStep::Pre(Arc::new(SqliteExecute::from_config(config)?)))
    });
    super::add(registry, PluginKind::Post, "sqlite", |config| {
        Ok(PluginStep::Post(Arc::new(SqliteExecute::from_config(config)?)))
    });
}

/// Lazily connected database handle
#[derive(Debug)]
struct Database {
    url: String,
    pool: OnceCell<SqlitePool>,
}

impl Database {
    fn new(database: &str) -> Self {
        let url = if database.starts_with("sqlite:") {
            database.to_string()
        } else {
            format!("sqlite:{}", database)
        };
        Self {
            url,
            pool: OnceCell::new(),
        }
    }

    async fn pool(&self) -> Result<&SqlitePool> {
        self.pool
            .get_or_try_init(|| async {
                let options = SqliteConnectOptions::from_str(&self.url)
                    .with_context(|| format!("invalid database url '{}'", self.url))?
                    .create_if_missing(true);
                let pool = SqlitePoolOptions::new()
                    .max_connections(1)
                    .connect_with(options)
                    .await
                    .with_context(|| format!("Failed to connect to database {}", self.url))?;
                Ok::<_, anyhow::Error>(pool)
            })
            .await
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReadOptions {
    database: String,
    query: String,
}

/// Runs a query and returns the result set as rows
#[derive(Debug)]
pub struct SqliteRead {
    id: String,
    database: Database,
    query: String,
}

impl SqliteRead {
    pub fn from_config(config: &StepConfig) -> Result<Self> {
        let options: ReadOptions = config.options()?;
        Ok(Self {
            id: config.step_id().to_string(),
            database: Database::new(&options.database),
            query: options.query,
        })
    }
}

impl Plugin for SqliteRead {
    fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Extract for SqliteRead {
    async fn extract(&self) -> Result<Data> {
        let pool = self.database.pool().await?;
        let rows = sqlx::query(&self.query)
            .fetch_all(pool)
            .await
            .with_context(|| format!("query failed for step '{}'", self.id))?;
        debug!("Step '{}' read {} row(s)", self.id, rows.len());

        let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>>>()?;
        Ok(Data::Array(rows.into_iter().map(Data::Object).collect()))
    }
}

fn decode_row(row: &SqliteRow) -> Result<Row> {
    let mut decoded = Row::new();
    for column in row.columns() {
        let index = column.ordinal();
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            Data::Null
        } else {
            let type_name = raw.type_info().name().to_string();
            match type_name.as_str() {
                "INTEGER" | "BOOLEAN" => Data::from(row.try_get::<i64, _>(index)?),
                "REAL" => Number::from_f64(row.try_get::<f64, _>(index)?).map_or(Data::Null, Data::Number),
                "BLOB" => Data::String(String::from_utf8_lossy(&row.try_get::<Vec<u8>, _>(index)?).into_owned()),
                _ => Data::String(row.try_get::<String, _>(index)?),
            }
        };
        decoded.insert(column.name().to_string(), value);
    }
    Ok(decoded)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IfExists {
    #[default]
    Append,
    Replace,
    Fail,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WriteOptions {
    database: String,
    table: String,
    #[serde(default)]
    if_exists: IfExists,
}

/// Inserts rows into a table, creating it from the first row when needed
#[derive(Debug)]
pub struct SqliteWrite {
    id: String,
    database: Database,
    table: String,
    if_exists: IfExists,
}

impl SqliteWrite {
    pub fn from_config(config: &StepConfig) -> Result<Self> {
        let options: WriteOptions = config.options()?;
        Ok(Self {
            id: config.step_id().to_string(),
            database: Database::new(&options.database),
            table: options.table,
            if_exists: options.if_exists,
        })
    }
}

impl Plugin for SqliteWrite {
    fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Load for SqliteWrite {
    async fn load(&self, data: &Data) -> Result<()> {
        let rows = table(data, &self.id)?;
        let Some(first) = rows.first() else {
            debug!("Step '{}' has no rows to write", self.id);
            return Ok(());
        };
        let columns: Vec<&String> = first.keys().collect();

        let pool = self.database.pool().await?;
        let mut tx = pool.begin().await?;

        let exists = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1")
            .bind(&self.table)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();

        let create = match (exists, self.if_exists) {
            (true, IfExists::Fail) => bail!("table '{}' already exists", self.table),
            (true, IfExists::Replace) => {
                sqlx::query(&format!("DROP TABLE {}", quote(&self.table)))
                    .execute(&mut *tx)
                    .await?;
                true
            }
            (true, IfExists::Append) => false,
            (false, _) => true,
        };

        if create {
            let definitions: Vec<String> = columns
                .iter()
                .map(|column| format!("{} {}", quote(column), column_type(first.get(*column))))
                .collect();
            sqlx::query(&format!("CREATE TABLE {} ({})", quote(&self.table), definitions.join(", ")))
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to create table {}", self.table))?;
        }

        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(&self.table),
            columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", "),
            (1..=columns.len()).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
        );
        for row in &rows {
            let mut query = sqlx::query(&insert);
            for column in &columns {
                query = bind(query, row.get(*column));
            }
            query
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to insert into {}", self.table))?;
        }

        tx.commit().await?;
        info!("Step '{}' wrote {} row(s) to {}", self.id, rows.len(), self.table);
        Ok(())
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn column_type(value: Option<&Data>) -> &'static str {
    match value {
        Some(Data::Number(n)) if n.is_f64() => "REAL",
        Some(Data::Number(_)) | Some(Data::Bool(_)) => "INTEGER",
        Some(Data::Null) | None => "",
        _ => "TEXT",
    }
}

fn bind<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: Option<&Data>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        None | Some(Data::Null) => query.bind(None::<String>),
        Some(Data::Bool(flag)) => query.bind(*flag),
        Some(Data::Number(n)) => match n.as_i64() {
            Some(integer) => query.bind(integer),
            None => query.bind(n.as_f64()),
        },
        Some(Data::String(text)) => query.bind(text.clone()),
        Some(other) => query.bind(other.to_string()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExecuteOptions {
    database: String,
    #[serde(default)]
    sql: Option<String>,
    #[serde(default)]
    statements: Vec<String>,
}

/// Executes SQL statements in order, inside the database
#[derive(Debug)]
pub struct SqliteExecute {
    id: String,
    database: Database,
    statements: Vec<String>,
}

impl SqliteExecute {
    pub fn from_config(config: &StepConfig) -> Result<Self> {
        let options: ExecuteOptions = config.options()?;
        let statements: Vec<String> = options.sql.into_iter().chain(options.statements).collect();
        if statements.is_empty() {
            bail!("step '{}' has no SQL to execute", config.step_id());
        }
        Ok(Self {
            id: config.step_id().to_string(),
            database: Database::new(&options.database),
            statements,
        })
    }

    async fn run(&self) -> Result<Data> {
        let pool = self.database.pool().await?;
        let mut rows_affected = 0;
        for (index, statement) in self.statements.iter().enumerate() {
            let result = sqlx::query(statement)
                .execute(pool)
                .await
                .with_context(|| format!("statement {} of step '{}' failed", index + 1, self.id))?;
            rows_affected += result.rows_affected();
        }
        debug!("Step '{}' executed {} statement(s)", self.id, self.statements.len());
        Ok(json!({ "statements": self.statements.len(), "rows_affected": rows_affected }))
    }
}

impl Plugin for SqliteExecute {
    fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl TransformLoad for SqliteExecute {
    async fn transform_load(&self) -> Result<()> {
        self.run().await.map(|_| ())
    }
}

#[async_trait]
impl PreProcess for SqliteExecute {
    async fn pre_process(&self) -> Result<Data> {
        self.run().await
    }
}

#[async_trait]
impl PostProcess for SqliteExecute {
    async fn post_process(&self) -> Result<Data> {
        self.run().await
    }
}
