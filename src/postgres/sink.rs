// ABOUTME: PostgreSQL row sink - transactional truncate-and-insert full
// ABOUTME: loads, and staging-table + set-based-merge incremental upserts

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveTime;
use rust_decimal::Decimal;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Transaction};

use crate::config::{TableConfig, TargetConfig};
use crate::row::{RowSet, SqlValue};
use crate::sync::sink::RowSink;
use crate::utils::quote_ident;

/// PostgreSQL caps a statement at 65535 bind parameters; stay under it with
/// some margin.
const MAX_PARAMS: usize = 65_000;

/// Applies row sets to warehouse tables.
///
/// Both operations run inside a single transaction, so a failure anywhere
/// leaves the target exactly as it was and a concurrent reader never sees a
/// half-applied state.
pub struct PgRowSink {
    client: Client,
    schema: String,
}

impl PgRowSink {
    pub async fn connect(target: &TargetConfig) -> Result<Self> {
        let client = super::connect(&target.url).await?;
        Ok(Self {
            client,
            schema: target.schema.clone(),
        })
    }

    /// Resolve the fetched column list against the target table's schema.
    ///
    /// Returns target-cased column names and their data types, aligned with
    /// the fetched columns. A fetched column with no counterpart on the
    /// target is an error; positional trust alone is not enough.
    async fn target_columns(
        &self,
        table: &str,
        fetched: &[String],
    ) -> Result<(Vec<String>, Vec<String>)> {
        let rows = self
            .client
            .query(
                "SELECT column_name, data_type
                 FROM information_schema.columns
                 WHERE table_schema = $1 AND table_name = $2
                 ORDER BY ordinal_position",
                &[&self.schema, &table],
            )
            .await
            .with_context(|| format!("failed to read target columns for '{}'", table))?;

        if rows.is_empty() {
            bail!(
                "target table '{}.{}' does not exist or has no columns",
                self.schema,
                table
            );
        }

        let known: Vec<(String, String)> = rows
            .iter()
            .map(|row| (row.get(0), row.get(1)))
            .collect();

        let mut names = Vec::with_capacity(fetched.len());
        let mut types = Vec::with_capacity(fetched.len());
        for column in fetched {
            match known.iter().find(|(name, _)| name.eq_ignore_ascii_case(column)) {
                Some((name, data_type)) => {
                    names.push(name.clone());
                    types.push(data_type.clone());
                }
                None => bail!(
                    "fetched column '{}' does not exist on target table '{}.{}'",
                    column,
                    self.schema,
                    table
                ),
            }
        }
        Ok((names, types))
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(table))
    }
}

#[async_trait]
impl RowSink for PgRowSink {
    async fn replace_all(&mut self, table: &TableConfig, rows: &RowSet) -> Result<u64> {
        rows.validate()?;
        let target = table.target_location();
        let (names, types) = self.target_columns(target, &rows.columns).await?;
        let target_expr = self.qualified(target);

        let tx = self
            .client
            .transaction()
            .await
            .context("failed to begin transaction")?;

        tx.execute(&format!("TRUNCATE TABLE {}", target_expr), &[])
            .await
            .with_context(|| format!("failed to truncate {}", target_expr))?;

        let inserted = insert_rows(&tx, &target_expr, &names, &types, rows).await?;

        tx.commit().await.context("failed to commit full load")?;

        tracing::info!(
            "Replaced contents of {} with {} rows",
            target_expr,
            inserted
        );
        Ok(inserted)
    }

    async fn upsert_merge(&mut self, table: &TableConfig, rows: &RowSet) -> Result<u64> {
        rows.validate()?;
        let target = table.target_location();
        let (names, types) = self.target_columns(target, &rows.columns).await?;
        let pk_idx = names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(&table.primary_key))
            .with_context(|| {
                format!(
                    "primary key '{}' not among fetched columns of '{}'",
                    table.primary_key, table.name
                )
            })?;

        let target_expr = self.qualified(target);
        // Staging name is deterministic per target table, which is safe
        // because attempts for one table never overlap, and the table is
        // session-local anyway.
        let stage = staging_table_name(target);
        let stage_expr = quote_ident(&stage);

        let tx = self
            .client
            .transaction()
            .await
            .context("failed to begin transaction")?;

        // ON COMMIT DROP scopes the staging table to this transaction: it
        // is gone after commit and rollback alike.
        tx.execute(
            &format!(
                "CREATE TEMP TABLE {} (LIKE {} INCLUDING DEFAULTS) ON COMMIT DROP",
                stage_expr, target_expr
            ),
            &[],
        )
        .await
        .with_context(|| format!("failed to create staging table {}", stage_expr))?;

        let staged = insert_rows(&tx, &stage_expr, &names, &types, rows).await?;

        let merge = build_merge_query(&target_expr, &stage_expr, &names, pk_idx);
        let merged = tx
            .execute(&merge, &[])
            .await
            .with_context(|| format!("failed to merge staging rows into {}", target_expr))?;

        tx.commit()
            .await
            .context("failed to commit incremental merge")?;

        tracing::info!(
            "Merged {} rows into {} ({} staged)",
            merged,
            target_expr,
            staged
        );
        Ok(merged)
    }
}

/// Bulk-insert a row set with parameter-limit-aware batching.
async fn insert_rows(
    tx: &Transaction<'_>,
    table_expr: &str,
    names: &[String],
    types: &[String],
    rows: &RowSet,
) -> Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    let per_statement = rows_per_statement(names.len());
    let mut total = 0u64;

    for chunk in rows.rows.chunks(per_statement) {
        let query = build_insert_query(table_expr, names, chunk.len());

        let mut values: Vec<Box<dyn ToSql + Sync + Send>> =
            Vec::with_capacity(chunk.len() * names.len());
        for row in chunk {
            for (value, data_type) in row.iter().zip(types) {
                values.push(bind_value(value, data_type)?);
            }
        }
        let params: Vec<&(dyn ToSql + Sync)> = values
            .iter()
            .map(|v| v.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let affected = tx
            .execute(&query, &params)
            .await
            .with_context(|| format!("failed to insert batch into {}", table_expr))?;
        total += affected;
    }

    Ok(total)
}

/// Rows per INSERT statement, bounded by the bind-parameter limit.
fn rows_per_statement(num_columns: usize) -> usize {
    std::cmp::max(1, MAX_PARAMS / num_columns.max(1))
}

/// Deterministic per-table staging name, kept within PostgreSQL's
/// 63-character identifier limit.
fn staging_table_name(target: &str) -> String {
    const SUFFIX: &str = "_stage";
    let max_base = 63 - SUFFIX.len();
    let base: String = target.chars().take(max_base).collect();
    format!("{}{}", base, SUFFIX)
}

/// Build a multi-row INSERT:
/// `INSERT INTO t ("a", "b") VALUES ($1, $2), ($3, $4), ...`
fn build_insert_query(table_expr: &str, names: &[String], num_rows: usize) -> String {
    let quoted: Vec<String> = names.iter().map(|n| quote_ident(n)).collect();
    let num_cols = names.len();

    let value_rows: Vec<String> = (0..num_rows)
        .map(|row_idx| {
            let placeholders: Vec<String> = (0..num_cols)
                .map(|col_idx| format!("${}", row_idx * num_cols + col_idx + 1))
                .collect();
            format!("({})", placeholders.join(", "))
        })
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES {}",
        table_expr,
        quoted.join(", "),
        value_rows.join(", ")
    )
}

/// Build the set-based merge from staging into the target:
///
/// ```sql
/// INSERT INTO target (cols) SELECT cols FROM stage
/// ON CONFLICT (pk) DO UPDATE SET col = EXCLUDED.col, ...
/// ```
///
/// Matched keys get every non-key column overwritten (last writer wins),
/// unmatched keys are inserted, untouched target rows stay as they are.
fn build_merge_query(
    target_expr: &str,
    stage_expr: &str,
    names: &[String],
    pk_idx: usize,
) -> String {
    let quoted: Vec<String> = names.iter().map(|n| quote_ident(n)).collect();
    let pk = &quoted[pk_idx];

    let updates: Vec<String> = quoted
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != pk_idx)
        .map(|(_, c)| format!("{} = EXCLUDED.{}", c, c))
        .collect();

    let conflict_action = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };

    format!(
        "INSERT INTO {} ({}) SELECT {} FROM {} ON CONFLICT ({}) {}",
        target_expr,
        quoted.join(", "),
        quoted.join(", "),
        stage_expr,
        pk,
        conflict_action
    )
}

/// Convert a `SqlValue` into a typed bind parameter for the given target
/// column type. NULLs must be typed too, so every arm produces its own
/// `Option<T>`.
fn bind_value(value: &SqlValue, data_type: &str) -> Result<Box<dyn ToSql + Sync + Send>> {
    let mismatch = || {
        anyhow::anyhow!(
            "cannot bind {} value to a '{}' column",
            value.type_name(),
            data_type
        )
    };

    let bound: Box<dyn ToSql + Sync + Send> = match data_type {
        "smallint" => match value {
            SqlValue::Null => Box::new(None::<i16>),
            SqlValue::Int(i) => Box::new(i16::try_from(*i).map_err(|_| mismatch())?),
            _ => return Err(mismatch()),
        },
        "integer" => match value {
            SqlValue::Null => Box::new(None::<i32>),
            SqlValue::Int(i) => Box::new(i32::try_from(*i).map_err(|_| mismatch())?),
            _ => return Err(mismatch()),
        },
        "bigint" => match value {
            SqlValue::Null => Box::new(None::<i64>),
            SqlValue::Int(i) => Box::new(*i),
            _ => return Err(mismatch()),
        },
        "boolean" => match value {
            SqlValue::Null => Box::new(None::<bool>),
            SqlValue::Bool(b) => Box::new(*b),
            // MySQL BOOLEAN is TINYINT(1) and arrives as 0/1.
            SqlValue::Int(0) => Box::new(false),
            SqlValue::Int(1) => Box::new(true),
            _ => return Err(mismatch()),
        },
        "real" => match value {
            SqlValue::Null => Box::new(None::<f32>),
            SqlValue::Float(f) => Box::new(*f as f32),
            SqlValue::Int(i) => Box::new(*i as f32),
            _ => return Err(mismatch()),
        },
        "double precision" => match value {
            SqlValue::Null => Box::new(None::<f64>),
            SqlValue::Float(f) => Box::new(*f),
            SqlValue::Int(i) => Box::new(*i as f64),
            _ => return Err(mismatch()),
        },
        "numeric" => match value {
            SqlValue::Null => Box::new(None::<Decimal>),
            SqlValue::Decimal(d) => Box::new(*d),
            SqlValue::Int(i) => Box::new(Decimal::from(*i)),
            SqlValue::Float(f) => {
                Box::new(Decimal::try_from(*f).map_err(|_| mismatch())?)
            }
            _ => return Err(mismatch()),
        },
        "text" | "character varying" | "character" => match value {
            SqlValue::Null => Box::new(None::<String>),
            SqlValue::Text(s) => Box::new(s.clone()),
            SqlValue::Int(i) => Box::new(i.to_string()),
            SqlValue::Float(f) => Box::new(f.to_string()),
            SqlValue::Decimal(d) => Box::new(d.to_string()),
            SqlValue::Bool(b) => Box::new(b.to_string()),
            SqlValue::Date(d) => Box::new(d.format("%Y-%m-%d").to_string()),
            SqlValue::DateTime(ts) => Box::new(ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
            SqlValue::Json(j) => Box::new(j.to_string()),
            SqlValue::Bytes(_) => return Err(mismatch()),
        },
        "date" => match value {
            SqlValue::Null => Box::new(None::<chrono::NaiveDate>),
            SqlValue::Date(d) => Box::new(*d),
            SqlValue::DateTime(ts) => Box::new(ts.date()),
            _ => return Err(mismatch()),
        },
        "timestamp without time zone" => match value {
            SqlValue::Null => Box::new(None::<chrono::NaiveDateTime>),
            SqlValue::DateTime(ts) => Box::new(*ts),
            SqlValue::Date(d) => Box::new(d.and_time(NaiveTime::MIN)),
            _ => return Err(mismatch()),
        },
        "timestamp with time zone" => match value {
            SqlValue::Null => Box::new(None::<chrono::DateTime<chrono::Utc>>),
            // MySQL DATETIME carries no zone; treat it as UTC.
            SqlValue::DateTime(ts) => Box::new(ts.and_utc()),
            SqlValue::Date(d) => Box::new(d.and_time(NaiveTime::MIN).and_utc()),
            _ => return Err(mismatch()),
        },
        "json" | "jsonb" => match value {
            SqlValue::Null => Box::new(None::<serde_json::Value>),
            SqlValue::Json(j) => Box::new(j.clone()),
            SqlValue::Text(s) => {
                let parsed: serde_json::Value =
                    serde_json::from_str(s).map_err(|_| mismatch())?;
                Box::new(parsed)
            }
            _ => return Err(mismatch()),
        },
        "bytea" => match value {
            SqlValue::Null => Box::new(None::<Vec<u8>>),
            SqlValue::Bytes(b) => Box::new(b.clone()),
            _ => return Err(mismatch()),
        },
        other => bail!(
            "unsupported target column type '{}' (value type {})",
            other,
            value.type_name()
        ),
    };
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_build_insert_query_single_row() {
        let query = build_insert_query("\"raw\".\"customers\"", &cols(&["id", "name"]), 1);
        assert_eq!(
            query,
            "INSERT INTO \"raw\".\"customers\" (\"id\", \"name\") VALUES ($1, $2)"
        );
    }

    #[test]
    fn test_build_insert_query_multiple_rows() {
        let query = build_insert_query("\"t\"", &cols(&["a", "b"]), 3);
        assert!(query.contains("($1, $2), ($3, $4), ($5, $6)"));
    }

    #[test]
    fn test_build_merge_query_updates_non_key_columns() {
        let query = build_merge_query(
            "\"raw\".\"customers\"",
            "\"customers_stage\"",
            &cols(&["customer_id", "email", "status"]),
            0,
        );
        assert!(query.contains("INSERT INTO \"raw\".\"customers\""));
        assert!(query.contains("SELECT \"customer_id\", \"email\", \"status\" FROM \"customers_stage\""));
        assert!(query.contains("ON CONFLICT (\"customer_id\")"));
        assert!(query.contains("\"email\" = EXCLUDED.\"email\""));
        assert!(query.contains("\"status\" = EXCLUDED.\"status\""));
        assert!(!query.contains("\"customer_id\" = EXCLUDED"));
    }

    #[test]
    fn test_build_merge_query_key_only_table_does_nothing_on_conflict() {
        let query = build_merge_query("\"t\"", "\"t_stage\"", &cols(&["id"]), 0);
        assert!(query.contains("DO NOTHING"));
        assert!(!query.contains("DO UPDATE"));
    }

    #[test]
    fn test_staging_table_name() {
        assert_eq!(staging_table_name("customers"), "customers_stage");
        let long = "a".repeat(70);
        let staged = staging_table_name(&long);
        assert_eq!(staged.len(), 63);
        assert!(staged.ends_with("_stage"));
    }

    #[test]
    fn test_rows_per_statement_respects_param_limit() {
        assert_eq!(rows_per_statement(10), 6_500);
        assert_eq!(rows_per_statement(0), MAX_PARAMS);
        // A very wide table still makes progress one row at a time.
        assert_eq!(rows_per_statement(100_000), 1);
    }

    #[test]
    fn test_bind_value_integers() {
        assert!(bind_value(&SqlValue::Int(5), "integer").is_ok());
        assert!(bind_value(&SqlValue::Int(i64::MAX), "integer").is_err());
        assert!(bind_value(&SqlValue::Int(i64::MAX), "bigint").is_ok());
        assert!(bind_value(&SqlValue::Null, "integer").is_ok());
        assert!(bind_value(&SqlValue::Text("5".into()), "integer").is_err());
    }

    #[test]
    fn test_bind_value_boolean_accepts_tinyint() {
        assert!(bind_value(&SqlValue::Int(0), "boolean").is_ok());
        assert!(bind_value(&SqlValue::Int(1), "boolean").is_ok());
        assert!(bind_value(&SqlValue::Int(2), "boolean").is_err());
        assert!(bind_value(&SqlValue::Bool(true), "boolean").is_ok());
    }

    #[test]
    fn test_bind_value_text_coerces_scalars() {
        assert!(bind_value(&SqlValue::Int(5), "text").is_ok());
        assert!(bind_value(&SqlValue::Decimal("1.5".parse().unwrap()), "text").is_ok());
        assert!(bind_value(&SqlValue::Bytes(vec![1]), "text").is_err());
    }

    #[test]
    fn test_bind_value_unsupported_type_errors() {
        assert!(bind_value(&SqlValue::Text("x".into()), "uuid").is_err());
    }
}
