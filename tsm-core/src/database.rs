use crate::config::FieldMapping;
use crate::error::{Result, TsmError};
use crate::models::{LoadSummary, Snapshot};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params_from_iter;
use rusqlite::types::Value;

pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    pub fn new(path: &std::path::Path) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(2)
            .build(manager)
            .map_err(TsmError::Pool)?;

        let db = Self { pool };
        db.run_migrations()?;
        Ok(db)
    }

    pub fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(TsmError::Pool)
    }

    fn run_migrations(&self) -> Result<()> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;

        tx.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS price_history (
                id INTEGER PRIMARY KEY,
                item_id TEXT,
                market_value INTEGER,
                min_buyout INTEGER,
                historical INTEGER,
                num_auctions INTEGER,
                time TIMESTAMP NOT NULL,
                realm TEXT NOT NULL,
                UNIQUE(realm, time, item_id)
            );

            CREATE INDEX IF NOT EXISTS idx_price_history_realm_time ON price_history(realm, time);
            "#,
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Insert every row of `snapshot`, tagged with `realm` and its download time.
    pub fn load_snapshot(
        &self,
        snapshot: &Snapshot,
        realm: &str,
        mapping: &FieldMapping,
    ) -> Result<LoadSummary> {
        self.load_rows(
            snapshot.download_time,
            realm,
            &snapshot.fields,
            &snapshot.data,
            mapping,
        )
    }

    /// Insert rows one at a time. A row that fails is logged and counted;
    /// the rest of the batch still goes in.
    ///
    /// Each insert commits on its own. A row whose failure rolls back the
    /// surrounding transaction (`RAISE(ROLLBACK)`, a full disk) cannot take
    /// earlier rows with it.
    pub fn load_rows<S: AsRef<str>>(
        &self,
        download_time: u64,
        realm: &str,
        fields: &[String],
        rows: &[Vec<S>],
        mapping: &FieldMapping,
    ) -> Result<LoadSummary> {
        let time = i64::try_from(download_time).map_err(|_| {
            TsmError::MalformedTimestamp(format!("{} does not fit a database timestamp", download_time))
        })?;
        let plan = InsertPlan::new(fields, mapping);
        tracing::debug!("Inserting into columns {:?}", plan.columns());

        let conn = self.connection()?;
        let mut stmt = conn.prepare(plan.sql())?;
        let mut summary = LoadSummary::default();

        for (index, row) in rows.iter().enumerate() {
            let result = plan
                .params_for(index, row, time, realm)
                .and_then(|params| {
                    stmt.execute(params_from_iter(params)).map_err(|e| TsmError::RowInsert {
                        row: index,
                        reason: e.to_string(),
                    })
                });

            match result {
                Ok(0) => {
                    summary.duplicates += 1;
                    tracing::debug!("Row {} already present, skipped", index);
                }
                Ok(_) => summary.inserted += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!("{}", e);
                }
            }
        }

        tracing::info!(
            "Loaded {} rows for {}: {} inserted, {} already present, {} failed",
            summary.total(),
            realm,
            summary.inserted,
            summary.duplicates,
            summary.failed
        );
        Ok(summary)
    }

    /// Number of stored rows for a realm.
    pub fn count_rows(&self, realm: &str) -> Result<i64> {
        let conn = self.connection()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM price_history WHERE realm = ?1",
            [realm],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

/// Parameterized insert for one field layout.
///
/// Known fields become columns in field order, followed by `time` and `realm`.
/// The epoch time is converted to a SQLite datetime inside the statement.
#[derive(Debug, Clone)]
pub struct InsertPlan {
    sql: String,
    columns: Vec<String>,
    source_indices: Vec<usize>,
}

impl InsertPlan {
    pub fn new(fields: &[String], mapping: &FieldMapping) -> Self {
        let mut columns = Vec::new();
        let mut source_indices = Vec::new();

        for (index, field) in fields.iter().enumerate() {
            match mapping.column_for(field) {
                Some(column) => {
                    columns.push(column.to_string());
                    source_indices.push(index);
                }
                None => tracing::warn!("Unknown field: {}", field),
            }
        }

        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let time_param = columns.len() + 1;
        let realm_param = columns.len() + 2;

        let mut column_list = columns.clone();
        column_list.push("time".to_string());
        column_list.push("realm".to_string());

        let mut value_list = placeholders;
        value_list.push(format!("datetime(?{}, 'unixepoch')", time_param));
        value_list.push(format!("?{}", realm_param));

        let sql = format!(
            "INSERT INTO price_history ({}) VALUES ({}) ON CONFLICT DO NOTHING",
            column_list.join(", "),
            value_list.join(", ")
        );

        Self {
            sql,
            columns,
            source_indices,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Mapped destination columns, in insert order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Bind values for one row: the mapped values, then time, then realm.
    pub fn params_for<S: AsRef<str>>(
        &self,
        index: usize,
        row: &[S],
        time: i64,
        realm: &str,
    ) -> Result<Vec<Value>> {
        let mut params = Vec::with_capacity(self.source_indices.len() + 2);
        for &source in &self.source_indices {
            let value = row.get(source).ok_or_else(|| TsmError::RowInsert {
                row: index,
                reason: format!("expected at least {} columns, found {}", source + 1, row.len()),
            })?;
            params.push(Value::Text(value.as_ref().to_string()));
        }
        params.push(Value::Integer(time));
        params.push(Value::Text(realm.to_string()));
        Ok(params)
    }
}
