//! PostgreSQL implementation of [`Database`].
//!
//! Each endpoint gets its own deadpool-postgres pool limited to a single
//! connection. Compare streams keep their pooled client until dropped, so the
//! connection goes back to the pool as soon as a window is finished.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use futures::Stream;
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::{Config as PgConfig, NoTls, Row};
use tracing::{debug, info};

use super::tls::{split_ssl_mode, TlsBuilder};
use super::{Database, RowHash, RowStream};
use crate::error::{CheckError, Result};

/// Connections per endpoint; the run is strictly sequential.
const POOL_SIZE: usize = 1;

/// A PostgreSQL endpoint.
pub struct PgDatabase {
    name: String,
    pool: Pool,
}

impl PgDatabase {
    /// Connect to the database behind `conn_str` and check it answers.
    ///
    /// `name` labels the endpoint in logs and errors.
    pub async fn connect(name: &str, conn_str: &str) -> Result<Self> {
        let (conn_str, ssl_mode) = split_ssl_mode(conn_str)?;
        let pg_config: PgConfig = conn_str.parse().map_err(|e| {
            CheckError::Config(format!("invalid {} database connection string: {}", name, e))
        })?;

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = match TlsBuilder::new(ssl_mode).build()? {
            Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
            None => Manager::from_config(pg_config, NoTls, mgr_config),
        };
        let pool = Pool::builder(mgr)
            .max_size(POOL_SIZE)
            .build()
            .map_err(|e| CheckError::pool(e, format!("creating {} pool", name)))?;

        // Test connection
        let client = pool
            .get()
            .await
            .map_err(|e| CheckError::pool(e, format!("connecting to {} database", name)))?;
        client.simple_query("SELECT 1").await?;
        drop(client);

        info!("Connected to {} database ({:?})", name, ssl_mode);

        Ok(Self {
            name: name.to_string(),
            pool,
        })
    }

    async fn client(&self, table: &str) -> Result<Object> {
        self.pool.get().await.map_err(|e| {
            CheckError::pool(e, format!("getting {} connection for table {}", self.name, table))
        })
    }
}

#[async_trait]
impl Database for PgDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query_scalar(&self, table: &str, sql: &str) -> Result<Option<i64>> {
        let client = self.client(table).await?;
        debug!("{}: {}", self.name, sql);

        let row = client.query_opt(sql, &[]).await?;
        match row {
            Some(row) => decode_id(&row, 0),
            None => Ok(None),
        }
    }

    async fn query_rows(
        &self,
        table: &str,
        sql: &str,
        start: i64,
        stop: i64,
    ) -> Result<RowStream> {
        let client = self.client(table).await?;
        debug!("{}: {} [$1={}, $2={}]", self.name, sql, start, stop);

        let statement = client
            .prepare_typed_cached(sql, &[Type::INT8, Type::INT8])
            .await?;
        let params: [&(dyn ToSql + Sync); 2] = [&start, &stop];
        let rows = client.query_raw(&statement, params).await?;

        Ok(Box::pin(PooledRowStream {
            rows: Box::pin(rows),
            _client: Box::new(client),
        }))
    }

    async fn close(&self) {
        self.pool.close();
    }
}

/// Row stream that holds on to its pooled connection.
struct PooledRowStream {
    rows: Pin<Box<tokio_postgres::RowStream>>,
    _client: Box<Object>,
}

impl Stream for PooledRowStream {
    type Item = Result<RowHash>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.rows.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(row))) => Poll::Ready(Some(decode_row_hash(&row))),
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e.into()))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Decode an `(id, hash)` compare row.
fn decode_row_hash(row: &Row) -> Result<RowHash> {
    let columns = row.columns();
    check_compare_columns(columns.len())?;
    check_hash_type(columns[1].type_())?;

    let id = decode_id(row, 0)?
        .ok_or_else(|| CheckError::Config("compare query returned a NULL id".to_string()))?;
    let hash: Option<String> = row.try_get(1)?;

    Ok(RowHash { id, hash })
}

/// Decode an integer column of any width.
fn decode_id(row: &Row, idx: usize) -> Result<Option<i64>> {
    let Some(column) = row.columns().get(idx) else {
        return Err(CheckError::Config(format!(
            "query returned no column at position {}",
            idx + 1
        )));
    };

    let value = match IdColumn::from_type(column.type_(), idx)? {
        IdColumn::Int8 => row.try_get::<_, Option<i64>>(idx)?,
        IdColumn::Int4 => row.try_get::<_, Option<i32>>(idx)?.map(i64::from),
        IdColumn::Int2 => row.try_get::<_, Option<i16>>(idx)?.map(i64::from),
    };

    Ok(value)
}

/// Width of an integer id column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdColumn {
    Int8,
    Int4,
    Int2,
}

impl IdColumn {
    fn from_type(ty: &Type, idx: usize) -> Result<Self> {
        match *ty {
            Type::INT8 => Ok(IdColumn::Int8),
            Type::INT4 => Ok(IdColumn::Int4),
            Type::INT2 => Ok(IdColumn::Int2),
            ref other => Err(CheckError::Config(format!(
                "expected an integer column at position {}, got {}",
                idx + 1,
                other
            ))),
        }
    }
}

fn check_compare_columns(count: usize) -> Result<()> {
    if count < 2 {
        return Err(CheckError::Config(format!(
            "compare query must return (id, hash) columns, got {} column(s)",
            count
        )));
    }
    Ok(())
}

/// The hash column must decode as text; NULL is allowed.
fn check_hash_type(ty: &Type) -> Result<()> {
    if <String as FromSql>::accepts(ty) {
        Ok(())
    } else {
        Err(CheckError::Config(format!(
            "compare query hash column must be text, got {}",
            ty
        )))
    }
}
