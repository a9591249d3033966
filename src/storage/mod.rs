use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::Transaction;

/// Durable set of transactions for one source address.
///
/// Implementations do not check hash uniqueness; callers only hand in
/// records the store has not seen yet.
#[async_trait]
pub trait TransactionStore {
    async fn all(&self) -> Result<Vec<Transaction>>;

    async fn insert_many(&mut self, txs: &[Transaction]) -> Result<()>;
}

/// SQLite-backed transaction cache, one database file per address.
pub struct TxCache {
    pool: SqlitePool,
}

pub fn cache_file(cache_dir: &Path, address: &str) -> PathBuf {
    cache_dir.join(format!("{}.txdb", address.to_lowercase()))
}

impl TxCache {
    pub async fn open(cache_dir: &Path, address: &str) -> Result<Self> {
        ensure_dir_exists(cache_dir)?;

        let path = cache_file(cache_dir, address);
        ensure_file_exists(&path)?;
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        apply_schema(&pool).await?;
        debug!(path = %path.display(), "opened transaction cache");
        Ok(Self { pool })
    }

    pub async fn close(self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for TxCache {
    async fn all(&self) -> Result<Vec<Transaction>> {
        #[derive(FromRow)]
        struct TxRow {
            hash: String,
            block_number: i64,
            timestamp: i64,
            from_addr: String,
            to_addr: String,
            gas_used: String,
            gas_price_wei: String,
            receipt_status: String,
        }

        let rows = sqlx::query_as::<_, TxRow>(
            r#"
            SELECT hash, block_number, timestamp, from_addr, to_addr,
                   gas_used, gas_price_wei, receipt_status
            FROM transactions
            ORDER BY rowid;
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(Transaction {
                    hash: row.hash,
                    block_number: u64::try_from(row.block_number).map_err(decode_error)?,
                    timestamp: row.timestamp,
                    from: row.from_addr,
                    to: row.to_addr,
                    gas_used: parse_column(&row.gas_used)?,
                    gas_price: parse_column(&row.gas_price_wei)?,
                    receipt_status: row.receipt_status,
                })
            })
            .collect()
    }

    async fn insert_many(&mut self, txs: &[Transaction]) -> Result<()> {
        if txs.is_empty() {
            return Ok(());
        }

        let mut txn = self.pool.begin().await?;

        for tx in txs {
            sqlx::query(
                r#"
                INSERT INTO transactions (
                    hash, block_number, timestamp, from_addr, to_addr,
                    gas_used, gas_price_wei, receipt_status
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);
                "#,
            )
            .bind(&tx.hash)
            .bind(i64::try_from(tx.block_number).map_err(decode_error)?)
            .bind(tx.timestamp)
            .bind(&tx.from)
            .bind(&tx.to)
            .bind(tx.gas_used.to_string())
            .bind(tx.gas_price.to_string())
            .bind(&tx.receipt_status)
            .execute(&mut *txn)
            .await?;
        }

        txn.commit().await?;
        Ok(())
    }
}

fn ensure_dir_exists(dir: &Path) -> Result<()> {
    match std::fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(source) => Err(Error::CacheIo {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(drop)
        .map_err(|source| Error::CacheIo {
            path: path.to_path_buf(),
            source,
        })
}

async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            hash TEXT PRIMARY KEY,
            block_number INTEGER NOT NULL,
            timestamp INTEGER NOT NULL,
            from_addr TEXT NOT NULL,
            to_addr TEXT NOT NULL,
            gas_used TEXT NOT NULL,
            gas_price_wei TEXT NOT NULL,
            receipt_status TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_transactions_block_number ON transactions(block_number);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn parse_column<T>(raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse().map_err(decode_error)
}

fn decode_error<E>(err: E) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    Error::CacheDb(sqlx::Error::Decode(Box::new(err)))
}
