//! Persistent order ledger.
//!
//! Schema and duplicate-prevention semantics are taken directly from
//! `original_source/core/storage/bot_database.py`'s `grid_orders` table:
//! one row per order, a `(bot_id, price, status)` index, and a
//! tolerance-based scan for "is there already an open order near this
//! price" rather than exact float equality. Ported to `sqlx` + SQLite
//! with async pooling instead of sqlite3's synchronous cursor, matching
//! the rest of the crate's `tokio`-first style. Runtime query API is
//! used throughout (not the `query!` compile-time macro) since that
//! macro needs a live database at build time.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use crate::exchange::OrderSide;
use crate::grid::level::OrderRecordStatus;

/// A single row of the `grid_orders` table.
#[derive(Debug, Clone)]
pub struct LedgerRow {
    pub id: i64,
    pub bot_id: i64,
    pub order_id: String,
    pub price: Decimal,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub status: OrderRecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Matches within this distance are treated as "the same rung",
/// avoids float-equality bugs when comparing a computed grid price
/// against a stored one. Mirrors `bot_database.py`'s `tolerance=0.001`.
const PRICE_TOLERANCE: f64 = 0.001;

pub struct OrderLedger {
    pool: SqlitePool,
}

impl OrderLedger {
    pub async fn connect(database_url: &str) -> crate::error::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let ledger = Self { pool };
        ledger.migrate().await?;
        Ok(ledger)
    }

    async fn migrate(&self) -> crate::error::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS grid_orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                bot_id INTEGER NOT NULL,
                order_id TEXT NOT NULL,
                price REAL NOT NULL,
                side TEXT NOT NULL,
                quantity REAL NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_grid_orders_bot_price_status \
             ON grid_orders (bot_id, price, status)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert a new row. Does not itself prevent duplicates, callers
    /// should check `find_open_at` first, matching
    /// `GridManager.can_place_order`'s separation of concerns.
    pub async fn add_order(
        &self,
        bot_id: i64,
        order_id: &str,
        price: Decimal,
        side: OrderSide,
        quantity: Decimal,
    ) -> crate::error::Result<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO grid_orders (bot_id, order_id, price, side, quantity, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(bot_id)
        .bind(order_id)
        .bind(price.to_f64().unwrap_or_default())
        .bind(side.as_str())
        .bind(quantity.to_f64().unwrap_or_default())
        .bind(status_str(OrderRecordStatus::Open))
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update_order_status(
        &self,
        order_id: &str,
        status: OrderRecordStatus,
    ) -> crate::error::Result<()> {
        sqlx::query("UPDATE grid_orders SET status = ?1, updated_at = ?2 WHERE order_id = ?3")
            .bind(status_str(status))
            .bind(Utc::now().to_rfc3339())
            .bind(order_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Is there an OPEN row for `bot_id` within `PRICE_TOLERANCE` of
    /// `price`? Scans rather than equality-matching to absorb Decimal
    /// rounding drift between grid construction and storage.
    pub async fn find_open_at(
        &self,
        bot_id: i64,
        price: Decimal,
    ) -> crate::error::Result<Option<LedgerRow>> {
        let rows = sqlx::query(
            "SELECT id, bot_id, order_id, price, side, quantity, status, created_at, updated_at \
             FROM grid_orders WHERE bot_id = ?1 AND status = ?2",
        )
        .bind(bot_id)
        .bind(status_str(OrderRecordStatus::Open))
        .fetch_all(&self.pool)
        .await?;

        let target = price.to_f64().unwrap_or_default();
        for row in rows {
            let stored_price: f64 = row.try_get("price")?;
            if (stored_price - target).abs() < PRICE_TOLERANCE {
                return Ok(Some(row_to_ledger_row(row)?));
            }
        }
        Ok(None)
    }

    pub async fn list_open(&self, bot_id: i64) -> crate::error::Result<Vec<LedgerRow>> {
        let rows = sqlx::query(
            "SELECT id, bot_id, order_id, price, side, quantity, status, created_at, updated_at \
             FROM grid_orders WHERE bot_id = ?1 AND status = ?2 ORDER BY price",
        )
        .bind(bot_id)
        .bind(status_str(OrderRecordStatus::Open))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_ledger_row).collect()
    }

    /// Wipes every row for `bot_id`. Used for a clean-start path, not by
    /// `cancel_all_open_orders` (which transitions rows to CANCELED
    /// instead, see DESIGN.md).
    pub async fn clear_all_orders(&self, bot_id: i64) -> crate::error::Result<()> {
        sqlx::query("DELETE FROM grid_orders WHERE bot_id = ?1")
            .bind(bot_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn status_str(status: OrderRecordStatus) -> &'static str {
    match status {
        OrderRecordStatus::Open => "OPEN",
        OrderRecordStatus::Closed => "CLOSED",
        OrderRecordStatus::Canceled => "CANCELED",
    }
}

fn parse_status(raw: &str) -> crate::error::Result<OrderRecordStatus> {
    match raw {
        "OPEN" => Ok(OrderRecordStatus::Open),
        "CLOSED" => Ok(OrderRecordStatus::Closed),
        "CANCELED" => Ok(OrderRecordStatus::Canceled),
        other => Err(
            crate::error::EngineError::InvariantViolation(format!("unknown order status {}", other))
                .into(),
        ),
    }
}

fn parse_side(raw: &str) -> crate::error::Result<OrderSide> {
    match raw {
        "BUY" => Ok(OrderSide::Buy),
        "SELL" => Ok(OrderSide::Sell),
        other => Err(
            crate::error::EngineError::InvariantViolation(format!("unknown order side {}", other))
                .into(),
        ),
    }
}

fn row_to_ledger_row(row: sqlx::sqlite::SqliteRow) -> crate::error::Result<LedgerRow> {
    let price_f64: f64 = row.try_get("price")?;
    let quantity_f64: f64 = row.try_get("quantity")?;
    let side_raw: String = row.try_get("side")?;
    let status_raw: String = row.try_get("status")?;
    let created_raw: String = row.try_get("created_at")?;
    let updated_raw: String = row.try_get("updated_at")?;

    Ok(LedgerRow {
        id: row.try_get("id")?,
        bot_id: row.try_get("bot_id")?,
        order_id: row.try_get("order_id")?,
        price: Decimal::from_f64(price_f64).unwrap_or_default(),
        side: parse_side(&side_raw)?,
        quantity: Decimal::from_f64(quantity_f64).unwrap_or_default(),
        status: parse_status(&status_raw)?,
        created_at: DateTime::parse_from_rfc3339(&created_raw)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: DateTime::parse_from_rfc3339(&updated_raw)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}
