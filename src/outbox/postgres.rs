use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::order::Order;

use super::message::{OutboxMessage, OutboxStatus};
use super::store::{OrderStore, OutboxStore, PersistenceError};

// ============================================================================
// Postgres Store
// ============================================================================

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(conn_str: &str) -> Result<Self, PersistenceError> {
        let pool = PgPoolOptions::new()
            .max_connections(25)
            .connect(conn_str)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the tables this service owns if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS orders (
                id UUID PRIMARY KEY,
                customer_id UUID NOT NULL,
                order_date TIMESTAMPTZ NOT NULL,
                status TEXT NOT NULL,
                total_amount DOUBLE PRECISION NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS order_items (
                id UUID PRIMARY KEY,
                order_id UUID NOT NULL REFERENCES orders (id),
                product_id UUID NOT NULL,
                quantity INT NOT NULL,
                price DOUBLE PRECISION NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS outbox_messages (
                id UUID PRIMARY KEY,
                aggregate_id UUID NOT NULL,
                aggregate_type TEXT NOT NULL,
                type TEXT NOT NULL,
                payload BYTEA NOT NULL,
                occurred_on TIMESTAMPTZ NOT NULL,
                processed_date TIMESTAMPTZ,
                status TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        // Keeps the relay poll cheap once sent messages accumulate.
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_outbox_messages_pending
             ON outbox_messages (occurred_on) WHERE status = 'Pending'",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn persist_with_outbox(
        &self,
        order: &Order,
        message: &OutboxMessage,
    ) -> Result<(), PersistenceError> {
        // One transaction brackets every write. An uncommitted transaction
        // rolls back when dropped, so each early `?` return releases cleanly.
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO orders (id, customer_id, order_date, status, total_amount)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(order.id)
        .bind(order.customer_id)
        .bind(order.order_date)
        .bind(order.status.as_str())
        .bind(order.total_amount)
        .execute(&mut *tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, product_id, quantity, price)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(item.id)
            .bind(order.id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(item.price)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO outbox_messages (id, aggregate_id, aggregate_type, type, payload, occurred_on, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(message.id)
        .bind(message.aggregate_id)
        .bind(&message.aggregate_type)
        .bind(&message.event_type)
        .bind(&message.payload)
        .bind(message.occurred_on)
        .bind(message.status.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for PgStore {
    async fn fetch_pending(&self, limit: i64) -> Result<Vec<OutboxMessage>, PersistenceError> {
        // No row claiming here: running two relay instances concurrently can
        // duplicate delivery attempts. Single-instance operation is assumed.
        let rows = sqlx::query(
            "SELECT id, aggregate_id, aggregate_type, type, payload, occurred_on, processed_date, status
             FROM outbox_messages
             WHERE status = 'Pending'
             ORDER BY occurred_on ASC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_message).collect()
    }

    async fn mark_sent(
        &self,
        id: Uuid,
        processed_date: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        // The status guard makes Pending -> Sent a one-way, one-time
        // transition: a duplicate mark never rewrites the processed date.
        sqlx::query(
            "UPDATE outbox_messages
             SET status = 'Sent', processed_date = $1
             WHERE id = $2 AND status = 'Pending'",
        )
        .bind(processed_date)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_message(row: PgRow) -> Result<OutboxMessage, PersistenceError> {
    let status_raw: String = row.try_get("status")?;
    let status = OutboxStatus::parse(&status_raw)
        .ok_or_else(|| PersistenceError::Backend(format!("unknown outbox status: {status_raw}")))?;

    Ok(OutboxMessage {
        id: row.try_get("id")?,
        aggregate_id: row.try_get("aggregate_id")?,
        aggregate_type: row.try_get("aggregate_type")?,
        event_type: row.try_get("type")?,
        payload: row.try_get("payload")?,
        occurred_on: row.try_get("occurred_on")?,
        processed_date: row.try_get("processed_date")?,
        status,
    })
}
