//! Postgres-backed inventory store.
//!
//! Row locks are `SELECT … FOR UPDATE` held until the transaction ends. Each
//! transaction sets a local `lock_timeout`, so a blocked lock surfaces as a
//! retryable error instead of waiting forever.
//!
//! ## Error Mapping
//!
//! | SQLx error | SQLSTATE | `StoreError` |
//! |------------|----------|--------------|
//! | Database (lock not available) | `55P03` | `LockTimeout` |
//! | Database (deadlock detected) | `40P01` | `LockTimeout` |
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (check / FK / not-null violation) | `23514` / `23503` / `23502` | `Constraint` |
//! | Decode / ColumnDecode / ColumnNotFound | N/A | `Corrupt` |
//! | Everything else (pool, IO, TLS, other database errors) | N/A | `Unavailable` |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use stockhold_audit::AuditEntry;
use stockhold_core::{AuditEntryId, Entity, Money, OrderId, ProductId, ReservationId, UserId};
use stockhold_inventory::{Product, Reservation, StockLevels};
use stockhold_sales::{Order, OrderStatus};

use super::r#trait::{InventoryStore, StoreError, StoreTransaction};
use crate::query::{AuditQuery, Cursor, OrderQuery, OrderSort, PAGE_SIZE, Page, PageRequest};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const PRODUCT_COLUMNS: &str =
    "id, name, price, total_stock, available_stock, reserved_stock, created_at, updated_at";
const RESERVATION_COLUMNS: &str =
    "id, user_id, product_id, quantity, expires_at, created_at, updated_at";
const ORDER_COLUMNS: &str =
    "id, user_id, product_id, quantity, total, status, created_at, updated_at";
const AUDIT_COLUMNS: &str =
    "id, actor, action, object_type, object_id, old_value, new_value, \"timestamp\"";

/// Postgres-backed transactional store.
///
/// `PostgresStore` is `Send + Sync` and cheap to clone; all work goes through
/// the SQLx connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Open a pool against `database_url`.
    #[instrument(skip(database_url), err)]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        lock_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, lock_timeout))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for PostgresStore {
    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;

        Ok(Box::new(PostgresTransaction { tx }))
    }

    #[instrument(skip(self), err)]
    async fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("product", e))?;
        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn products(&self, page: PageRequest) -> Result<Page<Product>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE ($1::uuid IS NULL OR id > $1) ORDER BY id ASC LIMIT $2"
        ))
        .bind(page.after)
        .bind(overfetch_limit())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("products", e))?;

        let products = rows.iter().map(product_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(Page::from_overfetch(products, Cursor::after_product))
    }

    #[instrument(skip(self), err)]
    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("reservation", e))?;
        row.as_ref().map(reservation_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn reservations(&self, page: PageRequest) -> Result<Page<Reservation>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations \
             WHERE ($1::uuid IS NULL OR id > $1) ORDER BY id ASC LIMIT $2"
        ))
        .bind(page.after)
        .bind(overfetch_limit())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("reservations", e))?;

        let reservations = rows
            .iter()
            .map(reservation_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::from_overfetch(reservations, Cursor::after_reservation))
    }

    #[instrument(skip(self), err)]
    async fn expired_reservations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reservation>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations \
             WHERE expires_at < $1 ORDER BY expires_at ASC, id ASC LIMIT $2"
        ))
        .bind(now)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("expired_reservations", e))?;

        rows.iter().map(reservation_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("order", e))?;
        row.as_ref().map(order_from_row).transpose()
    }

    #[instrument(skip(self), fields(sort = query.sort.as_str()), err)]
    async fn orders(&self, query: &OrderQuery) -> Result<Page<Order>, StoreError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders WHERE TRUE"));

        let (lower, upper) = query.filter.created_range();
        if let Some(lower) = lower {
            qb.push(" AND created_at >= ").push_bind(lower);
        }
        if let Some(upper) = upper {
            qb.push(" AND created_at < ").push_bind(upper);
        }
        if let Some(status) = query.filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(min) = query.filter.min_total {
            qb.push(" AND total >= ").push_bind(min.amount());
        }
        if let Some(max) = query.filter.max_total {
            qb.push(" AND total <= ").push_bind(max.amount());
        }
        if let Some(after) = query.after {
            match query.sort {
                OrderSort::Chronological => {
                    qb.push(" AND (created_at, id) > (")
                        .push_bind(after.created_at)
                        .push(", ")
                        .push_bind(after.id)
                        .push(")");
                }
                OrderSort::Newest => {
                    qb.push(" AND (created_at, id) < (")
                        .push_bind(after.created_at)
                        .push(", ")
                        .push_bind(after.id)
                        .push(")");
                }
                OrderSort::HighestValue => {
                    qb.push(" AND (total < ")
                        .push_bind(after.total)
                        .push(" OR (total = ")
                        .push_bind(after.total)
                        .push(" AND id > ")
                        .push_bind(after.id)
                        .push("))");
                }
            }
        }
        qb.push(" ORDER BY ")
            .push(query.sort.order_by())
            .push(" LIMIT ")
            .push_bind(overfetch_limit());

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("orders", e))?;

        let orders = rows.iter().map(order_from_row).collect::<Result<Vec<_>, _>>()?;
        let sort = query.sort;
        Ok(Page::from_overfetch(orders, |o| Cursor::after_order(o, sort)))
    }

    #[instrument(skip(self), err)]
    async fn audit_entries(&self, query: &AuditQuery) -> Result<Page<AuditEntry>, StoreError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {AUDIT_COLUMNS} FROM audit_log WHERE TRUE"));

        if let Some(object_type) = query.object_type {
            qb.push(" AND object_type = ").push_bind(object_type.as_str());
        }
        if let Some(object_id) = query.object_id {
            qb.push(" AND object_id = ").push_bind(object_id);
        }
        if let Some(action) = &query.action {
            qb.push(" AND action = ").push_bind(action.clone());
        }
        if let Some(from) = query.from {
            qb.push(" AND \"timestamp\" >= ").push_bind(from);
        }
        if let Some(to) = query.to {
            qb.push(" AND \"timestamp\" <= ").push_bind(to);
        }
        if let Some((timestamp, id)) = query.after {
            qb.push(" AND (\"timestamp\", id) > (")
                .push_bind(timestamp)
                .push(", ")
                .push_bind(id)
                .push(")");
        }
        qb.push(" ORDER BY \"timestamp\" ASC, id ASC LIMIT ")
            .push_bind(overfetch_limit());

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("audit_entries", e))?;

        let entries = rows.iter().map(audit_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(Page::from_overfetch(entries, Cursor::after_audit))
    }
}

/// A Postgres transaction. Dropping it without commit rolls back.
struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    #[instrument(skip(self), err)]
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_product", e))?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("product", e))?;
        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(skip(self, product), fields(product_id = %product.id()), err)]
    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError> {
        let stock = product.stock();
        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, price, total_stock, available_stock, reserved_stock, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(product.id().as_uuid())
        .bind(product.name())
        .bind(product.price().amount())
        .bind(to_i32(stock.total(), "total_stock")?)
        .bind(to_i32(stock.available(), "available_stock")?)
        .bind(to_i32(stock.reserved(), "reserved_stock")?)
        .bind(product.created_at())
        .bind(product.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(())
    }

    #[instrument(skip(self, product), fields(product_id = %product.id()), err)]
    async fn update_product(&mut self, product: &Product) -> Result<(), StoreError> {
        let stock = product.stock();
        sqlx::query(
            r#"
            UPDATE products
            SET name = $2, price = $3, total_stock = $4, available_stock = $5,
                reserved_stock = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(product.id().as_uuid())
        .bind(product.name())
        .bind(product.price().amount())
        .bind(to_i32(stock.total(), "total_stock")?)
        .bind(to_i32(stock.available(), "available_stock")?)
        .bind(to_i32(stock.reserved(), "reserved_stock")?)
        .bind(product.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_product", e))?;
        Ok(())
    }

    async fn reservation(&mut self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("reservation", e))?;
        row.as_ref().map(reservation_from_row).transpose()
    }

    #[instrument(skip(self, reservation), fields(reservation_id = %reservation.id()), err)]
    async fn insert_reservation(&mut self, reservation: &Reservation) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO reservations (
                id, user_id, product_id, quantity, expires_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(reservation.id().as_uuid())
        .bind(reservation.user_id().map(Uuid::from))
        .bind(reservation.product_id().as_uuid())
        .bind(to_i32(reservation.quantity(), "quantity")?)
        .bind(reservation.expires_at())
        .bind(reservation.created_at())
        .bind(reservation.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_reservation", e))?;
        Ok(())
    }

    #[instrument(skip(self, reservation), fields(reservation_id = %reservation.id()), err)]
    async fn update_reservation(&mut self, reservation: &Reservation) -> Result<(), StoreError> {
        sqlx::query("UPDATE reservations SET quantity = $2, updated_at = $3 WHERE id = $1")
            .bind(reservation.id().as_uuid())
            .bind(to_i32(reservation.quantity(), "quantity")?)
            .bind(reservation.updated_at())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_reservation", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete_reservation(&mut self, id: ReservationId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM reservations WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_reservation", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_order", e))?;
        row.as_ref().map(order_from_row).transpose()
    }

    #[instrument(skip(self, order), fields(order_id = %order.id()), err)]
    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, product_id, quantity, total, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.user_id().map(Uuid::from))
        .bind(order.product_id().as_uuid())
        .bind(to_i32(order.quantity(), "quantity")?)
        .bind(order.total().amount())
        .bind(order.status().as_str())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;
        Ok(())
    }

    #[instrument(skip(self, order), fields(order_id = %order.id()), err)]
    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE orders
            SET quantity = $2, total = $3, status = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(to_i32(order.quantity(), "quantity")?)
        .bind(order.total().amount())
        .bind(order.status().as_str())
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_order", e))?;
        Ok(())
    }

    #[instrument(skip(self, entry), fields(action = entry.action()), err)]
    async fn append_audit(&mut self, entry: &AuditEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (
                id, actor, action, object_type, object_id, old_value, new_value, "timestamp"
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id().as_uuid())
        .bind(entry.actor())
        .bind(entry.action())
        .bind(entry.object_type())
        .bind(entry.object_id())
        .bind(entry.old_value())
        .bind(entry.new_value())
        .bind(entry.timestamp())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_audit", e))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        this.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        this.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn overfetch_limit() -> i64 {
    (PAGE_SIZE + 1) as i64
}

fn to_i32(value: u32, column: &str) -> Result<i32, StoreError> {
    i32::try_from(value)
        .map_err(|_| StoreError::Constraint(format!("{column} {value} exceeds column range")))
}

fn to_u32(value: i32, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {column}: {value}")))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Corrupt(format!("column {name}: {e}")))
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    let id: Uuid = column(row, "id")?;
    let price: Decimal = column(row, "price")?;
    let price = Money::new(price).map_err(|e| StoreError::Corrupt(format!("product {id}: {e}")))?;
    let stock = StockLevels::new(
        to_u32(column(row, "total_stock")?, "total_stock")?,
        to_u32(column(row, "available_stock")?, "available_stock")?,
        to_u32(column(row, "reserved_stock")?, "reserved_stock")?,
    )
    .map_err(|e| StoreError::Corrupt(format!("product {id}: {e}")))?;

    Ok(Product::restore(
        ProductId::from_uuid(id),
        column(row, "name")?,
        price,
        stock,
        column(row, "created_at")?,
        column(row, "updated_at")?,
    ))
}

fn reservation_from_row(row: &PgRow) -> Result<Reservation, StoreError> {
    let user_id: Option<Uuid> = column(row, "user_id")?;
    let product_id: Uuid = column(row, "product_id")?;
    Ok(Reservation::restore(
        ReservationId::from_uuid(column(row, "id")?),
        user_id.map(UserId::from_uuid),
        ProductId::from_uuid(product_id),
        to_u32(column(row, "quantity")?, "quantity")?,
        column(row, "expires_at")?,
        column(row, "created_at")?,
        column(row, "updated_at")?,
    ))
}

fn order_from_row(row: &PgRow) -> Result<Order, StoreError> {
    let id: Uuid = column(row, "id")?;
    let user_id: Option<Uuid> = column(row, "user_id")?;
    let product_id: Uuid = column(row, "product_id")?;
    let total: Decimal = column(row, "total")?;
    let total = Money::new(total).map_err(|e| StoreError::Corrupt(format!("order {id}: {e}")))?;
    let status: String = column(row, "status")?;
    let status: OrderStatus = status
        .parse()
        .map_err(|e| StoreError::Corrupt(format!("order {id}: {e}")))?;

    Ok(Order::restore(
        OrderId::from_uuid(id),
        user_id.map(UserId::from_uuid),
        ProductId::from_uuid(product_id),
        to_u32(column(row, "quantity")?, "quantity")?,
        total,
        status,
        column(row, "created_at")?,
        column(row, "updated_at")?,
    ))
}

fn audit_from_row(row: &PgRow) -> Result<AuditEntry, StoreError> {
    Ok(AuditEntry::restore(
        AuditEntryId::from_uuid(column(row, "id")?),
        column(row, "actor")?,
        column(row, "action")?,
        column(row, "object_type")?,
        column(row, "object_id")?,
        column(row, "old_value")?,
        column(row, "new_value")?,
        column(row, "timestamp")?,
    ))
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("55P03") | Some("40P01") => StoreError::LockTimeout(msg),
                Some("23505") => StoreError::Conflict(msg),
                Some("23514") | Some("23503") | Some("23502") => StoreError::Constraint(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("decode error in {operation}: {err}"))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}
