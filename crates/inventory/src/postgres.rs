//! PostgreSQL-backed stores.
//!
//! Every operation runs in one database transaction. Resource rows are
//! locked with `SELECT ... FOR UPDATE` before their capacity changes; an
//! error or a dropped future rolls the transaction back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::TransactionId;
use messaging::{FlightRequest, HotelRequest};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use tracing::debug;
use uuid::Uuid;

use crate::{
    ConfirmOutcome, Flight, Hold, InventoryStore, ReleaseOutcome, ReserveOutcome, ResourceTable,
    Result, Room, model::validate_units,
};

/// Table names of one resource kind and its holds.
struct Tables {
    resources: &'static str,
    holds: &'static str,
    resource_fk: &'static str,
}

const FLIGHT_TABLES: Tables = Tables {
    resources: "flights",
    holds: "flight_bookings",
    resource_fk: "flight_id",
};

const ROOM_TABLES: Tables = Tables {
    resources: "rooms",
    holds: "room_bookings",
    resource_fk: "room_id",
};

impl Tables {
    fn row_to_hold(&self, row: &PgRow) -> Result<Hold> {
        Ok(Hold {
            transaction_id: TransactionId::from_uuid(row.try_get::<Uuid, _>("transaction_id")?),
            resource_id: row.try_get(self.resource_fk)?,
            temporary: row.try_get("temporary")?,
            temporary_at: row.try_get("temporary_at")?,
            reserved_amount: row.try_get("reserved_amount")?,
        })
    }

    async fn find_hold(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        transaction_id: TransactionId,
    ) -> Result<Option<Hold>> {
        let sql = format!(
            "SELECT transaction_id, {fk}, temporary, temporary_at, reserved_amount
             FROM {holds} WHERE transaction_id = $1 FOR UPDATE",
            fk = self.resource_fk,
            holds = self.holds,
        );
        let row = sqlx::query(&sql)
            .bind(transaction_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await?;
        row.as_ref().map(|r| self.row_to_hold(r)).transpose()
    }

    async fn adjust_capacity(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        resource_id: Uuid,
        delta: i32,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE {resources} SET amount = amount + $2 WHERE id = $1",
            resources = self.resources,
        );
        sqlx::query(&sql)
            .bind(resource_id)
            .bind(delta)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn confirm(&self, pool: &PgPool, transaction_id: TransactionId) -> Result<ConfirmOutcome> {
        let mut tx = pool.begin().await?;
        let sql = format!(
            "UPDATE {holds} SET temporary = FALSE WHERE transaction_id = $1
             RETURNING transaction_id, {fk}, temporary, temporary_at, reserved_amount",
            holds = self.holds,
            fk = self.resource_fk,
        );
        let row = sqlx::query(&sql)
            .bind(transaction_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;

        match row {
            Some(row) => {
                let hold = self.row_to_hold(&row)?;
                tx.commit().await?;
                Ok(ConfirmOutcome::Confirmed(hold))
            }
            None => {
                tx.rollback().await?;
                Ok(ConfirmOutcome::NoHold)
            }
        }
    }

    async fn release(&self, pool: &PgPool, transaction_id: TransactionId) -> Result<ReleaseOutcome> {
        let mut tx = pool.begin().await?;
        let sql = format!(
            "DELETE FROM {holds} WHERE transaction_id = $1
             RETURNING transaction_id, {fk}, temporary, temporary_at, reserved_amount",
            holds = self.holds,
            fk = self.resource_fk,
        );
        let row = sqlx::query(&sql)
            .bind(transaction_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(ReleaseOutcome::NoHold);
        };

        let hold = self.row_to_hold(&row)?;
        self.adjust_capacity(&mut tx, hold.resource_id, hold.reserved_amount)
            .await?;
        tx.commit().await?;
        Ok(ReleaseOutcome::Released(hold))
    }

    async fn expire_holds(&self, pool: &PgPool, cutoff: DateTime<Utc>) -> Result<Vec<Hold>> {
        let mut tx = pool.begin().await?;
        let sql = format!(
            "DELETE FROM {holds} WHERE temporary AND temporary_at < $1
             RETURNING transaction_id, {fk}, temporary, temporary_at, reserved_amount",
            holds = self.holds,
            fk = self.resource_fk,
        );
        let rows = sqlx::query(&sql).bind(cutoff).fetch_all(&mut *tx).await?;

        let mut released = Vec::with_capacity(rows.len());
        for row in &rows {
            let hold = self.row_to_hold(row)?;
            self.adjust_capacity(&mut tx, hold.resource_id, hold.reserved_amount)
                .await?;
            released.push(hold);
        }

        tx.commit().await?;
        Ok(released)
    }

    async fn hold(&self, pool: &PgPool, transaction_id: TransactionId) -> Result<Option<Hold>> {
        let sql = format!(
            "SELECT transaction_id, {fk}, temporary, temporary_at, reserved_amount
             FROM {holds} WHERE transaction_id = $1",
            fk = self.resource_fk,
            holds = self.holds,
        );
        let row = sqlx::query(&sql)
            .bind(transaction_id.as_uuid())
            .fetch_optional(pool)
            .await?;
        row.as_ref().map(|r| self.row_to_hold(r)).transpose()
    }

    async fn capacity(&self, pool: &PgPool, resource_id: Uuid) -> Result<Option<i32>> {
        let sql = format!(
            "SELECT amount FROM {resources} WHERE id = $1",
            resources = self.resources
        );
        Ok(sqlx::query_scalar(&sql)
            .bind(resource_id)
            .fetch_optional(pool)
            .await?)
    }
}

/// Flight seats in PostgreSQL.
#[derive(Clone)]
pub struct PostgresFlightStore {
    pool: PgPool,
}

impl PostgresFlightStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Inserts a flight row.
    pub async fn insert_flight(&self, flight: &Flight) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO flights (id, city_from, city_to, departure, amount)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(flight.id)
        .bind(&flight.city_from)
        .bind(&flight.city_to)
        .bind(flight.departure)
        .bind(flight.amount)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for PostgresFlightStore {
    type Request = FlightRequest;

    fn table(&self) -> ResourceTable {
        ResourceTable::Flights
    }

    #[tracing::instrument(skip(self, request), fields(units = request.passenger_count))]
    async fn reserve(
        &self,
        transaction_id: TransactionId,
        request: &FlightRequest,
    ) -> Result<ReserveOutcome> {
        let units = validate_units(request)?;
        let mut tx = self.pool.begin().await?;

        if let Some(existing) = FLIGHT_TABLES.find_hold(&mut tx, transaction_id).await? {
            tx.commit().await?;
            return Ok(ReserveOutcome::Reserved(existing));
        }

        let flight_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM flights
            WHERE city_from = $1 AND city_to = $2 AND departure = $3 AND amount - $4 >= 0
            ORDER BY id
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(&request.city_from)
        .bind(&request.city_to)
        .bind(request.book_from)
        .bind(units)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(flight_id) = flight_id else {
            tx.rollback().await?;
            debug!(%transaction_id, "No flight with enough seats");
            return Ok(ReserveOutcome::Unavailable);
        };

        FLIGHT_TABLES
            .adjust_capacity(&mut tx, flight_id, -units)
            .await?;

        let hold = Hold {
            transaction_id,
            resource_id: flight_id,
            temporary: true,
            temporary_at: Utc::now(),
            reserved_amount: units,
        };
        sqlx::query(
            r#"
            INSERT INTO flight_bookings (transaction_id, flight_id, temporary, temporary_at, reserved_amount)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(transaction_id.as_uuid())
        .bind(hold.resource_id)
        .bind(hold.temporary)
        .bind(hold.temporary_at)
        .bind(hold.reserved_amount)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ReserveOutcome::Reserved(hold))
    }

    async fn confirm(&self, transaction_id: TransactionId) -> Result<ConfirmOutcome> {
        FLIGHT_TABLES.confirm(&self.pool, transaction_id).await
    }

    async fn release(&self, transaction_id: TransactionId) -> Result<ReleaseOutcome> {
        FLIGHT_TABLES.release(&self.pool, transaction_id).await
    }

    async fn expire_holds(&self, cutoff: DateTime<Utc>) -> Result<Vec<Hold>> {
        FLIGHT_TABLES.expire_holds(&self.pool, cutoff).await
    }

    async fn hold(&self, transaction_id: TransactionId) -> Result<Option<Hold>> {
        FLIGHT_TABLES.hold(&self.pool, transaction_id).await
    }

    async fn capacity(&self, resource_id: Uuid) -> Result<Option<i32>> {
        FLIGHT_TABLES.capacity(&self.pool, resource_id).await
    }
}

/// Hotel rooms in PostgreSQL.
#[derive(Clone)]
pub struct PostgresHotelStore {
    pool: PgPool,
}

impl PostgresHotelStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Inserts a room category row.
    pub async fn insert_room(&self, room: &Room) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rooms (id, city, name, min_people, max_people, amount)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(room.id)
        .bind(&room.city)
        .bind(&room.name)
        .bind(room.min_people)
        .bind(room.max_people)
        .bind(room.amount)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for PostgresHotelStore {
    type Request = HotelRequest;

    fn table(&self) -> ResourceTable {
        ResourceTable::Rooms
    }

    #[tracing::instrument(skip(self, request), fields(units = request.rooms))]
    async fn reserve(
        &self,
        transaction_id: TransactionId,
        request: &HotelRequest,
    ) -> Result<ReserveOutcome> {
        let units = validate_units(request)?;
        let mut tx = self.pool.begin().await?;

        if let Some(existing) = ROOM_TABLES.find_hold(&mut tx, transaction_id).await? {
            tx.commit().await?;
            return Ok(ReserveOutcome::Reserved(existing));
        }

        let room_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM rooms
            WHERE city = $1 AND name = $2 AND amount - $3 >= 0
            ORDER BY id
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(&request.city)
        .bind(&request.room_type)
        .bind(units)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(room_id) = room_id else {
            tx.rollback().await?;
            debug!(%transaction_id, "No room of the requested type left");
            return Ok(ReserveOutcome::Unavailable);
        };

        ROOM_TABLES.adjust_capacity(&mut tx, room_id, -units).await?;

        let hold = Hold {
            transaction_id,
            resource_id: room_id,
            temporary: true,
            temporary_at: Utc::now(),
            reserved_amount: units,
        };
        sqlx::query(
            r#"
            INSERT INTO room_bookings (transaction_id, room_id, book_from, book_to, temporary, temporary_at, reserved_amount)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(transaction_id.as_uuid())
        .bind(hold.resource_id)
        .bind(request.book_from)
        .bind(request.book_to)
        .bind(hold.temporary)
        .bind(hold.temporary_at)
        .bind(hold.reserved_amount)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ReserveOutcome::Reserved(hold))
    }

    async fn confirm(&self, transaction_id: TransactionId) -> Result<ConfirmOutcome> {
        ROOM_TABLES.confirm(&self.pool, transaction_id).await
    }

    async fn release(&self, transaction_id: TransactionId) -> Result<ReleaseOutcome> {
        ROOM_TABLES.release(&self.pool, transaction_id).await
    }

    async fn expire_holds(&self, cutoff: DateTime<Utc>) -> Result<Vec<Hold>> {
        ROOM_TABLES.expire_holds(&self.pool, cutoff).await
    }

    async fn hold(&self, transaction_id: TransactionId) -> Result<Option<Hold>> {
        ROOM_TABLES.hold(&self.pool, transaction_id).await
    }

    async fn capacity(&self, resource_id: Uuid) -> Result<Option<i32>> {
        ROOM_TABLES.capacity(&self.pool, resource_id).await
    }
}
