use async_trait::async_trait;
use bigdecimal::BigDecimal;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel_async::{pooled_connection::bb8::Pool, AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::Deserialize;
use shared::*;
use std::collections::HashMap;
use std::fmt::Display;
use uuid::Uuid;

use crate::models::*;
use crate::schema::*;

pub type DbPool = Pool<AsyncPgConnection>;

/// A change applied to a loaded order before it is written back.
pub type OrderMutation = Box<dyn FnOnce(&mut Order) -> Result<(), ServiceError> + Send>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct OrderFilter {
    pub user_id: Option<i64>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        self.user_id.map_or(true, |user_id| order.user_id == user_id)
            && self.status.map_or(true, |status| order.status == status)
    }
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Stores the order and its line items as one unit.
    async fn insert(&self, order: &Order) -> Result<(), ServiceError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, ServiceError>;

    /// Loads, mutates and writes back one order atomically.
    ///
    /// Nothing is written when the mutation fails. Fails with `NotFound` for unknown ids.
    async fn update(&self, id: Uuid, mutation: OrderMutation) -> Result<Order, ServiceError>;

    async fn list(&self, filter: OrderFilter, page: PageRequest)
        -> Result<Page<Order>, ServiceError>;

    async fn count_by_status(&self) -> Result<Vec<(OrderStatus, u64)>, ServiceError>;

    /// Sum of `total_amount` over delivered orders, `None` when there are none.
    async fn delivered_revenue(&self) -> Result<Option<BigDecimal>, ServiceError>;
}

fn pool_error(e: impl Display) -> ServiceError {
    ServiceError::Database(format!("Connection pool error: {}", e))
}

fn filtered(filter: &OrderFilter) -> orders::BoxedQuery<'static, Pg> {
    let mut query = orders::table.into_boxed();
    if let Some(user_id) = filter.user_id {
        query = query.filter(orders::user_id.eq(user_id));
    }
    if let Some(status) = filter.status {
        query = query.filter(orders::status.eq(status.as_str()));
    }
    query
}

pub struct PgOrderRepository {
    pool: DbPool,
}

impl PgOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), ServiceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let order_row = OrderRow::from_order(order);
        let item_rows = OrderItemRow::from_order(order);
        conn.transaction::<_, ServiceError, _>(|conn| {
            Box::pin(async move {
                diesel::insert_into(orders::table)
                    .values(&order_row)
                    .execute(conn)
                    .await?;

                diesel::insert_into(order_items::table)
                    .values(&item_rows)
                    .execute(conn)
                    .await?;

                Ok(())
            })
        })
        .await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, ServiceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let row = orders::table
            .find(id)
            .select(OrderRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        let Some(row) = row else {
            return Ok(None);
        };

        let items = order_items::table
            .filter(order_items::order_id.eq(id))
            .select(OrderItemRow::as_select())
            .load(&mut conn)
            .await?;

        row.into_order(items).map(Some)
    }

    async fn update(&self, id: Uuid, mutation: OrderMutation) -> Result<Order, ServiceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        conn.transaction::<_, ServiceError, _>(|conn| {
            Box::pin(async move {
                let row = orders::table
                    .find(id)
                    .select(OrderRow::as_select())
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?
                    .ok_or_else(|| ServiceError::not_found("Order", id))?;

                let items = order_items::table
                    .filter(order_items::order_id.eq(id))
                    .select(OrderItemRow::as_select())
                    .load(conn)
                    .await?;

                let mut order = row.into_order(items)?;
                mutation(&mut order)?;

                diesel::update(orders::table.find(id))
                    .set(OrderTransition::from(&order))
                    .execute(conn)
                    .await?;

                Ok(order)
            })
        })
        .await
    }

    async fn list(
        &self,
        filter: OrderFilter,
        page: PageRequest,
    ) -> Result<Page<Order>, ServiceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let total: i64 = filtered(&filter).count().get_result(&mut conn).await?;

        let query = match page.sort_dir {
            SortDirection::Asc => filtered(&filter).order(orders::order_date.asc()),
            SortDirection::Desc => filtered(&filter).order(orders::order_date.desc()),
        };
        let rows = query
            .select(OrderRow::as_select())
            .limit(page.limit())
            .offset(page.offset())
            .load(&mut conn)
            .await?;

        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let item_rows = order_items::table
            .filter(order_items::order_id.eq_any(&ids))
            .select(OrderItemRow::as_select())
            .load(&mut conn)
            .await?;

        let mut items_by_order: HashMap<Uuid, Vec<OrderItemRow>> = HashMap::new();
        for item in item_rows {
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        let orders = rows
            .into_iter()
            .map(|row| {
                let items = items_by_order.remove(&row.id).unwrap_or_default();
                row.into_order(items)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(orders, page, total as u64))
    }

    async fn count_by_status(&self) -> Result<Vec<(OrderStatus, u64)>, ServiceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let counts: Vec<(String, i64)> = orders::table
            .group_by(orders::status)
            .select((orders::status, diesel::dsl::count_star()))
            .load(&mut conn)
            .await?;

        counts
            .into_iter()
            .map(|(status, count)| {
                let status = status.parse::<OrderStatus>().map_err(|_| {
                    ServiceError::Database(format!("Corrupt order status: {}", status))
                })?;
                Ok((status, count as u64))
            })
            .collect()
    }

    async fn delivered_revenue(&self) -> Result<Option<BigDecimal>, ServiceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let revenue: Option<BigDecimal> = orders::table
            .filter(orders::status.eq(OrderStatus::Delivered.as_str()))
            .select(diesel::dsl::sum(orders::total_amount))
            .first(&mut conn)
            .await?;

        Ok(revenue)
    }
}
