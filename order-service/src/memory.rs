//! In-memory order store for local runs and tests. Nothing survives a restart.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use shared::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::repository::{OrderFilter, OrderMutation, OrderRepository};

#[derive(Clone, Default)]
pub struct MemoryOrderRepository {
    orders: Arc<RwLock<HashMap<Uuid, Order>>>,
}

impl MemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for MemoryOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), ServiceError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(ServiceError::Database(format!(
                "Duplicate order id: {}",
                order.id
            )));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, ServiceError> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id).cloned())
    }

    async fn update(&self, id: Uuid, mutation: OrderMutation) -> Result<Order, ServiceError> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(&id)
            .ok_or_else(|| ServiceError::not_found("Order", id))?;

        let mut order = stored.clone();
        mutation(&mut order)?;
        *stored = order.clone();
        Ok(order)
    }

    async fn list(
        &self,
        filter: OrderFilter,
        page: PageRequest,
    ) -> Result<Page<Order>, ServiceError> {
        let orders = self.orders.read().await;
        let mut matching: Vec<&Order> = orders.values().filter(|o| filter.matches(o)).collect();
        matching.sort_by(|a, b| a.order_date.cmp(&b.order_date).then(a.id.cmp(&b.id)));
        if page.sort_dir == SortDirection::Desc {
            matching.reverse();
        }

        let total = matching.len() as u64;
        let content = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .cloned()
            .collect();
        Ok(Page::new(content, page, total))
    }

    async fn count_by_status(&self) -> Result<Vec<(OrderStatus, u64)>, ServiceError> {
        let orders = self.orders.read().await;
        let mut counts: HashMap<OrderStatus, u64> = HashMap::new();
        for order in orders.values() {
            *counts.entry(order.status).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }

    async fn delivered_revenue(&self) -> Result<Option<BigDecimal>, ServiceError> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .filter(|o| o.status == OrderStatus::Delivered)
            .map(|o| o.total_amount.clone())
            .reduce(|acc, amount| acc + amount))
    }
}
