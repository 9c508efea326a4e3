use shared::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::repository::{OrderFilter, OrderRepository};

/// Owns every legal change to an order's status and payment status.
#[derive(Clone)]
pub struct OrderLifecycleManager {
    repo: Arc<dyn OrderRepository>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl OrderLifecycleManager {
    pub fn new(repo: Arc<dyn OrderRepository>, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self {
            repo,
            clock,
            timeout,
        }
    }

    pub async fn create_order(&self, request: NewOrder) -> Result<Order, ServiceError> {
        let order = Order::place(request, self.clock.now())?;
        bounded(self.timeout, self.repo.insert(&order)).await?;

        info!(
            "Order {} created for user {} with total {}",
            order.id, order.user_id, order.total_amount
        );
        Ok(order)
    }

    pub async fn get_order(&self, id: Uuid) -> Result<Order, ServiceError> {
        bounded(self.timeout, self.repo.find_by_id(id))
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", id))
    }

    pub async fn list_orders(
        &self,
        filter: OrderFilter,
        page: PageRequest,
    ) -> Result<Page<Order>, ServiceError> {
        bounded(self.timeout, self.repo.list(filter, page)).await
    }

    pub async fn set_status(&self, id: Uuid, status: OrderStatus) -> Result<Order, ServiceError> {
        let now = self.clock.now();
        let order = bounded(
            self.timeout,
            self.repo.update(
                id,
                Box::new(move |order: &mut Order| {
                    order.apply_status(status, now);
                    Ok(())
                }),
            ),
        )
        .await?;

        info!("Order {} status set to {}", id, order.status);
        Ok(order)
    }

    pub async fn set_payment_status(
        &self,
        id: Uuid,
        payment_status: PaymentStatus,
    ) -> Result<Order, ServiceError> {
        let now = self.clock.now();
        let order = bounded(
            self.timeout,
            self.repo.update(
                id,
                Box::new(move |order: &mut Order| {
                    order.apply_payment_status(payment_status, now);
                    Ok(())
                }),
            ),
        )
        .await?;

        info!(
            "Order {} payment status set to {} (status {})",
            id, order.payment_status, order.status
        );
        Ok(order)
    }

    pub async fn cancel_order(&self, id: Uuid) -> Result<(), ServiceError> {
        let now = self.clock.now();
        let result = bounded(
            self.timeout,
            self.repo
                .update(id, Box::new(move |order: &mut Order| order.cancel(now))),
        )
        .await;

        match result {
            Ok(_) => {
                info!("Order {} cancelled", id);
                Ok(())
            }
            Err(e @ ServiceError::InvalidTransition(_)) => {
                warn!("Rejected cancellation of order {}: {}", id, e);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn statistics(&self) -> Result<OrderStatistics, ServiceError> {
        let counts = bounded(self.timeout, self.repo.count_by_status()).await?;
        let revenue = bounded(self.timeout, self.repo.delivered_revenue()).await?;
        Ok(OrderStatistics::from_counts(counts, revenue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryOrderRepository;
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;
    use chrono::{TimeZone, Utc};
    use num_traits::Zero;

    fn manager() -> (OrderLifecycleManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
        ));
        let manager = OrderLifecycleManager::new(
            Arc::new(MemoryOrderRepository::new()),
            clock.clone(),
            Duration::from_secs(1),
        );
        (manager, clock)
    }

    fn item(medicine_id: i64, quantity: i32, price: &str) -> OrderLineItem {
        OrderLineItem {
            medicine_id,
            medicine_name: format!("Medicine {}", medicine_id),
            quantity,
            price: price.parse().unwrap(),
        }
    }

    fn new_order(user_id: i64, items: Vec<OrderLineItem>) -> NewOrder {
        NewOrder {
            user_id,
            items,
            shipping_address: "221B Baker Street".to_string(),
            payment_method: Some("card".to_string()),
            prescription_url: None,
            notes: None,
        }
    }

    async fn placed(manager: &OrderLifecycleManager) -> Order {
        manager
            .create_order(new_order(1, vec![item(1, 2, "5.00"), item(2, 1, "3.50")]))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_order_computes_total_and_persists() {
        let (manager, clock) = manager();
        let order = placed(&manager).await;

        assert_eq!(order.total_amount, "13.50".parse::<BigDecimal>().unwrap());
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.order_date, clock.now());

        let stored = manager.get_order(order.id).await.unwrap();
        assert_eq!(stored, order);
    }

    #[tokio::test]
    async fn invalid_orders_are_not_persisted() {
        let (manager, _) = manager();
        let result = manager.create_order(new_order(1, vec![])).await;
        assert!(matches!(result, Err(ServiceError::ValidationError(_))));

        let result = manager
            .create_order(new_order(1, vec![item(1, 0, "1.00")]))
            .await;
        assert!(matches!(result, Err(ServiceError::ValidationError(_))));

        let page = manager
            .list_orders(OrderFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total_elements, 0);
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let (manager, _) = manager();
        let id = Uuid::new_v4();
        assert!(matches!(
            manager.get_order(id).await,
            Err(ServiceError::NotFound { .. })
        ));
        assert!(matches!(
            manager.set_status(id, OrderStatus::Shipped).await,
            Err(ServiceError::NotFound { .. })
        ));
        assert!(matches!(
            manager.set_payment_status(id, PaymentStatus::Paid).await,
            Err(ServiceError::NotFound { .. })
        ));
        assert!(matches!(
            manager.cancel_order(id).await,
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn payment_confirms_pending_order_in_one_write() {
        let (manager, _) = manager();
        let order = placed(&manager).await;

        let updated = manager
            .set_payment_status(order.id, PaymentStatus::Paid)
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Confirmed);
        assert_eq!(updated.payment_status, PaymentStatus::Paid);

        let stored = manager.get_order(order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Confirmed);
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn payment_leaves_non_pending_status_alone() {
        let (manager, _) = manager();
        let order = placed(&manager).await;
        manager
            .set_status(order.id, OrderStatus::Processing)
            .await
            .unwrap();

        let updated = manager
            .set_payment_status(order.id, PaymentStatus::Paid)
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Processing);

        let refunded = manager
            .set_payment_status(order.id, PaymentStatus::Refunded)
            .await
            .unwrap();
        assert_eq!(refunded.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn set_status_is_unguarded_and_stamps_delivery() {
        let (manager, clock) = manager();
        let order = placed(&manager).await;

        let shipped = manager
            .set_status(order.id, OrderStatus::Shipped)
            .await
            .unwrap();
        assert!(shipped.delivery_date.is_none());

        clock.advance(chrono::Duration::days(2));
        let delivered = manager
            .set_status(order.id, OrderStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(delivered.delivery_date, Some(clock.now()));

        // Any status is reachable from any other through set_status.
        let back = manager
            .set_status(order.id, OrderStatus::Pending)
            .await
            .unwrap();
        assert_eq!(back.status, OrderStatus::Pending);
        assert_eq!(back.delivery_date, Some(clock.now()));

        let cancelled = manager
            .set_status(order.id, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_succeeds_before_shipping() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Cancelled,
        ] {
            let (manager, _) = manager();
            let order = placed(&manager).await;
            manager.set_status(order.id, status).await.unwrap();

            manager.cancel_order(order.id).await.unwrap();
            let stored = manager.get_order(order.id).await.unwrap();
            assert_eq!(stored.status, OrderStatus::Cancelled);
        }
    }

    #[tokio::test]
    async fn cancel_after_shipping_is_rejected() {
        for status in [OrderStatus::Shipped, OrderStatus::Delivered] {
            let (manager, _) = manager();
            let order = placed(&manager).await;
            manager.set_status(order.id, status).await.unwrap();

            let result = manager.cancel_order(order.id).await;
            match result {
                Err(ServiceError::InvalidTransition(message)) => {
                    assert!(message.contains("shipped or delivered"))
                }
                other => panic!("expected InvalidTransition, got {:?}", other),
            }
            let stored = manager.get_order(order.id).await.unwrap();
            assert_eq!(stored.status, status);
        }
    }

    #[tokio::test]
    async fn statistics_count_statuses_and_delivered_revenue() {
        let (manager, _) = manager();
        let stats = manager.statistics().await.unwrap();
        assert_eq!(stats.total_orders, 0);
        assert_eq!(stats.total_revenue, BigDecimal::zero());

        let delivered = placed(&manager).await;
        manager
            .set_status(delivered.id, OrderStatus::Delivered)
            .await
            .unwrap();
        let shipped = placed(&manager).await;
        manager
            .set_status(shipped.id, OrderStatus::Shipped)
            .await
            .unwrap();
        placed(&manager).await;

        let stats = manager.statistics().await.unwrap();
        assert_eq!(stats.total_orders, 3);
        assert_eq!(stats.pending_orders, 1);
        assert_eq!(stats.shipped_orders, 1);
        assert_eq!(stats.delivered_orders, 1);
        assert_eq!(stats.cancelled_orders, 0);
        assert_eq!(stats.total_revenue, "13.50".parse::<BigDecimal>().unwrap());
    }

    #[tokio::test]
    async fn list_filters_by_user_and_status() {
        let (manager, clock) = manager();
        for user_id in [1, 1, 2] {
            manager
                .create_order(new_order(user_id, vec![item(1, 1, "1.00")]))
                .await
                .unwrap();
            clock.advance(chrono::Duration::minutes(1));
        }

        let mine = manager
            .list_orders(
                OrderFilter {
                    user_id: Some(1),
                    status: None,
                },
                PageRequest::default(),
            )
            .await
            .unwrap();
        assert_eq!(mine.total_elements, 2);
        assert!(mine.content[0].order_date > mine.content[1].order_date);

        let pending_for_two = manager
            .list_orders(
                OrderFilter {
                    user_id: Some(2),
                    status: Some(OrderStatus::Pending),
                },
                PageRequest::default(),
            )
            .await
            .unwrap();
        assert_eq!(pending_for_two.total_elements, 1);

        let second_page = manager
            .list_orders(OrderFilter::default(), PageRequest::new(1, 2))
            .await
            .unwrap();
        assert_eq!(second_page.content.len(), 1);
        assert_eq!(second_page.total_pages, 2);
    }

    struct StalledRepository;

    #[async_trait]
    impl OrderRepository for StalledRepository {
        async fn insert(&self, _order: &Order) -> Result<(), ServiceError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
        async fn find_by_id(&self, _id: Uuid) -> Result<Option<Order>, ServiceError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(None)
        }
        async fn update(
            &self,
            id: Uuid,
            _mutation: crate::repository::OrderMutation,
        ) -> Result<Order, ServiceError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(ServiceError::not_found("Order", id))
        }
        async fn list(
            &self,
            _filter: OrderFilter,
            page: PageRequest,
        ) -> Result<Page<Order>, ServiceError> {
            Ok(Page::new(vec![], page, 0))
        }
        async fn count_by_status(&self) -> Result<Vec<(OrderStatus, u64)>, ServiceError> {
            Ok(vec![])
        }
        async fn delivered_revenue(&self) -> Result<Option<BigDecimal>, ServiceError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn stalled_persistence_times_out() {
        let limit = Duration::from_millis(20);
        let manager =
            OrderLifecycleManager::new(Arc::new(StalledRepository), Arc::new(SystemClock), limit);

        let result = manager
            .create_order(new_order(1, vec![item(1, 1, "1.00")]))
            .await;
        assert_eq!(result, Err(ServiceError::Timeout(limit)));

        let result = manager.set_status(Uuid::new_v4(), OrderStatus::Shipped).await;
        assert_eq!(result, Err(ServiceError::Timeout(limit)));
    }
}
