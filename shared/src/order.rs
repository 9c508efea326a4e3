use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::ServiceError;

/// Digits kept after the decimal point for prices and totals, matching `NUMERIC(12, 2)`.
const MONEY_SCALE: i64 = 2;

/// Amounts must stay below this to fit `NUMERIC(12, 2)`.
fn money_limit() -> BigDecimal {
    BigDecimal::from(10_000_000_000i64)
}

fn fits_money_column(amount: &BigDecimal) -> bool {
    amount.with_scale(MONEY_SCALE) == *amount && *amount < money_limit()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Shipped and delivered orders have left the pharmacy and can no longer be cancelled.
    pub fn is_cancellable(&self) -> bool {
        !matches!(self, OrderStatus::Shipped | OrderStatus::Delivered)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ServiceError::ValidationError(format!("Unknown order status: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 4] = [
        PaymentStatus::Pending,
        PaymentStatus::Paid,
        PaymentStatus::Failed,
        PaymentStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ServiceError::ValidationError(format!("Unknown payment status: {}", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub medicine_id: i64,
    pub medicine_name: String,
    pub quantity: i32,
    pub price: BigDecimal,
}

impl OrderLineItem {
    pub fn subtotal(&self) -> BigDecimal {
        &self.price * BigDecimal::from(self.quantity)
    }
}

/// Input for placing an order.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub user_id: i64,
    pub items: Vec<OrderLineItem>,
    pub shipping_address: String,
    pub payment_method: Option<String>,
    pub prescription_url: Option<String>,
    pub notes: Option<String>,
}

impl NewOrder {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "Order items cannot be empty".to_string(),
            ));
        }
        if self.shipping_address.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Shipping address is required".to_string(),
            ));
        }
        for item in &self.items {
            if item.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "Quantity must be positive for medicine {}, got {}",
                    item.medicine_id, item.quantity
                )));
            }
            if item.price < BigDecimal::zero() {
                return Err(ServiceError::ValidationError(format!(
                    "Price cannot be negative for medicine {}",
                    item.medicine_id
                )));
            }
            if !fits_money_column(&item.price) {
                return Err(ServiceError::ValidationError(format!(
                    "Price for medicine {} must have at most {} decimal places \
                     and be below {}, got {}",
                    item.medicine_id,
                    MONEY_SCALE,
                    money_limit(),
                    item.price
                )));
            }
            if item.medicine_name.trim().is_empty() {
                return Err(ServiceError::ValidationError(format!(
                    "Medicine name is required for medicine {}",
                    item.medicine_id
                )));
            }
        }
        let total = self.total_amount();
        if total >= money_limit() {
            return Err(ServiceError::ValidationError(format!(
                "Order total {} exceeds the maximum of {}",
                total,
                money_limit()
            )));
        }
        Ok(())
    }

    pub fn total_amount(&self) -> BigDecimal {
        self.items
            .iter()
            .map(OrderLineItem::subtotal)
            .fold(BigDecimal::zero(), |acc, subtotal| acc + subtotal)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: i64,
    pub items: Vec<OrderLineItem>,
    pub total_amount: BigDecimal,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub shipping_address: String,
    pub payment_method: Option<String>,
    pub prescription_url: Option<String>,
    pub notes: Option<String>,
    pub order_date: DateTime<Utc>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Validates the request and builds a PENDING/PENDING order with its total fixed.
    pub fn place(request: NewOrder, now: DateTime<Utc>) -> Result<Self, ServiceError> {
        request.validate()?;
        let total_amount = request.total_amount();

        Ok(Self {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            items: request.items,
            total_amount,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            shipping_address: request.shipping_address,
            payment_method: request.payment_method,
            prescription_url: request.prescription_url,
            notes: request.notes,
            order_date: now,
            delivery_date: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Unguarded: any status may follow any other.
    pub fn apply_status(&mut self, status: OrderStatus, now: DateTime<Utc>) {
        self.status = status;
        if status == OrderStatus::Delivered {
            self.delivery_date = Some(now);
        }
        self.updated_at = now;
    }

    pub fn apply_payment_status(&mut self, payment_status: PaymentStatus, now: DateTime<Utc>) {
        self.payment_status = payment_status;
        if payment_status == PaymentStatus::Paid && self.status == OrderStatus::Pending {
            self.status = OrderStatus::Confirmed;
        }
        self.updated_at = now;
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), ServiceError> {
        if !self.status.is_cancellable() {
            return Err(ServiceError::InvalidTransition(format!(
                "Cannot cancel order that has been shipped or delivered (order {} is {})",
                self.id, self.status
            )));
        }
        self.status = OrderStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatistics {
    pub total_orders: u64,
    pub pending_orders: u64,
    pub confirmed_orders: u64,
    pub processing_orders: u64,
    pub shipped_orders: u64,
    pub delivered_orders: u64,
    pub cancelled_orders: u64,
    pub total_revenue: BigDecimal,
}

impl OrderStatistics {
    /// Builds the statistics from per-status counts and the delivered revenue sum.
    pub fn from_counts(
        counts: impl IntoIterator<Item = (OrderStatus, u64)>,
        delivered_revenue: Option<BigDecimal>,
    ) -> Self {
        let mut stats = OrderStatistics {
            total_orders: 0,
            pending_orders: 0,
            confirmed_orders: 0,
            processing_orders: 0,
            shipped_orders: 0,
            delivered_orders: 0,
            cancelled_orders: 0,
            total_revenue: delivered_revenue.unwrap_or_else(BigDecimal::zero),
        };
        for (status, count) in counts {
            stats.total_orders += count;
            let slot = match status {
                OrderStatus::Pending => &mut stats.pending_orders,
                OrderStatus::Confirmed => &mut stats.confirmed_orders,
                OrderStatus::Processing => &mut stats.processing_orders,
                OrderStatus::Shipped => &mut stats.shipped_orders,
                OrderStatus::Delivered => &mut stats.delivered_orders,
                OrderStatus::Cancelled => &mut stats.cancelled_orders,
            };
            *slot += count;
        }
        stats
    }
}
