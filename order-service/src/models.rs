use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared::*;
use uuid::Uuid;

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderRow {
    pub id: Uuid,
    pub user_id: i64,
    pub total_amount: BigDecimal,
    pub status: String,
    pub payment_status: String,
    pub shipping_address: String,
    pub payment_method: Option<String>,
    pub prescription_url: Option<String>,
    pub notes: Option<String>,
    pub order_date: DateTime<Utc>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::order_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderItemRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub position: i32,
    pub medicine_id: i64,
    pub medicine_name: String,
    pub quantity: i32,
    pub price: BigDecimal,
}

/// The columns an order transition may touch. Written in one `UPDATE`.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(treat_none_as_null = true)]
pub struct OrderTransition {
    pub status: String,
    pub payment_status: String,
    pub delivery_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRow {
    pub fn from_order(order: &Order) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            total_amount: order.total_amount.clone(),
            status: order.status.as_str().to_string(),
            payment_status: order.payment_status.as_str().to_string(),
            shipping_address: order.shipping_address.clone(),
            payment_method: order.payment_method.clone(),
            prescription_url: order.prescription_url.clone(),
            notes: order.notes.clone(),
            order_date: order.order_date,
            delivery_date: order.delivery_date,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }

    pub fn into_order(self, items: Vec<OrderItemRow>) -> Result<Order, ServiceError> {
        let status = self
            .status
            .parse::<OrderStatus>()
            .map_err(|_| ServiceError::Database(format!("Corrupt order status: {}", self.status)))?;
        let payment_status = self.payment_status.parse::<PaymentStatus>().map_err(|_| {
            ServiceError::Database(format!("Corrupt payment status: {}", self.payment_status))
        })?;

        let mut items = items;
        items.sort_by_key(|item| item.position);

        Ok(Order {
            id: self.id,
            user_id: self.user_id,
            items: items.into_iter().map(OrderItemRow::into_line_item).collect(),
            total_amount: self.total_amount,
            status,
            payment_status,
            shipping_address: self.shipping_address,
            payment_method: self.payment_method,
            prescription_url: self.prescription_url,
            notes: self.notes,
            order_date: self.order_date,
            delivery_date: self.delivery_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl OrderItemRow {
    pub fn from_order(order: &Order) -> Vec<Self> {
        order
            .items
            .iter()
            .enumerate()
            .map(|(position, item)| Self {
                id: Uuid::new_v4(),
                order_id: order.id,
                position: position as i32,
                medicine_id: item.medicine_id,
                medicine_name: item.medicine_name.clone(),
                quantity: item.quantity,
                price: item.price.clone(),
            })
            .collect()
    }

    fn into_line_item(self) -> OrderLineItem {
        OrderLineItem {
            medicine_id: self.medicine_id,
            medicine_name: self.medicine_name,
            quantity: self.quantity,
            price: self.price,
        }
    }
}

impl From<&Order> for OrderTransition {
    fn from(order: &Order) -> Self {
        Self {
            status: order.status.as_str().to_string(),
            payment_status: order.payment_status.as_str().to_string(),
            delivery_date: order.delivery_date,
            updated_at: order.updated_at,
        }
    }
}
