//! Domain types shared by the order and notification services.

mod clock;
mod error;
mod order;
mod paging;
mod reminder;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{bounded, ServiceError};
pub use order::{
    NewOrder, Order, OrderLineItem, OrderStatistics, OrderStatus, PaymentStatus,
};
pub use paging::{Page, PageRequest, SortDirection, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use reminder::{
    truncate_to_minute, Reminder, ReminderRequest, ReminderStatistics, DEFAULT_INSTRUCTION,
    DEFAULT_NOTES,
};

use serde::{Deserialize, Serialize};

/// JSON body returned with every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// JSON body for operations that return no entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
