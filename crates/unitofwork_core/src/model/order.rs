//! Order entity.

use crate::model::customer::CustomerId;
use crate::model::ValidationError;
use crate::repo::{Entity, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type OrderId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "shipped" => Some(Self::Shipped),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    /// Minor currency units.
    pub total_cents: i64,
    pub status: OrderStatus,
}

impl Order {
    /// Creates a pending order with a generated id.
    pub fn new(customer_id: CustomerId, total_cents: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            total_cents,
            status: OrderStatus::Pending,
        }
    }
}

impl Entity for Order {
    const TABLE: &'static str = "orders";
    const KEY: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &["customer_id", "total_cents", "status"];

    fn key(&self) -> Value {
        Value::Text(self.id.to_string())
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.customer_id.to_string()),
            Value::Integer(self.total_cents),
            Value::Text(self.status.as_str().to_string()),
        ]
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        let id = parse_uuid(row, "id")?;
        let customer_id = parse_uuid(row, "customer_id")?;
        let status_text: String = row.get("status")?;
        let status = OrderStatus::parse(&status_text).ok_or_else(|| {
            RepoError::InvalidData(format!("invalid order status `{status_text}` in orders.status"))
        })?;
        Ok(Self {
            id,
            customer_id,
            total_cents: row.get("total_cents")?,
            status,
        })
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.total_cents < 0 {
            return Err(ValidationError::NegativeTotal(self.total_cents));
        }
        Ok(())
    }
}

fn parse_uuid(row: &Row<'_>, column: &str) -> RepoResult<Uuid> {
    let text: String = row.get(column)?;
    Uuid::parse_str(&text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{text}` in orders.{column}"))
    })
}
