use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    Accepted,
    Delivered,
    Returned,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Accepted => "accepted",
            OrderState::Delivered => "delivered",
            OrderState::Returned => "returned",
        }
    }
}

impl TryFrom<&str> for OrderState {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "accepted" => Ok(OrderState::Accepted),
            "delivered" => Ok(OrderState::Delivered),
            "returned" => Ok(OrderState::Returned),
            other => Err(format!("unknown order state '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    Bag,
    Box,
    Film,
}

impl PackageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageType::Bag => "bag",
            PackageType::Box => "box",
            PackageType::Film => "film",
        }
    }
}

impl TryFrom<&str> for PackageType {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "bag" => Ok(PackageType::Bag),
            "box" => Ok(PackageType::Box),
            "film" => Ok(PackageType::Film),
            other => Err(format!("unknown package type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WrapperType {
    Film,
}

impl WrapperType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WrapperType::Film => "film",
        }
    }
}

impl TryFrom<&str> for WrapperType {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "film" => Ok(WrapperType::Film),
            other => Err(format!("unknown wrapper type '{other}'")),
        }
    }
}

/// A parcel held at the pickup point.
///
/// `id` is caller-assigned; everything else is owned by the order service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub customer_id: i64,
    pub state: OrderState,
    pub weight: Decimal,
    pub cost: Decimal,
    pub package_type: Option<PackageType>,
    pub wrapper: Option<WrapperType>,
    pub deadline_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
}

/// Row shape of the outer-joined orders read: enum columns come back as the
/// reference-table names.
#[derive(Debug, FromRow)]
pub struct OrderRow {
    pub id: i64,
    pub customer_id: i64,
    pub state: String,
    pub weight: Decimal,
    pub cost: Decimal,
    pub package_type: Option<String>,
    pub wrapper: Option<String>,
    pub deadline_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = String;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let state = OrderState::try_from(row.state.as_str())?;
        let package_type = row
            .package_type
            .as_deref()
            .map(PackageType::try_from)
            .transpose()?;
        let wrapper = row
            .wrapper
            .as_deref()
            .map(WrapperType::try_from)
            .transpose()?;

        Ok(Order {
            id: row.id,
            customer_id: row.customer_id,
            state,
            weight: row.weight,
            cost: row.cost,
            package_type,
            wrapper,
            deadline_at: row.deadline_at,
            updated_at: row.updated_at,
            delivered_at: row.delivered_at,
            returned_at: row.returned_at,
        })
    }
}
