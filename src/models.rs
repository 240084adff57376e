use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::DashboardError;

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// One line item as it appears in the extract, before any conversion.
#[derive(Debug, Clone, Deserialize)]
pub struct RawOrderRow {
    pub order_id: String,
    pub customer_id: String,
    pub customer_state: String,
    pub order_purchase_timestamp: String,
    pub price: String,
    #[serde(default)]
    pub product_category_name: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub order_id: String,
    pub customer_id: String,
    pub customer_state: String,
    pub order_purchase_timestamp: NaiveDateTime,
    pub price: f64,
    pub product_category_name: Option<String>,
    pub payment_type: Option<String>,
}

impl TryFrom<RawOrderRow> for OrderRecord {
    type Error = DashboardError;

    fn try_from(row: RawOrderRow) -> Result<Self, Self::Error> {
        let order_purchase_timestamp =
            parse_timestamp(&row.order_purchase_timestamp).ok_or_else(|| {
                DashboardError::InvalidInput {
                    order_id: row.order_id.clone(),
                    field: "order_purchase_timestamp",
                    value: row.order_purchase_timestamp.clone(),
                }
            })?;
        let price = parse_price(&row.price).ok_or_else(|| DashboardError::InvalidInput {
            order_id: row.order_id.clone(),
            field: "price",
            value: row.price.clone(),
        })?;

        Ok(OrderRecord {
            order_id: row.order_id,
            customer_id: row.customer_id,
            customer_state: row.customer_state,
            order_purchase_timestamp,
            price,
            product_category_name: non_blank(row.product_category_name),
            payment_type: non_blank(row.payment_type),
        })
    }
}

/// Parses the timestamp layouts found in transaction extracts.
///
/// Offsets in RFC 3339 input are normalised to UTC. A bare date maps to midnight.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();

    for format in TIMESTAMP_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed);
        }
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.naive_utc());
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN))
}

fn parse_price(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|price| price.is_finite() && *price >= 0.0)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// A customer's position in the RFM ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerRank {
    pub customer_id: String,
    pub last_purchase: NaiveDateTime,
    pub frequency: usize,
    pub monetary: f64,
    pub recency: i64,
}

/// Records left after filtering, with the anchor taken from the full dataset.
#[derive(Debug, Clone, Default)]
pub struct ScopedOrders {
    pub reference: Option<NaiveDateTime>,
    pub records: Vec<OrderRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub total_orders: usize,
    pub total_revenue: f64,
    pub total_customers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyOrders {
    pub month: String,
    pub orders: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_row(timestamp: &str, price: &str) -> RawOrderRow {
        RawOrderRow {
            order_id: "o-1".to_string(),
            customer_id: "c-1".to_string(),
            customer_state: "SP".to_string(),
            order_purchase_timestamp: timestamp.to_string(),
            price: price.to_string(),
            product_category_name: Some("  ".to_string()),
            payment_type: Some("credit_card".to_string()),
        }
    }

    #[test]
    fn parses_supported_timestamp_layouts() {
        let expected = NaiveDate::from_ymd_opt(2017, 10, 2)
            .and_then(|d| d.and_hms_opt(10, 56, 33))
            .unwrap();

        assert_eq!(parse_timestamp("2017-10-02 10:56:33"), Some(expected));
        assert_eq!(parse_timestamp("2017-10-02T10:56:33"), Some(expected));
        assert_eq!(parse_timestamp("2017-10-02T12:56:33+02:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2017-10-02"),
            NaiveDate::from_ymd_opt(2017, 10, 2).map(|d| d.and_time(NaiveTime::MIN))
        );
        assert_eq!(parse_timestamp("02/10/2017"), None);
    }

    #[test]
    fn converts_valid_row() {
        let record = OrderRecord::try_from(raw_row("2024-01-10 08:00:00", " 19.90 ")).unwrap();
        assert_eq!(record.price, 19.9);
        assert_eq!(record.product_category_name, None);
        assert_eq!(record.payment_type.as_deref(), Some("credit_card"));
    }

    #[test]
    fn rejects_unparseable_timestamp() {
        let err = OrderRecord::try_from(raw_row("yesterday", "10")).unwrap_err();
        assert!(matches!(
            err,
            DashboardError::InvalidInput { field: "order_purchase_timestamp", .. }
        ));
    }

    #[test]
    fn rejects_non_numeric_or_negative_price() {
        for price in ["ten", "-1.0", "NaN", ""] {
            let err = OrderRecord::try_from(raw_row("2024-01-10", price)).unwrap_err();
            assert!(matches!(err, DashboardError::InvalidInput { field: "price", .. }));
        }
    }
}
