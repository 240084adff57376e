use chrono::NaiveDateTime;

/// Errors raised while turning rows into order records or ranking them.
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    /// A field could not be converted into its typed value.
    #[error("invalid {field} {value:?} on order {order_id}")]
    InvalidInput {
        order_id: String,
        field: &'static str,
        value: String,
    },

    /// A record is newer than the reference time recency is measured against.
    #[error(
        "purchase at {purchased_at} by customer {customer_id} is later than the reference time {reference}"
    )]
    AfterReference {
        customer_id: String,
        purchased_at: NaiveDateTime,
        reference: NaiveDateTime,
    },
}
