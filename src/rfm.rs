use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::error::DashboardError;
use crate::models::{CustomerRank, OrderRecord};

pub const DEFAULT_LIMIT: usize = 5;

/// Latest purchase across `records`, or `None` when there are none.
///
/// Call this on the unfiltered dataset so that recency does not move when
/// the records being ranked are narrowed down.
pub fn global_max_timestamp<'a, I>(records: I) -> Option<NaiveDateTime>
where
    I: IntoIterator<Item = &'a OrderRecord>,
{
    records
        .into_iter()
        .map(|record| record.order_purchase_timestamp)
        .max()
}

/// Ranks customers by recency (ascending), frequency and monetary value
/// (both descending) and keeps the first `limit`.
///
/// Customers tied on all three keys are ordered by `customer_id`.
pub fn rank_top_customers<'a, I>(
    records: I,
    reference: NaiveDateTime,
    limit: usize,
) -> Result<Vec<CustomerRank>, DashboardError>
where
    I: IntoIterator<Item = &'a OrderRecord>,
{
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut ranks: Vec<CustomerRank> = Vec::new();

    for record in records {
        if record.order_purchase_timestamp > reference {
            return Err(DashboardError::AfterReference {
                customer_id: record.customer_id.clone(),
                purchased_at: record.order_purchase_timestamp,
                reference,
            });
        }

        let index = *positions
            .entry(record.customer_id.as_str())
            .or_insert_with(|| {
                ranks.push(CustomerRank {
                    customer_id: record.customer_id.clone(),
                    last_purchase: record.order_purchase_timestamp,
                    frequency: 0,
                    monetary: 0.0,
                    recency: 0,
                });
                ranks.len() - 1
            });

        let entry = &mut ranks[index];
        entry.last_purchase = entry.last_purchase.max(record.order_purchase_timestamp);
        entry.frequency += 1;
        entry.monetary += record.price;
    }

    for entry in ranks.iter_mut() {
        entry.recency = (reference - entry.last_purchase).num_days();
    }

    ranks.sort_by(|a, b| {
        a.recency
            .cmp(&b.recency)
            .then_with(|| b.frequency.cmp(&a.frequency))
            .then_with(|| b.monetary.total_cmp(&a.monetary))
            .then_with(|| a.customer_id.cmp(&b.customer_id))
    });
    ranks.truncate(limit);

    Ok(ranks)
}
