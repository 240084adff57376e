use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Datelike;

use crate::models::{MonthlyOrders, OrderRecord, Overview, ValueCount};

pub fn overview(records: &[OrderRecord]) -> Overview {
    let orders: HashSet<&str> = records.iter().map(|r| r.order_id.as_str()).collect();
    let customers: HashSet<&str> = records.iter().map(|r| r.customer_id.as_str()).collect();

    Overview {
        total_orders: orders.len(),
        total_revenue: records.iter().map(|r| r.price).sum(),
        total_customers: customers.len(),
    }
}

/// Line items per calendar month, oldest month first.
pub fn monthly_orders(records: &[OrderRecord]) -> Vec<MonthlyOrders> {
    let mut months: BTreeMap<(i32, u32), usize> = BTreeMap::new();

    for record in records {
        let ts = record.order_purchase_timestamp;
        *months.entry((ts.year(), ts.month())).or_insert(0) += 1;
    }

    months
        .into_iter()
        .map(|((year, month), orders)| MonthlyOrders {
            month: format!("{year:04}-{month:02}"),
            orders,
        })
        .collect()
}

/// Counts the values picked by `selector`, most frequent first.
///
/// Records without a value are skipped. Equal counts keep first-seen order.
pub fn top_values<F>(
    records: &[OrderRecord],
    selector: F,
    limit: Option<usize>,
) -> Vec<ValueCount>
where
    F: Fn(&OrderRecord) -> Option<&str>,
{
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<ValueCount> = Vec::new();

    for record in records {
        let Some(value) = selector(record) else {
            continue;
        };
        let index = *positions.entry(value).or_insert_with(|| {
            counts.push(ValueCount {
                value: value.to_string(),
                count: 0,
            });
            counts.len() - 1
        });
        counts[index].count += 1;
    }

    counts.sort_by(|a, b| b.count.cmp(&a.count));
    if let Some(limit) = limit {
        counts.truncate(limit);
    }
    counts
}

pub fn top_categories(records: &[OrderRecord], limit: usize) -> Vec<ValueCount> {
    top_values(records, |r| r.product_category_name.as_deref(), Some(limit))
}

pub fn payment_methods(records: &[OrderRecord]) -> Vec<ValueCount> {
    top_values(records, |r| r.payment_type.as_deref(), None)
}

pub fn customers_by_state(records: &[OrderRecord]) -> Vec<ValueCount> {
    top_values(records, |r| Some(r.customer_state.as_str()), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(
        order_id: &str,
        customer_id: &str,
        date: (i32, u32, u32),
        category: Option<&str>,
    ) -> OrderRecord {
        OrderRecord {
            order_id: order_id.to_string(),
            customer_id: customer_id.to_string(),
            customer_state: if customer_id == "c3" { "RJ" } else { "SP" }.to_string(),
            order_purchase_timestamp: NaiveDate::from_ymd_opt(date.0, date.1, date.2)
                .and_then(|d| d.and_hms_opt(12, 0, 0))
                .unwrap(),
            price: 10.0,
            product_category_name: category.map(str::to_string),
            payment_type: Some("credit_card".to_string()),
        }
    }

    fn sample() -> Vec<OrderRecord> {
        vec![
            record("o1", "c1", (2018, 2, 1), Some("toys")),
            record("o1", "c1", (2018, 2, 1), Some("books")),
            record("o2", "c2", (2017, 12, 24), Some("books")),
            record("o3", "c3", (2018, 2, 20), None),
        ]
    }

    #[test]
    fn overview_counts_distinct_orders_and_customers() {
        let summary = overview(&sample());
        assert_eq!(summary.total_orders, 3);
        assert_eq!(summary.total_customers, 3);
        assert!((summary.total_revenue - 40.0).abs() < 1e-9);
    }

    #[test]
    fn monthly_orders_are_chronological() {
        let months = monthly_orders(&sample());
        assert_eq!(
            months,
            vec![
                MonthlyOrders {
                    month: "2017-12".to_string(),
                    orders: 1,
                },
                MonthlyOrders {
                    month: "2018-02".to_string(),
                    orders: 3,
                },
            ]
        );
    }

    #[test]
    fn categories_skip_missing_values_and_respect_limit() {
        let categories = top_categories(&sample(), 10);
        assert_eq!(
            categories[0],
            ValueCount {
                value: "books".to_string(),
                count: 2,
            }
        );
        assert_eq!(
            categories[1],
            ValueCount {
                value: "toys".to_string(),
                count: 1,
            }
        );
        assert_eq!(categories.len(), 2);

        assert_eq!(top_categories(&sample(), 1).len(), 1);
    }

    #[test]
    fn state_counts_keep_first_seen_order_on_ties() {
        let mut records = sample();
        records.pop();
        records.push(record("o4", "c3", (2018, 3, 1), None));
        records.push(record("o5", "c3", (2018, 3, 2), None));
        records.push(record("o6", "c3", (2018, 3, 3), None));

        let states = customers_by_state(&records);
        assert_eq!(states[0].value, "SP");
        assert_eq!(states[1].value, "RJ");
        assert_eq!(states[0].count, states[1].count);
    }

    #[test]
    fn empty_records_produce_empty_metrics() {
        assert_eq!(overview(&[]).total_orders, 0);
        assert!(monthly_orders(&[]).is_empty());
        assert!(payment_methods(&[]).is_empty());
    }
}
