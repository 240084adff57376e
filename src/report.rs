use std::fmt::Write;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::DashboardError;
use crate::metrics;
use crate::models::{CustomerRank, MonthlyOrders, Overview, ScopedOrders, ValueCount};
use crate::rfm;

const TOP_CATEGORY_COUNT: usize = 10;

/// Every figure shown on the dashboard for one state selection.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub scope: String,
    pub reference: Option<NaiveDateTime>,
    pub overview: Overview,
    pub monthly_orders: Vec<MonthlyOrders>,
    pub top_categories: Vec<ValueCount>,
    pub payment_methods: Vec<ValueCount>,
    pub customers_by_state: Vec<ValueCount>,
    pub best_customers: Vec<CustomerRank>,
}

pub fn scope_label(states: &[String]) -> String {
    if states.is_empty() {
        "all states".to_string()
    } else {
        states.join(", ")
    }
}

/// Best customers for the scoped records. An empty dataset has no reference
/// time and yields no ranking.
pub fn best_customers(
    scoped: &ScopedOrders,
    limit: usize,
) -> Result<Vec<CustomerRank>, DashboardError> {
    match scoped.reference {
        Some(reference) => rfm::rank_top_customers(&scoped.records, reference, limit),
        None => Ok(Vec::new()),
    }
}

pub fn build_dashboard(
    scope: String,
    scoped: &ScopedOrders,
    limit: usize,
) -> Result<Dashboard, DashboardError> {
    let records = &scoped.records;

    Ok(Dashboard {
        scope,
        reference: scoped.reference,
        overview: metrics::overview(records),
        monthly_orders: metrics::monthly_orders(records),
        top_categories: metrics::top_categories(records, TOP_CATEGORY_COUNT),
        payment_methods: metrics::payment_methods(records),
        customers_by_state: metrics::customers_by_state(records),
        best_customers: best_customers(scoped, limit)?,
    })
}

pub fn render_markdown(dashboard: &Dashboard) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# E-commerce Dashboard");
    let _ = writeln!(output, "Generated for {}", dashboard.scope);
    if let Some(reference) = dashboard.reference {
        let _ = writeln!(output, "Recency measured against {reference}");
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Transactions: {}", dashboard.overview.total_orders);
    let _ = writeln!(
        output,
        "- Revenue: {}",
        format_currency(dashboard.overview.total_revenue)
    );
    let _ = writeln!(output, "- Customers: {}", dashboard.overview.total_customers);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Monthly Orders");
    if dashboard.monthly_orders.is_empty() {
        let _ = writeln!(output, "No orders in this selection.");
    } else {
        for month in &dashboard.monthly_orders {
            let _ = writeln!(output, "- {}: {} line items", month.month, month.orders);
        }
    }

    write_counts(&mut output, "Top Product Categories", &dashboard.top_categories);
    write_counts(&mut output, "Payment Methods", &dashboard.payment_methods);
    write_counts(&mut output, "Customers by State", &dashboard.customers_by_state);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Best Customers (RFM)");
    if dashboard.best_customers.is_empty() {
        let _ = writeln!(output, "No customers in this selection.");
    } else {
        let _ = writeln!(
            output,
            "| Customer | Last purchase | Recency (days) | Frequency | Monetary |"
        );
        let _ = writeln!(output, "|---|---|---|---|---|");
        for rank in &dashboard.best_customers {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {:.2} |",
                rank.customer_id, rank.last_purchase, rank.recency, rank.frequency, rank.monetary
            );
        }
    }

    output
}

/// Dollar amount with two decimals and comma-grouped thousands.
pub fn format_currency(amount: f64) -> String {
    let formatted = format!("{:.2}", amount.abs());
    let (whole, fraction) = formatted
        .split_once('.')
        .unwrap_or((formatted.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 && formatted != "0.00" { "-" } else { "" };
    format!("{sign}${grouped}.{fraction}")
}

fn write_counts(output: &mut String, title: &str, counts: &[ValueCount]) {
    let _ = writeln!(output);
    let _ = writeln!(output, "## {title}");

    if counts.is_empty() {
        let _ = writeln!(output, "No data in this selection.");
        return;
    }

    for entry in counts {
        let _ = writeln!(output, "- {}: {}", entry.value, entry.count);
    }
}
