use std::path::Path;

use anyhow::Context;

use crate::models::{OrderRecord, RawOrderRow, ScopedOrders};
use crate::rfm;

/// Reads every line item of a CSV extract into typed records.
///
/// Columns are matched by header name; columns this crate does not use are
/// ignored. The first malformed row aborts the load.
pub fn load_csv(csv_path: &Path) -> anyhow::Result<Vec<OrderRecord>> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut records = Vec::new();

    for (index, result) in reader.deserialize::<RawOrderRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("malformed row at line {line}"))?;
        let record = OrderRecord::try_from(row)
            .with_context(|| format!("invalid order at line {line}"))?;
        records.push(record);
    }

    tracing::info!(
        path = %csv_path.display(),
        rows = records.len(),
        "loaded order extract"
    );
    Ok(records)
}

/// Keeps records whose customer state is selected. No selection keeps all.
pub fn filter_by_states(records: &[OrderRecord], states: &[String]) -> Vec<OrderRecord> {
    if states.is_empty() {
        return records.to_vec();
    }

    records
        .iter()
        .filter(|record| states.iter().any(|state| *state == record.customer_state))
        .cloned()
        .collect()
}

/// Takes the reference time from the full dataset, then applies the state filter.
pub fn scope_records(records: &[OrderRecord], states: &[String]) -> ScopedOrders {
    let reference = rfm::global_max_timestamp(records);
    let records = filter_by_states(records, states);
    tracing::debug!(
        states = ?states,
        kept = records.len(),
        ?reference,
        "scoped order records"
    );

    ScopedOrders { reference, records }
}
