//! Data summarizer.
//!
//! Reduces a [`RecordSet`] to counts, numeric ranges, and categorical
//! breakdowns compact enough to embed in a prompt. Pure functions; an
//! empty input yields zeroed ranges, never an error.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::models::{Collection, DataSummary, NumericRange, Record, RecordSet};

/// Category label for records missing the breakdown field.
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Compute the [`DataSummary`] for a record set.
pub fn summarize(records: &RecordSet) -> DataSummary {
    let counts = Collection::ALL
        .iter()
        .map(|c| (c.key().to_string(), records.collection(*c).len()))
        .collect();

    DataSummary {
        counts,
        price_range: numeric_range(&records.products, "price"),
        order_value: numeric_range(&records.orders, "total_amount"),
        products_by_category: breakdown(&records.products, "category"),
        orders_by_status: breakdown(&records.orders, "status"),
        cart_events_by_type: breakdown(&records.cart_events, "event_type"),
        campaigns_by_status: breakdown(&records.campaigns, "status"),
        rules_by_trigger_type: breakdown(&records.rules, "trigger_type"),
    }
}

/// Min, max, and arithmetic mean of `field` over `records`.
///
/// Only present, non-null, finite, non-negative values count. Numeric
/// strings (as some Postgres `numeric` columns are serialized) are accepted.
pub fn numeric_range(records: &[Record], field: &str) -> NumericRange {
    let values: Vec<f64> = records
        .iter()
        .filter_map(|r| r.get(field).and_then(as_amount))
        .collect();

    if values.is_empty() {
        return NumericRange::default();
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let average = values.iter().sum::<f64>() / values.len() as f64;

    NumericRange { min, max, average }
}

/// Count of records per distinct value of `field`.
pub fn breakdown(records: &[Record], field: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        let label = record
            .get(field)
            .and_then(category_label)
            .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}

/// Reads a non-negative finite amount from a number or numeric string.
pub(crate) fn as_amount(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (n.is_finite() && n >= 0.0).then_some(n)
}

fn category_label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(values: Vec<Value>) -> Vec<Record> {
        values
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn test_range_empty_is_zero() {
        let range = numeric_range(&[], "price");
        assert_eq!(range, NumericRange { min: 0.0, max: 0.0, average: 0.0 });
    }

    #[test]
    fn test_range_skips_missing_and_null() {
        let rows = records(vec![
            json!({"price": 10}),
            json!({"price": null}),
            json!({"name": "no price"}),
            json!({"price": "30.5"}),
        ]);
        let range = numeric_range(&rows, "price");
        assert_eq!(range.min, 10.0);
        assert_eq!(range.max, 30.5);
        assert!((range.average - 20.25).abs() < 1e-9);
    }

    #[test]
    fn test_range_average_is_mean() {
        let prices = [12.0, 7.5, 99.99, 0.0, 45.0];
        let rows = records(prices.iter().map(|p| json!({ "price": p })).collect());
        let range = numeric_range(&rows, "price");
        let mean = prices.iter().sum::<f64>() / prices.len() as f64;
        assert!((range.average - mean).abs() < 1e-9);
        assert_eq!(range.min, 0.0);
        assert_eq!(range.max, 99.99);
    }

    #[test]
    fn test_range_never_negative() {
        let rows = records(vec![json!({"price": -5}), json!({"price": "abc"})]);
        let range = numeric_range(&rows, "price");
        assert_eq!(range, NumericRange::default());
    }

    #[test]
    fn test_breakdown_counts_unknown() {
        let rows = records(vec![
            json!({"status": "active"}),
            json!({"status": "active"}),
            json!({"status": null}),
            json!({}),
            json!({"status": "paused"}),
        ]);
        let counts = breakdown(&rows, "status");
        assert_eq!(counts["active"], 2);
        assert_eq!(counts["paused"], 1);
        assert_eq!(counts[UNKNOWN_CATEGORY], 2);
    }

    #[test]
    fn test_summarize_empty_set() {
        let summary = summarize(&RecordSet::default());
        assert_eq!(summary.count(Collection::Products), 0);
        assert_eq!(summary.counts.len(), Collection::ALL.len());
        assert_eq!(summary.price_range, NumericRange::default());
        assert!(summary.products_by_category.is_empty());
    }

    #[test]
    fn test_summarize_populated_set() {
        let set = RecordSet {
            products: records(vec![
                json!({"id": "p1", "price": 20, "category": "shoes"}),
                json!({"id": "p2", "price": 80, "category": "bags"}),
            ]),
            orders: records(vec![json!({"total_amount": 100, "status": "paid"})]),
            rules: records(vec![json!({"trigger_type": "cart_value"})]),
            ..Default::default()
        };
        let summary = summarize(&set);
        assert_eq!(summary.count(Collection::Products), 2);
        assert_eq!(summary.count(Collection::Orders), 1);
        assert_eq!(summary.price_range.average, 50.0);
        assert_eq!(summary.order_value.max, 100.0);
        assert_eq!(summary.products_by_category["shoes"], 1);
        assert_eq!(summary.rules_by_trigger_type["cart_value"], 1);
    }
}
