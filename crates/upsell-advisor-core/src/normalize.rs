//! Record normalization.
//!
//! Turns a recovered JSON array into the fixed output schemas. Missing
//! fields get documented defaults, enumerated fields are coerced into
//! their closed sets, trigger conditions are made consistent with their
//! trigger type, and empty `target_products` are derived from the
//! store's product catalog. A record that is already complete and valid
//! passes through unchanged.
//!
//! | Field | Default |
//! |-------|---------|
//! | `status` | `draft` |
//! | `priority` | `5` (clamped to 1..=10) |
//! | `use_ai` | `true` |
//! | `ai_copy_id` | `null` |
//! | `display_type` | `popup` |
//! | `trigger_type` | `cart_value` with `greater_than 100` |
//! | `campaign_type` | `upsell` |

use serde_json::Value;
use tracing::warn;

use crate::error::AnalysisError;
use crate::models::{
    CampaignType, CartValueCondition, CategoryCondition, ComparisonOperator, DisplayType, Insight,
    InsightCategory, Level, MatchOperator, NormalizedCampaign, NormalizedRecords, NormalizedRule,
    PriorityAction, Record, RecordKind, RecordSet, RuleStatus, Shape, TimeCondition, Trigger,
    TriggerKind,
};
use crate::summarize::as_amount;

pub const DEFAULT_PRIORITY: u8 = 5;
pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;
pub const DEFAULT_CART_VALUE: f64 = 100.0;
pub const DEFAULT_TIME_SECONDS: f64 = 30.0;
pub const DEFAULT_CATEGORY: &str = "general";
/// Upper bound on products derived for an empty `target_products`.
pub const MAX_DERIVED_TARGETS: usize = 3;

/// Normalize `value` as a list of `kind` records.
///
/// Fails only when `value` is not an array.
pub fn normalize(
    value: &Value,
    kind: RecordKind,
    source: &RecordSet,
) -> Result<NormalizedRecords, AnalysisError> {
    Ok(match kind {
        RecordKind::Insight => NormalizedRecords::Insights(normalize_insights(value)?),
        RecordKind::Rule => NormalizedRecords::Rules(normalize_rules(value, source)?),
        RecordKind::Campaign => NormalizedRecords::Campaigns(normalize_campaigns(value, source)?),
        RecordKind::PriorityAction => {
            NormalizedRecords::PriorityActions(normalize_priority_actions(value)?)
        }
    })
}

pub fn normalize_rules(value: &Value, source: &RecordSet) -> Result<Vec<NormalizedRule>, AnalysisError> {
    let catalog = Catalog::from_records(&source.products);
    Ok(elements(value, RecordKind::Rule)?
        .into_iter()
        .map(|(n, obj)| normalize_rule(obj, n, "rule", &catalog))
        .collect())
}

pub fn normalize_campaigns(
    value: &Value,
    source: &RecordSet,
) -> Result<Vec<NormalizedCampaign>, AnalysisError> {
    let catalog = Catalog::from_records(&source.products);
    Ok(elements(value, RecordKind::Campaign)?
        .into_iter()
        .map(|(n, obj)| NormalizedCampaign {
            rule: normalize_rule(obj, n, "campaign", &catalog),
            campaign_type: enum_field(obj, "campaign_type", CampaignType::parse)
                .unwrap_or(CampaignType::Upsell),
        })
        .collect())
}

pub fn normalize_insights(value: &Value) -> Result<Vec<Insight>, AnalysisError> {
    Ok(elements(value, RecordKind::Insight)?
        .into_iter()
        .map(|(n, obj)| Insight {
            title: text(obj, "title").unwrap_or_else(|| format!("Insight {}", n)),
            description: text(obj, "description").unwrap_or_default(),
            category: enum_field(obj, "category", InsightCategory::parse)
                .unwrap_or(InsightCategory::General),
            impact: enum_field(obj, "impact", Level::parse).unwrap_or(Level::Medium),
            recommendation: text(obj, "recommendation").unwrap_or_default(),
        })
        .collect())
}

pub fn normalize_priority_actions(value: &Value) -> Result<Vec<PriorityAction>, AnalysisError> {
    Ok(elements(value, RecordKind::PriorityAction)?
        .into_iter()
        .map(|(n, obj)| PriorityAction {
            action: text(obj, "action").unwrap_or_else(|| format!("Action {}", n)),
            description: text(obj, "description").unwrap_or_default(),
            impact: enum_field(obj, "impact", Level::parse).unwrap_or(Level::Medium),
            effort: enum_field(obj, "effort", Level::parse).unwrap_or(Level::Medium),
            priority: priority(obj),
        })
        .collect())
}

/// Object elements of an array with their 1-based positions.
fn elements(value: &Value, kind: RecordKind) -> Result<Vec<(usize, &Record)>, AnalysisError> {
    let items = value.as_array().ok_or(AnalysisError::ShapeMismatch {
        expected: Shape::Array,
        found: Shape::of(value),
    })?;

    Ok(items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| match item.as_object() {
            Some(obj) => Some((i + 1, obj)),
            None => {
                warn!(kind = kind.label(), index = i, found = Shape::of(item), "skipping non-object element");
                None
            }
        })
        .collect())
}

fn normalize_rule(obj: &Record, position: usize, noun: &str, catalog: &Catalog) -> NormalizedRule {
    let trigger = trigger(obj);
    let mut target_products = string_list(obj, "target_products");
    if target_products.is_empty() {
        target_products = catalog.derive_targets(&trigger);
    }

    NormalizedRule {
        name: text(obj, "name").unwrap_or_else(|| format!("Suggested {} {}", noun, position)),
        description: text(obj, "description").unwrap_or_default(),
        trigger,
        target_products,
        priority: priority(obj),
        status: enum_field(obj, "status", RuleStatus::parse).unwrap_or(RuleStatus::Draft),
        use_ai: flag(obj, "use_ai").unwrap_or(true),
        ai_copy_id: text(obj, "ai_copy_id"),
        display_type: enum_field(obj, "display_type", DisplayType::parse)
            .unwrap_or(DisplayType::Popup),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Triggers
// ═══════════════════════════════════════════════════════════════════════

fn trigger(obj: &Record) -> Trigger {
    let conditions = obj.get("trigger_conditions").and_then(Value::as_object);
    match enum_field(obj, "trigger_type", TriggerKind::parse) {
        Some(TriggerKind::Category) => Trigger::Category(CategoryCondition {
            category: conditions
                .and_then(|c| text(c, "category"))
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            category_operator: conditions
                .and_then(|c| enum_field(c, "category_operator", MatchOperator::parse))
                .unwrap_or(MatchOperator::Equals),
        }),
        Some(TriggerKind::TimeBased) => {
            let t = threshold(
                conditions,
                ["time_operator", "time_seconds", "time_min_seconds", "time_max_seconds"],
                DEFAULT_TIME_SECONDS,
            );
            Trigger::TimeBased(TimeCondition {
                time_operator: t.operator,
                time_seconds: t.value,
                time_min_seconds: t.min,
                time_max_seconds: t.max,
            })
        }
        Some(TriggerKind::CartValue) => {
            let t = threshold(
                conditions,
                ["cart_value_operator", "cart_value", "cart_value_min", "cart_value_max"],
                DEFAULT_CART_VALUE,
            );
            Trigger::CartValue(CartValueCondition {
                cart_value_operator: t.operator,
                cart_value: t.value,
                cart_value_min: t.min,
                cart_value_max: t.max,
            })
        }
        None => default_trigger(),
    }
}

fn default_trigger() -> Trigger {
    Trigger::CartValue(CartValueCondition {
        cart_value_operator: ComparisonOperator::GreaterThan,
        cart_value: Some(DEFAULT_CART_VALUE),
        cart_value_min: None,
        cart_value_max: None,
    })
}

/// A numeric condition: either a single threshold or a `between` range.
struct Threshold {
    operator: ComparisonOperator,
    value: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
}

/// Resolve `[operator, value, min, max]` keys into a consistent threshold.
///
/// `between` keeps an ordered min/max pair; without a usable pair it
/// degrades to `greater_than` on the best single value available.
fn threshold(conditions: Option<&Record>, keys: [&str; 4], default: f64) -> Threshold {
    let [op_key, value_key, min_key, max_key] = keys;
    let number = |key: &str| conditions.and_then(|c| c.get(key)).and_then(as_amount);
    let operator = conditions
        .and_then(|c| enum_field(c, op_key, ComparisonOperator::parse))
        .unwrap_or(ComparisonOperator::GreaterThan);

    if operator == ComparisonOperator::Between {
        if let (Some(a), Some(b)) = (number(min_key), number(max_key)) {
            return Threshold {
                operator,
                value: None,
                min: Some(a.min(b)),
                max: Some(a.max(b)),
            };
        }
        return Threshold {
            operator: ComparisonOperator::GreaterThan,
            value: Some(number(value_key).or_else(|| number(min_key)).unwrap_or(default)),
            min: None,
            max: None,
        };
    }

    Threshold {
        operator,
        value: Some(number(value_key).unwrap_or(default)),
        min: None,
        max: None,
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Target derivation
// ═══════════════════════════════════════════════════════════════════════

struct CatalogProduct {
    id: String,
    price: Option<f64>,
    category: Option<String>,
}

/// Source products sorted by ascending price (unpriced last).
struct Catalog {
    products: Vec<CatalogProduct>,
    mean_price: f64,
}

impl Catalog {
    fn from_records(records: &[Record]) -> Self {
        let mut products: Vec<CatalogProduct> = records
            .iter()
            .filter_map(|r| {
                Some(CatalogProduct {
                    id: text(r, "id")?,
                    price: r.get("price").and_then(as_amount),
                    category: text(r, "category"),
                })
            })
            .collect();
        products.sort_by(|a, b| match (a.price, b.price) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });

        let prices: Vec<f64> = products.iter().filter_map(|p| p.price).collect();
        let mean_price = if prices.is_empty() {
            0.0
        } else {
            prices.iter().sum::<f64>() / prices.len() as f64
        };

        Self {
            products,
            mean_price,
        }
    }

    /// Price-bucket heuristic for rules that name no products.
    fn derive_targets(&self, trigger: &Trigger) -> Vec<String> {
        let mean = self.mean_price;
        let priced = |keep: &dyn Fn(f64) -> bool| -> Vec<String> {
            self.products
                .iter()
                .filter(|p| p.price.is_some_and(|price| keep(price)))
                .take(MAX_DERIVED_TARGETS)
                .map(|p| p.id.clone())
                .collect()
        };

        match trigger {
            Trigger::CartValue(c) => {
                let threshold = match (c.cart_value, c.cart_value_min, c.cart_value_max) {
                    (Some(v), _, _) => v,
                    (None, Some(lo), Some(hi)) => (lo + hi) / 2.0,
                    _ => DEFAULT_CART_VALUE,
                };
                if threshold > 1.2 * mean {
                    priced(&|p| p > 1.2 * mean)
                } else if threshold > 0.8 * mean {
                    priced(&|p| p > 0.8 * mean && p <= 1.2 * mean)
                } else {
                    priced(&|p| p <= 0.8 * mean)
                }
            }
            Trigger::TimeBased(_) => priced(&|p| p >= 0.5 * mean && p <= 1.5 * mean),
            Trigger::Category(c) => {
                let named = c.category.to_lowercase();
                self.products
                    .iter()
                    .filter(|p| {
                        p.category
                            .as_deref()
                            .is_some_and(|cat| cat.to_lowercase() != named)
                    })
                    .take(MAX_DERIVED_TARGETS)
                    .map(|p| p.id.clone())
                    .collect()
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Field readers
// ═══════════════════════════════════════════════════════════════════════

/// Trimmed non-empty string; numbers are accepted as their display form.
fn text(obj: &Record, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn enum_field<T>(obj: &Record, key: &str, parse: fn(&str) -> Option<T>) -> Option<T> {
    obj.get(key).and_then(Value::as_str).and_then(parse)
}

fn flag(obj: &Record, key: &str) -> Option<bool> {
    match obj.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn priority(obj: &Record) -> u8 {
    let raw = match obj.get("priority") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(p) if p.is_finite() => p
            .round()
            .clamp(f64::from(MIN_PRIORITY), f64::from(MAX_PRIORITY)) as u8,
        _ => DEFAULT_PRIORITY,
    }
}

fn string_list(obj: &Record, key: &str) -> Vec<String> {
    match obj.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}
