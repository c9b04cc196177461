//! Core data models used throughout Upsell Advisor.
//!
//! Raw rows arrive as free-form JSON maps ([`Record`]) grouped into a
//! [`RecordSet`]. Everything the service emits is a closed schema
//! ([`Insight`], [`NormalizedRule`], [`NormalizedCampaign`],
//! [`PriorityAction`]) whose enumerated fields are drawn from fixed sets.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::AnalysisError;

/// A single row as returned by the data store.
pub type Record = serde_json::Map<String, Value>;

// ═══════════════════════════════════════════════════════════════════════
// Record collections
// ═══════════════════════════════════════════════════════════════════════

/// The named collections an analysis reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Products,
    Orders,
    CartEvents,
    Campaigns,
    Rules,
    Profile,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Products,
        Collection::Orders,
        Collection::CartEvents,
        Collection::Campaigns,
        Collection::Rules,
        Collection::Profile,
    ];

    /// Field name used in [`RecordSet`] and in summary counts.
    pub fn key(self) -> &'static str {
        match self {
            Collection::Products => "products",
            Collection::Orders => "orders",
            Collection::CartEvents => "cart_events",
            Collection::Campaigns => "campaigns",
            Collection::Rules => "rules",
            Collection::Profile => "profile",
        }
    }

    /// Table name in the hosted data store.
    pub fn table_name(self) -> &'static str {
        match self {
            Collection::Products => "products",
            Collection::Orders => "orders",
            Collection::CartEvents => "cart_events",
            Collection::Campaigns => "campaigns",
            Collection::Rules => "upsell_rules",
            Collection::Profile => "profiles",
        }
    }

    /// Column holding the owning user's id.
    pub fn owner_column(self) -> &'static str {
        match self {
            Collection::Profile => "id",
            _ => "user_id",
        }
    }

    /// Timestamp column used for `time_range_days` filtering, if the
    /// collection is time-scoped.
    pub fn time_column(self) -> Option<&'static str> {
        match self {
            Collection::Orders | Collection::CartEvents => Some("created_at"),
            _ => None,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// All records fetched for one analysis request.
///
/// Request-scoped: built fresh per call and discarded once the response
/// has been produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecordSet {
    #[serde(default)]
    pub products: Vec<Record>,
    #[serde(default)]
    pub orders: Vec<Record>,
    #[serde(default)]
    pub cart_events: Vec<Record>,
    #[serde(default)]
    pub campaigns: Vec<Record>,
    #[serde(default)]
    pub rules: Vec<Record>,
    #[serde(default)]
    pub profile: Vec<Record>,
}

impl RecordSet {
    pub fn collection(&self, collection: Collection) -> &[Record] {
        match collection {
            Collection::Products => &self.products,
            Collection::Orders => &self.orders,
            Collection::CartEvents => &self.cart_events,
            Collection::Campaigns => &self.campaigns,
            Collection::Rules => &self.rules,
            Collection::Profile => &self.profile,
        }
    }

    pub fn collection_mut(&mut self, collection: Collection) -> &mut Vec<Record> {
        match collection {
            Collection::Products => &mut self.products,
            Collection::Orders => &mut self.orders,
            Collection::CartEvents => &mut self.cart_events,
            Collection::Campaigns => &mut self.campaigns,
            Collection::Rules => &mut self.rules,
            Collection::Profile => &mut self.profile,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Summary
// ═══════════════════════════════════════════════════════════════════════

/// Min / max / mean over a numeric field.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
    pub average: f64,
}

/// Aggregate view of a [`RecordSet`], embedded into prompts and returned
/// to callers as `data_summary`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DataSummary {
    pub counts: BTreeMap<String, usize>,
    pub price_range: NumericRange,
    pub order_value: NumericRange,
    pub products_by_category: BTreeMap<String, usize>,
    pub orders_by_status: BTreeMap<String, usize>,
    pub cart_events_by_type: BTreeMap<String, usize>,
    pub campaigns_by_status: BTreeMap<String, usize>,
    pub rules_by_trigger_type: BTreeMap<String, usize>,
}

impl DataSummary {
    pub fn count(&self, collection: Collection) -> usize {
        self.counts.get(collection.key()).copied().unwrap_or(0)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Recovery
// ═══════════════════════════════════════════════════════════════════════

/// Top-level JSON shape a caller requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Object,
    Array,
}

impl Shape {
    pub fn of(value: &Value) -> &'static str {
        match value {
            Value::Object(_) => "object",
            Value::Array(_) => "array",
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Null => "null",
        }
    }

    pub fn matches(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Shape::Object, Value::Object(_)) | (Shape::Array, Value::Array(_))
        )
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Object => f.write_str("object"),
            Shape::Array => f.write_str("array"),
        }
    }
}

/// Which recovery strategy produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Direct,
    Extracted,
    Repaired,
}

/// A value recovered from model output.
#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    pub value: Value,
    pub strategy: Strategy,
    /// 1-based completion attempt that produced the value.
    pub attempt: usize,
}

/// The kinds of record an analysis produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Insight,
    Rule,
    Campaign,
    PriorityAction,
}

impl RecordKind {
    pub fn expected_shape(self) -> Shape {
        Shape::Array
    }

    pub fn label(self) -> &'static str {
        match self {
            RecordKind::Insight => "insight",
            RecordKind::Rule => "rule",
            RecordKind::Campaign => "campaign",
            RecordKind::PriorityAction => "priority action",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Closed enumerations
// ═══════════════════════════════════════════════════════════════════════

/// Declares a closed string enumeration with snake_case serialization and a
/// lenient `parse` that accepts any casing and `-`/space separators.
macro_rules! closed_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $token:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum $name {
            $(#[serde(rename = $token)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $token),+
                }
            }

            pub fn parse(raw: &str) -> Option<Self> {
                let token = canonical_token(raw);
                match token.as_str() {
                    $($token => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

fn canonical_token(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect()
}

closed_enum!(
    /// Condition kind a rule or campaign reacts to.
    TriggerKind {
        CartValue => "cart_value",
        Category => "category",
        TimeBased => "time_based",
    }
);

closed_enum!(
    /// Numeric comparison used by cart-value and time-based triggers.
    ComparisonOperator {
        GreaterThan => "greater_than",
        LessThan => "less_than",
        Equals => "equals",
        Between => "between",
    }
);

closed_enum!(
    /// String match used by category triggers.
    MatchOperator {
        Equals => "equals",
        NotEquals => "not_equals",
        Contains => "contains",
    }
);

closed_enum!(
    RuleStatus {
        Draft => "draft",
        Active => "active",
        Paused => "paused",
    }
);

closed_enum!(
    DisplayType {
        Popup => "popup",
        Banner => "banner",
        Inline => "inline",
        SlideIn => "slide_in",
    }
);

closed_enum!(
    CampaignType {
        Upsell => "upsell",
        CrossSell => "cross_sell",
        Bundle => "bundle",
        Discount => "discount",
    }
);

closed_enum!(
    InsightCategory {
        Revenue => "revenue",
        Conversion => "conversion",
        Inventory => "inventory",
        Customer => "customer",
        Pricing => "pricing",
        Engagement => "engagement",
        General => "general",
    }
);

closed_enum!(
    /// Low / medium / high, used for impact and effort.
    Level {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
);

// ═══════════════════════════════════════════════════════════════════════
// Normalized output
// ═══════════════════════════════════════════════════════════════════════

/// Serializes whole-number amounts as integers (`100` rather than `100.0`).
fn serialize_amount<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => serializer.serialize_i64(*v as i64),
        Some(v) => serializer.serialize_f64(*v),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartValueCondition {
    pub cart_value_operator: ComparisonOperator,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_amount"
    )]
    pub cart_value: Option<f64>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_amount"
    )]
    pub cart_value_min: Option<f64>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_amount"
    )]
    pub cart_value_max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCondition {
    pub category: String,
    pub category_operator: MatchOperator,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeCondition {
    pub time_operator: ComparisonOperator,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_amount"
    )]
    pub time_seconds: Option<f64>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_amount"
    )]
    pub time_min_seconds: Option<f64>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_amount"
    )]
    pub time_max_seconds: Option<f64>,
}

/// Trigger definition; serialized as `trigger_type` + `trigger_conditions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "trigger_type",
    content = "trigger_conditions",
    rename_all = "snake_case"
)]
pub enum Trigger {
    CartValue(CartValueCondition),
    Category(CategoryCondition),
    TimeBased(TimeCondition),
}

impl Trigger {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::CartValue(_) => TriggerKind::CartValue,
            Trigger::Category(_) => TriggerKind::Category,
            Trigger::TimeBased(_) => TriggerKind::TimeBased,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRule {
    pub name: String,
    pub description: String,
    #[serde(flatten)]
    pub trigger: Trigger,
    pub target_products: Vec<String>,
    pub priority: u8,
    pub status: RuleStatus,
    pub use_ai: bool,
    pub ai_copy_id: Option<String>,
    pub display_type: DisplayType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedCampaign {
    #[serde(flatten)]
    pub rule: NormalizedRule,
    pub campaign_type: CampaignType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    pub title: String,
    pub description: String,
    pub category: InsightCategory,
    pub impact: Level,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriorityAction {
    pub action: String,
    pub description: String,
    pub impact: Level,
    pub effort: Level,
    pub priority: u8,
}

/// Output of [`crate::normalize::normalize`], one variant per [`RecordKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedRecords {
    Insights(Vec<Insight>),
    Rules(Vec<NormalizedRule>),
    Campaigns(Vec<NormalizedCampaign>),
    PriorityActions(Vec<PriorityAction>),
}

impl NormalizedRecords {
    pub fn kind(&self) -> RecordKind {
        match self {
            NormalizedRecords::Insights(_) => RecordKind::Insight,
            NormalizedRecords::Rules(_) => RecordKind::Rule,
            NormalizedRecords::Campaigns(_) => RecordKind::Campaign,
            NormalizedRecords::PriorityActions(_) => RecordKind::PriorityAction,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            NormalizedRecords::Insights(v) => v.len(),
            NormalizedRecords::Rules(v) => v.len(),
            NormalizedRecords::Campaigns(v) => v.len(),
            NormalizedRecords::PriorityActions(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Collaborators
// ═══════════════════════════════════════════════════════════════════════

/// A long-lived external collaborator handle that may be unconfigured.
///
/// Built once at start-up. Absence is carried as a reason string and
/// surfaced as [`AnalysisError::Unavailable`] when a request needs it.
pub enum Collaborator<T: ?Sized> {
    Available(Arc<T>),
    Unavailable(String),
}

impl<T: ?Sized> Collaborator<T> {
    /// Returns the handle, or an `Unavailable` error naming the collaborator.
    pub fn require(&self, name: &'static str) -> Result<&T, AnalysisError> {
        match self {
            Collaborator::Available(inner) => Ok(inner.as_ref()),
            Collaborator::Unavailable(reason) => Err(AnalysisError::Unavailable {
                collaborator: name,
                reason: reason.clone(),
            }),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Collaborator::Available(_))
    }

    /// Human-readable status: `"available"` or `"unavailable (<reason>)"`.
    pub fn status(&self) -> String {
        match self {
            Collaborator::Available(_) => "available".to_string(),
            Collaborator::Unavailable(reason) => format!("unavailable ({})", reason),
        }
    }
}

impl<T: ?Sized> Clone for Collaborator<T> {
    fn clone(&self) -> Self {
        match self {
            Collaborator::Available(inner) => Collaborator::Available(Arc::clone(inner)),
            Collaborator::Unavailable(reason) => Collaborator::Unavailable(reason.clone()),
        }
    }
}
