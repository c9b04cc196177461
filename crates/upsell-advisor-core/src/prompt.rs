//! Prompt construction.
//!
//! Each [`Task`] has a fixed instruction template describing the exact
//! JSON schema the model must return. The builder is deterministic: the
//! same summary and context always produce the same prompt text.

use std::fmt::Write;

use crate::models::{
    CampaignType, ComparisonOperator, DataSummary, DisplayType, InsightCategory, MatchOperator,
    RecordKind, RuleStatus, TriggerKind,
};

/// An analysis task, one completion round-trip each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    Insights,
    Rules,
    Campaigns,
    PriorityActions,
}

impl Task {
    pub fn record_kind(self) -> RecordKind {
        match self {
            Task::Insights => RecordKind::Insight,
            Task::Rules => RecordKind::Rule,
            Task::Campaigns => RecordKind::Campaign,
            Task::PriorityActions => RecordKind::PriorityAction,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Task::Insights => "insights",
            Task::Rules => "rules",
            Task::Campaigns => "campaigns",
            Task::PriorityActions => "priority_actions",
        }
    }
}

const PREAMBLE: &str = "You are an e-commerce growth analyst for an online store. \
You study store data and propose concrete upsell and cross-sell improvements.";

const OUTPUT_CONTRACT: &str = "Respond with the JSON array ONLY. \
Do not wrap it in markdown code fences. Do not add any explanation, \
heading, or text before or after the JSON. Use double quotes for all keys \
and strings and no trailing commas.";

/// Build the prompt text for `task`.
///
/// `extra_context` is appended verbatim under a heading when non-empty
/// (existing rule names, earlier insight titles, ...).
pub fn build_prompt(task: Task, summary: &DataSummary, extra_context: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(PREAMBLE);
    prompt.push_str("\n\n## Store data summary\n");
    let summary_json = serde_json::to_string_pretty(summary).unwrap_or_else(|_| "{}".to_string());
    prompt.push_str(&summary_json);

    prompt.push_str("\n\n## Key figures\n");
    let _ = writeln!(
        prompt,
        "- Product prices: min {:.2}, max {:.2}, average {:.2}",
        summary.price_range.min, summary.price_range.max, summary.price_range.average
    );
    let _ = writeln!(
        prompt,
        "- Order values: min {:.2}, max {:.2}, average {:.2}",
        summary.order_value.min, summary.order_value.max, summary.order_value.average
    );

    let extra = extra_context.trim();
    if !extra.is_empty() {
        prompt.push_str("\n## Additional context\n");
        prompt.push_str(extra);
        prompt.push('\n');
    }

    prompt.push_str("\n## Task\n");
    prompt.push_str(&task_instructions(task));
    prompt.push_str("\n\n");
    prompt.push_str(OUTPUT_CONTRACT);
    prompt
}

fn task_instructions(task: Task) -> String {
    match task {
        Task::Insights => format!(
            "Identify 3 to 5 insights about this store's sales, pricing, and shopper behaviour.\n\
             Return a JSON array of objects with exactly these keys:\n\
             - \"title\": short headline\n\
             - \"description\": one or two sentences grounded in the data above\n\
             - \"category\": one of {}\n\
             - \"impact\": one of \"low\", \"medium\", \"high\"\n\
             - \"recommendation\": one concrete next step",
            quoted(InsightCategory::ALL.iter().map(|c| c.as_str()))
        ),
        Task::Rules => format!(
            "Propose 2 to 4 upsell rules for this store.\n{}",
            rule_schema("rule")
        ),
        Task::Campaigns => format!(
            "Propose 2 to 3 upsell campaigns for this store.\n{}\n\
             - \"campaign_type\": one of {}",
            rule_schema("campaign"),
            quoted(CampaignType::ALL.iter().map(|c| c.as_str()))
        ),
        Task::PriorityActions => "List the 3 to 5 highest-leverage actions the store owner \
             should take next, most important first.\n\
             Return a JSON array of objects with exactly these keys:\n\
             - \"action\": imperative summary\n\
             - \"description\": why it matters for this store\n\
             - \"impact\": one of \"low\", \"medium\", \"high\"\n\
             - \"effort\": one of \"low\", \"medium\", \"high\"\n\
             - \"priority\": integer from 1 (lowest) to 10 (highest)"
            .to_string(),
    }
}

fn rule_schema(noun: &str) -> String {
    format!(
        "Return a JSON array of {noun} objects with exactly these keys:\n\
         - \"name\": short {noun} name\n\
         - \"description\": what the {noun} does and why\n\
         - \"trigger_type\": one of {triggers}\n\
         - \"trigger_conditions\": an object matching trigger_type:\n\
         \x20 * cart_value: {{\"cart_value_operator\": one of {cmp}, \"cart_value\": number}} \
         or, for \"between\", {{\"cart_value_operator\": \"between\", \"cart_value_min\": number, \"cart_value_max\": number}}\n\
         \x20 * category: {{\"category\": string, \"category_operator\": one of {matchers}}}\n\
         \x20 * time_based: {{\"time_operator\": one of {cmp}, \"time_seconds\": number}} \
         or, for \"between\", {{\"time_operator\": \"between\", \"time_min_seconds\": number, \"time_max_seconds\": number}}\n\
         - \"target_products\": array of product id strings (may be empty)\n\
         - \"priority\": integer from 1 to 10\n\
         - \"status\": one of {statuses}\n\
         - \"use_ai\": boolean\n\
         - \"ai_copy_id\": null\n\
         - \"display_type\": one of {displays}",
        noun = noun,
        triggers = quoted(TriggerKind::ALL.iter().map(|t| t.as_str())),
        cmp = quoted(ComparisonOperator::ALL.iter().map(|o| o.as_str())),
        matchers = quoted(MatchOperator::ALL.iter().map(|o| o.as_str())),
        statuses = quoted(RuleStatus::ALL.iter().map(|s| s.as_str())),
        displays = quoted(DisplayType::ALL.iter().map(|d| d.as_str())),
    )
}

fn quoted<'a>(tokens: impl Iterator<Item = &'a str>) -> String {
    tokens
        .map(|t| format!("\"{}\"", t))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NumericRange;

    fn summary() -> DataSummary {
        DataSummary {
            price_range: NumericRange {
                min: 5.0,
                max: 120.0,
                average: 47.3333,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let a = build_prompt(Task::Rules, &summary(), "Existing rules: Free gift");
        let b = build_prompt(Task::Rules, &summary(), "Existing rules: Free gift");
        assert_eq!(a, b);
    }

    #[test]
    fn test_prompt_forbids_fences_and_prose() {
        for task in [Task::Insights, Task::Rules, Task::Campaigns, Task::PriorityActions] {
            let prompt = build_prompt(task, &summary(), "");
            assert!(prompt.contains("Do not wrap it in markdown code fences"));
            assert!(prompt.contains("JSON array ONLY"));
        }
    }

    #[test]
    fn test_prompt_embeds_summary_and_truncated_figures() {
        let prompt = build_prompt(Task::Insights, &summary(), "");
        assert!(prompt.contains("\"price_range\""));
        assert!(prompt.contains("average 47.33"));
        assert!(!prompt.contains("## Additional context"));
    }

    #[test]
    fn test_rule_prompt_lists_enumerations() {
        let prompt = build_prompt(Task::Campaigns, &summary(), "Existing campaigns: none");
        assert!(prompt.contains("\"time_based\""));
        assert!(prompt.contains("\"slide_in\""));
        assert!(prompt.contains("\"cross_sell\""));
        assert!(prompt.contains("Existing campaigns: none"));
    }
}
