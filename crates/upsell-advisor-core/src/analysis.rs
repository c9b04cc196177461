//! Analysis orchestration.
//!
//! An [`Analyzer`] summarizes a [`RecordSet`] once, then runs the tasks
//! selected by [`AnalysisType`] one after another. Each task is an
//! independent prompt → recovery → normalize round-trip; the first task
//! that fails aborts the whole analysis.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::completion::CompletionClient;
use crate::error::AnalysisError;
use crate::models::{
    DataSummary, Insight, NormalizedCampaign, NormalizedRule, PriorityAction, Record, RecordSet,
};
use crate::normalize::{
    normalize_campaigns, normalize_insights, normalize_priority_actions, normalize_rules,
};
use crate::prompt::{build_prompt, Task};
use crate::recovery::RecoveryPipeline;
use crate::summarize::summarize;

/// Which tasks an analysis request runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    /// Insights, rules, campaigns, and priority actions.
    #[default]
    Full,
    /// Insights and priority actions.
    Insights,
    Rules,
    Campaigns,
}

impl AnalysisType {
    /// Parse a request value. `comprehensive` is accepted for `full`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "full" | "comprehensive" => Some(AnalysisType::Full),
            "insights" => Some(AnalysisType::Insights),
            "rules" => Some(AnalysisType::Rules),
            "campaigns" => Some(AnalysisType::Campaigns),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisType::Full => "full",
            AnalysisType::Insights => "insights",
            AnalysisType::Rules => "rules",
            AnalysisType::Campaigns => "campaigns",
        }
    }

    /// Tasks in execution order.
    pub fn tasks(self) -> &'static [Task] {
        match self {
            AnalysisType::Full => &[
                Task::Insights,
                Task::Rules,
                Task::Campaigns,
                Task::PriorityActions,
            ],
            AnalysisType::Insights => &[Task::Insights, Task::PriorityActions],
            AnalysisType::Rules => &[Task::Rules],
            AnalysisType::Campaigns => &[Task::Campaigns],
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized output of one analysis. Sections for tasks that did not
/// run are empty.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisReport {
    pub insights: Vec<Insight>,
    pub rule_suggestions: Vec<NormalizedRule>,
    pub campaign_suggestions: Vec<NormalizedCampaign>,
    pub priority_actions: Vec<PriorityAction>,
    pub data_summary: DataSummary,
}

pub struct Analyzer<'a> {
    client: &'a dyn CompletionClient,
}

impl<'a> Analyzer<'a> {
    pub fn new(client: &'a dyn CompletionClient) -> Self {
        Self { client }
    }

    pub async fn run(
        &self,
        records: &RecordSet,
        analysis_type: AnalysisType,
    ) -> Result<AnalysisReport, AnalysisError> {
        let mut report = AnalysisReport {
            data_summary: summarize(records),
            ..Default::default()
        };

        for &task in analysis_type.tasks() {
            let context = match task {
                Task::Insights => store_context(&records.profile),
                Task::Rules => existing_names("Existing upsell rules", &records.rules),
                Task::Campaigns => existing_names("Existing campaigns", &records.campaigns),
                Task::PriorityActions => insight_context(&report.insights),
            };
            let value = self.request(task, &report.data_summary, &context).await?;

            let produced = match task {
                Task::Insights => {
                    report.insights = normalize_insights(&value)?;
                    report.insights.len()
                }
                Task::Rules => {
                    report.rule_suggestions = normalize_rules(&value, records)?;
                    report.rule_suggestions.len()
                }
                Task::Campaigns => {
                    report.campaign_suggestions = normalize_campaigns(&value, records)?;
                    report.campaign_suggestions.len()
                }
                Task::PriorityActions => {
                    report.priority_actions = normalize_priority_actions(&value)?;
                    report.priority_actions.len()
                }
            };
            info!(task = task.name(), records = produced, "analysis task complete");
        }

        Ok(report)
    }

    async fn request(
        &self,
        task: Task,
        summary: &DataSummary,
        context: &str,
    ) -> Result<Value, AnalysisError> {
        let prompt = build_prompt(task, summary, context);
        let recovered = RecoveryPipeline::new(self.client)
            .run(&prompt, task.record_kind().expected_shape())
            .await?;
        Ok(recovered.value)
    }
}

fn record_names(records: &[Record], field: &str) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.get(field).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn existing_names(heading: &str, records: &[Record]) -> String {
    let names = record_names(records, "name");
    if names.is_empty() {
        format!("{}: none", heading)
    } else {
        format!("{} (avoid duplicating these): {}", heading, names.join(", "))
    }
}

fn store_context(profile: &[Record]) -> String {
    match record_names(profile, "store_name").first() {
        Some(name) => format!("Store name: {}", name),
        None => String::new(),
    }
}

fn insight_context(insights: &[Insight]) -> String {
    if insights.is_empty() {
        return String::new();
    }
    let titles: Vec<&str> = insights.iter().map(|i| i.title.as_str()).collect();
    format!("Insights already identified: {}", titles.join("; "))
}
