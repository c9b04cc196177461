//! One analysis request, shared by `POST /analyze` and `advisor analyze`.
//!
//! Validates the request, resolves the record set (inline `data` or the
//! store), and runs the core [`Analyzer`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use upsell_advisor_core::analysis::{AnalysisReport, AnalysisType, Analyzer};
use upsell_advisor_core::error::AnalysisError;
use upsell_advisor_core::models::RecordSet;
use upsell_advisor_core::store::load_record_set;

use crate::context::AppContext;

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    pub user_id: String,
    #[serde(default)]
    pub analysis_type: Option<String>,
    #[serde(default)]
    pub time_range_days: Option<i64>,
    /// Inline records; when present the store is not consulted.
    #[serde(default)]
    pub data: Option<RecordSet>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub user_id: String,
    pub analysis_type: AnalysisType,
    pub analysis_timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub report: AnalysisReport,
}

#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    /// The request itself is malformed.
    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

/// A validated request.
struct Plan {
    user_id: String,
    analysis_type: AnalysisType,
    days: u32,
}

fn plan(request: &AnalyzeRequest, default_days: u32) -> Result<Plan, AnalyzeError> {
    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return Err(AnalyzeError::Invalid("user_id must not be empty".to_string()));
    }

    let analysis_type = match request.analysis_type.as_deref() {
        None => AnalysisType::default(),
        Some(raw) => AnalysisType::parse(raw).ok_or_else(|| {
            AnalyzeError::Invalid(format!(
                "unknown analysis_type '{}': expected full, comprehensive, insights, rules, or campaigns",
                raw
            ))
        })?,
    };

    let days = match request.time_range_days {
        None => default_days,
        Some(d) if (1..=i64::from(u32::MAX)).contains(&d) => d as u32,
        Some(d) => {
            return Err(AnalyzeError::Invalid(format!(
                "time_range_days must be >= 1, got {}",
                d
            )))
        }
    };

    Ok(Plan {
        user_id: user_id.to_string(),
        analysis_type,
        days,
    })
}

pub async fn run_analysis(
    ctx: &AppContext,
    request: AnalyzeRequest,
) -> Result<AnalyzeResponse, AnalyzeError> {
    let plan = plan(&request, ctx.config.analysis.default_time_range_days)?;
    let client = ctx.completion.require("completion")?;

    let records = match request.data {
        Some(records) => records,
        None => {
            let store = ctx.store.require("store")?;
            // unbounded when the window reaches past the representable range
            let since = Utc::now().checked_sub_signed(Duration::days(i64::from(plan.days)));
            load_record_set(store, &plan.user_id, since).await?
        }
    };

    let report = Analyzer::new(client).run(&records, plan.analysis_type).await?;
    info!(
        user_id = %plan.user_id,
        analysis_type = %plan.analysis_type,
        rules = report.rule_suggestions.len(),
        campaigns = report.campaign_suggestions.len(),
        "analysis complete"
    );

    Ok(AnalyzeResponse {
        user_id: plan.user_id,
        analysis_type: plan.analysis_type,
        analysis_timestamp: Utc::now(),
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(user_id: &str, analysis_type: Option<&str>, days: Option<i64>) -> AnalyzeRequest {
        AnalyzeRequest {
            user_id: user_id.to_string(),
            analysis_type: analysis_type.map(str::to_string),
            time_range_days: days,
            data: None,
        }
    }

    #[test]
    fn test_plan_defaults() {
        let plan = plan(&request(" u1 ", None, None), 30).unwrap();
        assert_eq!(plan.user_id, "u1");
        assert_eq!(plan.analysis_type, AnalysisType::Full);
        assert_eq!(plan.days, 30);
    }

    #[test]
    fn test_plan_rejects_bad_input() {
        assert!(matches!(plan(&request("", None, None), 30), Err(AnalyzeError::Invalid(_))));
        assert!(matches!(
            plan(&request("u1", Some("everything"), None), 30),
            Err(AnalyzeError::Invalid(_))
        ));
        assert!(matches!(plan(&request("u1", None, Some(0)), 30), Err(AnalyzeError::Invalid(_))));
        assert!(matches!(plan(&request("u1", None, Some(-7)), 30), Err(AnalyzeError::Invalid(_))));
    }

    #[test]
    fn test_request_accepts_inline_data() {
        let request: AnalyzeRequest = serde_json::from_value(serde_json::json!({
            "user_id": "u1",
            "analysis_type": "comprehensive",
            "data": {"products": [{"id": "p1", "price": 12}]}
        }))
        .unwrap();
        let data = request.data.unwrap();
        assert_eq!(data.products.len(), 1);
        assert!(data.orders.is_empty());
    }
}
