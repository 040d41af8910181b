//! DuckDB JSON profile output

use serde_json::Value;

use super::{FilterTotals, PlanParser};
use crate::types::{Backend, NormalizedPlan};

#[derive(Default)]
pub struct DuckDbPlanParser;

impl DuckDbPlanParser {
    pub fn new() -> Self {
        Self
    }
}

fn rows_scanned(node: &Value) -> u64 {
    match node.get("operator_rows_scanned") {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.max(0.0) as u64))
            .unwrap_or(0),
        _ => 0,
    }
}

impl PlanParser for DuckDbPlanParser {
    fn backend(&self) -> Backend {
        Backend::DuckDB
    }

    fn normalize(&self, raw_plan: &str, filters: &[String]) -> NormalizedPlan {
        let profile: Value = match serde_json::from_str(raw_plan) {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(backend = %Backend::DuckDB, "Invalid profile JSON: {}", e);
                return NormalizedPlan::empty(filters);
            }
        };

        let total_runtime = profile.get("latency").and_then(Value::as_f64).unwrap_or(0.0);
        let mut totals = FilterTotals::new(filters);

        let mut stack = vec![&profile];
        while let Some(node) = stack.pop() {
            if let Some(Value::String(expr)) = node.get("extra_info").and_then(|e| e.get("Filters")) {
                let rows = rows_scanned(node);
                for position in totals.all_matches(expr) {
                    totals.add(position, rows);
                }
            }
            if let Some(Value::Array(children)) = node.get("children") {
                stack.extend(children.iter());
            }
        }

        totals.finish(total_runtime)
    }
}
