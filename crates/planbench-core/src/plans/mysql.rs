//! MySQL `EXPLAIN ANALYZE` tree output

use regex::Regex;

use super::{FilterTotals, PlanParser};
use crate::types::{Backend, NormalizedPlan};

pub struct MySqlPlanParser {
    filter: Regex,
    runtime: Regex,
}

impl Default for MySqlPlanParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MySqlPlanParser {
    pub fn new() -> Self {
        Self {
            filter: Regex::new(
                r"(?s)Filter: \((.*?)\)\s*\((?:actual time=(.*?) rows=(\S+) loops=([^)]+)|never executed)\)",
            )
            .unwrap(),
            runtime: Regex::new(r"actual time=\d+\.?\d*\.\.(\d+\.?\d*)").unwrap(),
        }
    }

    /// Right-hand value of the first `actual time=a..b`, taken as the root operator (ms)
    pub fn total_runtime(&self, plan_text: &str) -> f64 {
        self.runtime
            .captures(plan_text)
            .and_then(|caps| caps[1].parse::<f64>().ok())
            .unwrap_or(0.0)
    }
}

impl PlanParser for MySqlPlanParser {
    fn backend(&self) -> Backend {
        Backend::MySQL
    }

    fn normalize(&self, raw_plan: &str, filters: &[String]) -> NormalizedPlan {
        let mut totals = FilterTotals::new(filters);

        for caps in self.filter.captures_iter(raw_plan) {
            // A condition is credited to at most one filter: the first requested one it mentions
            let Some(position) = totals.first_match(&caps[1]) else {
                continue;
            };

            let rows = match (caps.get(3), caps.get(4)) {
                (Some(rows), Some(loops)) => {
                    let rows = rows.as_str().trim().parse::<f64>().unwrap_or(0.0);
                    let loops = loops.as_str().trim().parse::<f64>().unwrap_or(0.0);
                    (rows * loops).round().max(0.0) as u64
                }
                // never executed
                _ => 0,
            };
            totals.add(position, rows);
        }

        totals.finish(self.total_runtime(raw_plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = "-> Aggregate: count(0)  (cost=1234.5 rows=1) (actual time=0.0..45.6 rows=1 loops=1)
    -> Filter: (o_orderdate < '1998-01-01')  (cost=1000.2 rows=5000) (actual time=0.1..12.3 rows=500 loops=3)
        -> Table scan on orders  (cost=1000.2 rows=15000) (actual time=0.05..9.8 rows=15000 loops=3)
";

    fn filters(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_filter_rows_times_loops() {
        let parser = MySqlPlanParser::new();
        let plan = parser.normalize(
            "Filter: (o_orderdate < '1998-01-01') (actual time=0.1..12.3 rows=500 loops=3)",
            &filters(&["o_orderdate"]),
        );
        assert_eq!(plan.rows_for("o_orderdate"), Some(1500));
    }

    #[test]
    fn test_root_runtime() {
        let parser = MySqlPlanParser::new();
        assert_eq!(parser.total_runtime(PLAN), 45.6);
        let plan = parser.normalize(PLAN, &filters(&["o_orderdate"]));
        assert_eq!(plan.total_runtime, 45.6);
    }

    #[test]
    fn test_cost_annotation_between_condition_and_timing() {
        // The condition extends past "(cost=...)" up to the timing group
        let parser = MySqlPlanParser::new();
        let plan = parser.normalize(PLAN, &filters(&["o_orderdate"]));
        assert_eq!(plan.rows_for("o_orderdate"), Some(1500));
    }

    #[test]
    fn test_never_executed() {
        let parser = MySqlPlanParser::new();
        let plan = parser.normalize("-> Filter: (x > 5) (never executed)", &filters(&["x"]));
        assert_eq!(plan.rows_for("x"), Some(0));
        assert_eq!(plan.total_runtime, 0.0);
    }

    #[test]
    fn test_first_requested_filter_wins() {
        let parser = MySqlPlanParser::new();
        let text = "Filter: ((o_orderdate < 5) and (o_custkey > 3)) (actual time=0.2..1.0 rows=10 loops=2)";
        let plan = parser.normalize(text, &filters(&["o_custkey", "o_orderdate"]));
        assert_eq!(plan.rows_for("o_custkey"), Some(20));
        assert_eq!(plan.rows_for("o_orderdate"), Some(0));
    }

    #[test]
    fn test_case_insensitive_and_accumulating() {
        let parser = MySqlPlanParser::new();
        let text = "\
-> Filter: (O_ORDERDATE < 5) (actual time=0.1..0.2 rows=4 loops=1)
-> Filter: (o_orderdate >= 1) (actual time=0.1..0.2 rows=2.5 loops=3)
-> Filter: (o_orderdate <> 2) (never executed)";
        let plan = parser.normalize(text, &filters(&["o_orderdate"]));
        // 4*1 + round(2.5*3)
        assert_eq!(plan.rows_for("o_orderdate"), Some(12));
    }

    #[test]
    fn test_idempotent() {
        let parser = MySqlPlanParser::new();
        let requested = filters(&["o_orderdate"]);
        assert_eq!(parser.normalize(PLAN, &requested), parser.normalize(PLAN, &requested));
    }
}
