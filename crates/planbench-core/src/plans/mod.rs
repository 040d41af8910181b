//! Plan normalization
//!
//! Each engine prints `EXPLAIN ANALYZE` differently:
//! - MySQL: a tree of single-line operators with inline `Filter: (...)` timings
//! - Postgres: multi-line text, filter lines following their node header
//! - DuckDB: a JSON profile tree
//!
//! Every parser maps its format to a [`NormalizedPlan`] and never fails; input
//! it cannot read degrades to a zero runtime and zero row counts.

pub mod duckdb;
pub mod mysql;
pub mod postgres;

use std::sync::OnceLock;

use crate::types::{Backend, FilterScan, NormalizedPlan};

pub use self::duckdb::DuckDbPlanParser;
pub use self::mysql::MySqlPlanParser;
pub use self::postgres::PostgresPlanParser;

/// Converts one engine's raw plan into the common metric shape
pub trait PlanParser: Send + Sync {
    fn backend(&self) -> Backend;

    /// Total runtime plus rows scanned for every requested filter, in request order
    fn normalize(&self, raw_plan: &str, filters: &[String]) -> NormalizedPlan;
}

/// Parser instance for `backend`
pub fn parser_for(backend: Backend) -> &'static dyn PlanParser {
    static MYSQL: OnceLock<MySqlPlanParser> = OnceLock::new();
    static POSTGRES: OnceLock<PostgresPlanParser> = OnceLock::new();
    static DUCKDB: OnceLock<DuckDbPlanParser> = OnceLock::new();

    match backend {
        Backend::MySQL => MYSQL.get_or_init(MySqlPlanParser::new),
        Backend::Postgres => POSTGRES.get_or_init(PostgresPlanParser::new),
        Backend::DuckDB => DUCKDB.get_or_init(DuckDbPlanParser::new),
    }
}

/// Normalize `raw_plan` with the parser of `backend`
pub fn normalize(backend: Backend, raw_plan: &str, filters: &[String]) -> NormalizedPlan {
    parser_for(backend).normalize(raw_plan, filters)
}

/// Running rows-scanned totals keyed by requested filter position
pub(crate) struct FilterTotals<'a> {
    filters: &'a [String],
    needles: Vec<String>,
    totals: Vec<u64>,
}

impl<'a> FilterTotals<'a> {
    pub(crate) fn new(filters: &'a [String]) -> Self {
        Self {
            filters,
            needles: filters.iter().map(|f| f.to_lowercase()).collect(),
            totals: vec![0; filters.len()],
        }
    }

    /// Positions of every filter occurring in `expr`, case-insensitive
    pub(crate) fn all_matches(&self, expr: &str) -> Vec<usize> {
        let expr = expr.to_lowercase();
        self.needles
            .iter()
            .enumerate()
            .filter(|(_, needle)| expr.contains(needle.as_str()))
            .map(|(i, _)| i)
            .collect()
    }

    /// Position of the first requested filter occurring in `expr`
    pub(crate) fn first_match(&self, expr: &str) -> Option<usize> {
        let expr = expr.to_lowercase();
        self.needles.iter().position(|needle| expr.contains(needle.as_str()))
    }

    pub(crate) fn add(&mut self, position: usize, rows: u64) {
        self.totals[position] = self.totals[position].saturating_add(rows);
    }

    pub(crate) fn finish(self, total_runtime: f64) -> NormalizedPlan {
        NormalizedPlan {
            total_runtime,
            filters: self
                .filters
                .iter()
                .zip(self.totals)
                .map(|(variable, total_rows)| FilterScan {
                    variable: variable.clone(),
                    total_rows,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parser_registry() {
        for backend in Backend::ALL {
            assert_eq!(parser_for(backend).backend(), backend);
        }
    }

    #[test]
    fn test_empty_plan_degrades_to_zero() {
        let requested = filters(&["o_orderdate", "l_shipdate"]);
        for backend in Backend::ALL {
            let plan = normalize(backend, "", &requested);
            assert_eq!(plan.total_runtime, 0.0);
            assert_eq!(plan.filters.len(), 2);
            assert!(plan.filters.iter().all(|f| f.total_rows == 0));
        }
    }

    #[test]
    fn test_garbage_plan_degrades_to_zero() {
        let requested = filters(&["x"]);
        for backend in Backend::ALL {
            let plan = normalize(backend, "{not a plan ((( actual time=", &requested);
            assert_eq!(plan, NormalizedPlan::empty(&requested));
        }
    }

    #[test]
    fn test_totals_matching() {
        let requested = filters(&["O_OrderDate", "orderdate"]);
        let totals = FilterTotals::new(&requested);
        assert_eq!(totals.all_matches("(o_orderdate < 5)"), vec![0, 1]);
        assert_eq!(totals.first_match("(o_orderdate < 5)"), Some(0));
        assert_eq!(totals.first_match("(l_shipdate < 5)"), None);
    }
}
