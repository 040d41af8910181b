//! Postgres `EXPLAIN ANALYZE` text output
//!
//! Streams the plan line by line. A matching `Filter:` line stays pending
//! until the node's `Rows Removed by Filter:` line finalizes it, or until the
//! next node header, the next filter line or the end of input flushes it with
//! the node's output rows alone.

use regex::Regex;

use super::{FilterTotals, PlanParser};
use crate::types::{Backend, NormalizedPlan};

pub struct PostgresPlanParser {
    node_header: Regex,
    filter_line: Regex,
    rows_removed: Regex,
    execution_time: Regex,
}

impl Default for PostgresPlanParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PostgresPlanParser {
    pub fn new() -> Self {
        Self {
            node_header: Regex::new(
                r"\(actual time=\s*[\d.]+\s*\.\.\s*[\d.]+\s*rows=(\d+)\s+loops=(\d+)\)",
            )
            .unwrap(),
            filter_line: Regex::new(r"\bFilter:\s*(.+)").unwrap(),
            rows_removed: Regex::new(r"\bRows Removed by Filter:\s*(\d+)").unwrap(),
            execution_time: Regex::new(r"Execution Time:\s*([\d.]+)\s*ms").unwrap(),
        }
    }

    /// `Execution Time: X ms`, converted to seconds
    pub fn total_runtime(&self, explain_text: &str) -> f64 {
        self.execution_time
            .captures(explain_text)
            .and_then(|caps| caps[1].parse::<f64>().ok())
            .map(|ms| ms / 1000.0)
            .unwrap_or(0.0)
    }
}

/// Filter line whose row count is not final yet
struct Pending {
    matched: Vec<usize>,
    rows_output: u64,
}

struct Scan<'a> {
    totals: FilterTotals<'a>,
    current_rows: u64,
    current_loops: u64,
    pending: Option<Pending>,
}

impl<'a> Scan<'a> {
    fn loops(&self) -> u64 {
        self.current_loops.max(1)
    }

    fn flush(&mut self, removed: u64) {
        if let Some(pending) = self.pending.take() {
            for position in pending.matched {
                self.totals.add(position, pending.rows_output.saturating_add(removed));
            }
        }
    }
}

impl PlanParser for PostgresPlanParser {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    fn normalize(&self, raw_plan: &str, filters: &[String]) -> NormalizedPlan {
        let mut scan = Scan {
            totals: FilterTotals::new(filters),
            current_rows: 0,
            current_loops: 1,
            pending: None,
        };

        for line in raw_plan.lines() {
            if let Some(caps) = self.node_header.captures(line) {
                scan.flush(0);
                scan.current_rows = caps[1].parse().unwrap_or(0);
                scan.current_loops = caps[2].parse().unwrap_or(1);
                continue;
            }

            // Checked before filter lines: "Rows Removed by Filter:" also contains "Filter:"
            if let Some(caps) = self.rows_removed.captures(line) {
                if scan.pending.is_some() {
                    let removed: u64 = caps[1].parse().unwrap_or(0);
                    let removed = removed.saturating_mul(scan.loops());
                    scan.flush(removed);
                }
                continue;
            }

            if let Some(caps) = self.filter_line.captures(line) {
                scan.flush(0);
                let matched = scan.totals.all_matches(&caps[1]);
                if !matched.is_empty() {
                    scan.pending = Some(Pending {
                        matched,
                        rows_output: scan.current_rows.saturating_mul(scan.loops()),
                    });
                }
            }
        }

        scan.flush(0);
        let total_runtime = self.total_runtime(raw_plan);
        scan.totals.finish(total_runtime)
    }
}
