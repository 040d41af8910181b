//! Shared data model: jobs, sweeps, ready queries and plan records

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::{BenchError, Result};

/// Number of filter positions carried by a [`PlanRecord`]
pub const MAX_FILTERS: usize = 3;

/// Upper bound on the number of queries one sweep may expand to
pub const MAX_SWEEP_SIZE: usize = 1_000_000;

/// Database engine a job runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backend {
    MySQL,
    Postgres,
    DuckDB,
}

/// Admission policy of a backend's queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Any number of batches in flight, bounded by the shared worker pool
    Concurrent,
    /// At most one batch in flight at a time
    SingleFlight,
}

/// Unit the engine reports its runtime in. Values are never converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RuntimeUnit {
    #[serde(rename = "ms")]
    Milliseconds,
    #[serde(rename = "s")]
    Seconds,
}

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::MySQL, Backend::Postgres, Backend::DuckDB];

    /// Dense index for per-backend tables
    pub fn index(self) -> usize {
        match self {
            Self::MySQL => 0,
            Self::Postgres => 1,
            Self::DuckDB => 2,
        }
    }

    pub fn admission(self) -> Admission {
        match self {
            Self::MySQL => Admission::Concurrent,
            Self::Postgres | Self::DuckDB => Admission::SingleFlight,
        }
    }

    pub fn runtime_unit(self) -> RuntimeUnit {
        match self {
            Self::MySQL => RuntimeUnit::Milliseconds,
            Self::Postgres | Self::DuckDB => RuntimeUnit::Seconds,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::MySQL => "MySQL",
            Self::Postgres => "Postgres",
            Self::DuckDB => "DuckDB",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Ok(Self::MySQL),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "duckdb" => Ok(Self::DuckDB),
            _ => Err(BenchError::UnknownBackend(s.to_string())),
        }
    }
}

impl fmt::Display for RuntimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Milliseconds => f.write_str("ms"),
            Self::Seconds => f.write_str("s"),
        }
    }
}

/// Declared type of a template placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamType {
    #[serde(rename = "INT")]
    Int,
    #[serde(rename = "FLOAT")]
    Float,
}

impl ParamType {
    /// Resolve a placeholder tag, failing for anything but `INT` and `FLOAT`
    pub fn from_tag(name: &str, tag: &str) -> Result<Self> {
        match tag {
            "INT" => Ok(Self::Int),
            "FLOAT" => Ok(Self::Float),
            other => Err(BenchError::UnsupportedType {
                name: name.to_string(),
                type_tag: other.to_string(),
            }),
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::Int => "INT",
            Self::Float => "FLOAT",
        }
    }
}

/// A bound placeholder value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
}

impl ParamValue {
    /// SQL literal for a placeholder declared with `ty`
    pub fn render(self, ty: ParamType) -> String {
        match (ty, self) {
            (ParamType::Int, Self::Int(v)) => v.to_string(),
            (ParamType::Int, Self::Float(v)) => (v.trunc() as i64).to_string(),
            // Debug keeps the trailing ".0" on integral floats
            (ParamType::Float, Self::Int(v)) => format!("{:?}", v as f64),
            (ParamType::Float, Self::Float(v)) => format!("{:?}", v),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{:?}", v),
        }
    }
}

/// A placeholder discovered in a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
}

/// Inclusive numeric sweep for one placeholder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRange {
    pub name: String,
    pub start: f64,
    pub end: f64,
    pub step: f64,
    #[serde(rename = "type")]
    pub param_type: ParamType,
}

impl ParameterRange {
    pub fn new(name: impl Into<String>, start: f64, end: f64, step: f64, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            start,
            end,
            step,
            param_type,
        }
    }

    pub fn int(name: impl Into<String>, start: i64, end: i64, step: i64) -> Self {
        Self::new(name, start as f64, end as f64, step as f64, ParamType::Int)
    }

    pub fn float(name: impl Into<String>, start: f64, end: f64, step: f64) -> Self {
        Self::new(name, start, end, step, ParamType::Float)
    }

    /// Parse `"start,end,step"` or a single fixed `"value"`
    pub fn parse_spec(name: &str, param_type: ParamType, spec: &str) -> Result<Self> {
        let invalid = |reason: String| BenchError::InvalidRange {
            name: name.to_string(),
            reason,
        };
        let parts = spec
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<f64>()
                    .map_err(|_| invalid(format!("'{}' is not a number", p.trim())))
            })
            .collect::<Result<Vec<f64>>>()?;

        let range = match parts.as_slice() {
            [value] => Self::new(name, *value, *value, 1.0, param_type),
            [start, end, step] => Self::new(name, *start, *end, *step, param_type),
            _ => {
                return Err(invalid(format!(
                    "expected 'start,end,step' or a single value, got '{}'",
                    spec
                )))
            }
        };
        range.validate()?;
        Ok(range)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| BenchError::InvalidRange {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if !(self.start.is_finite() && self.end.is_finite() && self.step.is_finite()) {
            return Err(invalid("bounds and step must be finite"));
        }
        if self.step <= 0.0 {
            return Err(invalid("step must be positive"));
        }
        if self.param_type == ParamType::Int {
            if self.step.fract() != 0.0 || self.step < 1.0 {
                return Err(invalid("INT step must be a whole number of at least 1"));
            }
            let in_i64 = |v: f64| v >= i64::MIN as f64 && v < i64::MAX as f64;
            if !(in_i64(self.start) && in_i64(self.end)) {
                return Err(invalid("INT bounds must fit in a 64-bit integer"));
            }
        }
        Ok(())
    }

    fn too_large(&self) -> BenchError {
        BenchError::InvalidRange {
            name: self.name.clone(),
            reason: format!("sweep exceeds {} values", MAX_SWEEP_SIZE),
        }
    }

    /// Number of values in the sweep, `floor((end - start) / step) + 1`
    pub fn cardinality(&self) -> Result<usize> {
        self.validate()?;
        if self.end < self.start {
            return Ok(0);
        }
        let count = match self.param_type {
            ParamType::Int => {
                // i128 holds the span of any two i64 bounds
                let span = self.end as i64 as i128 - self.start as i64 as i128;
                usize::try_from(span / self.step as i64 as i128)
                    .ok()
                    .and_then(|n| n.checked_add(1))
                    .ok_or_else(|| self.too_large())?
            }
            ParamType::Float => {
                // Small epsilon so that 0.1-style steps land on `end`
                let n = ((self.end - self.start) / self.step + 1e-9).floor();
                if !n.is_finite() || n >= MAX_SWEEP_SIZE as f64 {
                    return Err(self.too_large());
                }
                n as usize + 1
            }
        };
        if count > MAX_SWEEP_SIZE {
            return Err(self.too_large());
        }
        Ok(count)
    }

    /// Materialize the sweep in ascending order
    pub fn values(&self) -> Result<Vec<ParamValue>> {
        let count = self.cardinality()?;
        let values = match self.param_type {
            ParamType::Int => {
                let (start, step) = (self.start as i64 as i128, self.step as i64 as i128);
                // Every value lies between the bounds, so the narrowing is exact
                (0..count as i128)
                    .map(|i| ParamValue::Int((start + i * step) as i64))
                    .collect()
            }
            ParamType::Float => (0..count)
                .map(|i| ParamValue::Float(self.start + i as f64 * self.step))
                .collect(),
        };
        Ok(values)
    }
}

/// One substituted placeholder of a [`ReadyQuery`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub value: ParamValue,
}

/// A fully substituted query, ready to run once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyQuery {
    pub query_text: String,
    pub bindings: Vec<Binding>,
}

impl ReadyQuery {
    /// Binding names in declaration order; these are the filters measured in the plan
    pub fn filter_names(&self) -> Vec<String> {
        self.bindings.iter().map(|b| b.name.clone()).collect()
    }
}

/// One schedulable benchmark unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkJob {
    pub query_template: String,
    #[serde(default)]
    pub declared_parameters: Vec<QueryParameter>,
    pub backend: Backend,
    pub dataset_name: String,
    pub job_name: String,
}

impl BenchmarkJob {
    /// Build a job, discovering its parameters from the template
    pub fn new(
        query_template: impl Into<String>,
        backend: Backend,
        dataset_name: impl Into<String>,
        job_name: impl Into<String>,
    ) -> Result<Self> {
        let query_template = query_template.into();
        let declared_parameters = crate::expander::extract_parameters(&query_template)?;
        if declared_parameters.len() > MAX_FILTERS {
            return Err(BenchError::TooManyParameters(declared_parameters.len()));
        }
        Ok(Self {
            query_template,
            declared_parameters,
            backend,
            dataset_name: dataset_name.into(),
            job_name: job_name.into(),
        })
    }
}

impl BenchmarkJob {
    pub fn declares(&self, name: &str) -> bool {
        self.declared_parameters.iter().any(|p| p.name == name)
    }
}

/// Entry of a jobs file: a job plus the sweep to run it over
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub job: BenchmarkJob,
    pub ranges: Vec<ParameterRange>,
}

/// A batch routed to exactly one backend queue
#[derive(Debug, Clone)]
pub struct BackendTask {
    pub batch: Vec<ReadyQuery>,
    pub job: Arc<BenchmarkJob>,
}

impl BackendTask {
    pub fn new(batch: Vec<ReadyQuery>, job: Arc<BenchmarkJob>) -> Self {
        Self { batch, job }
    }

    pub fn backend(&self) -> Backend {
        self.job.backend
    }
}

/// Rows scanned for one requested filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterScan {
    pub variable: String,
    pub total_rows: u64,
}

/// Engine-independent view of one plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPlan {
    pub total_runtime: f64,
    pub filters: Vec<FilterScan>,
}

impl NormalizedPlan {
    /// Zero runtime and a zero total for every requested filter
    pub fn empty(filters: &[String]) -> Self {
        Self {
            total_runtime: 0.0,
            filters: filters
                .iter()
                .map(|f| FilterScan {
                    variable: f.clone(),
                    total_rows: 0,
                })
                .collect(),
        }
    }

    pub fn rows_for(&self, variable: &str) -> Option<u64> {
        self.filters
            .iter()
            .find(|f| f.variable == variable)
            .map(|f| f.total_rows)
    }
}

/// `(filter_name, filter_value, rows_scanned)` at one record position
#[derive(Debug, Clone, PartialEq)]
pub struct FilterTriple {
    pub filter_name: String,
    pub filter_value: ParamValue,
    pub rows_scanned: Option<u64>,
}

/// Normalized metrics of one executed query
#[derive(Debug, Clone, PartialEq)]
pub struct PlanRecord {
    pub backend: Backend,
    pub dataset_name: String,
    pub job_name: String,
    pub total_runtime: f64,
    pub triples: Vec<FilterTriple>,
}

impl PlanRecord {
    /// Assemble a record; triple `i` comes from binding `i` of the query.
    /// Bindings for names the job does not declare are ignored.
    pub fn assemble(job: &BenchmarkJob, query: &ReadyQuery, plan: &NormalizedPlan) -> Self {
        let triples = query
            .bindings
            .iter()
            .enumerate()
            .filter(|(_, binding)| job.declares(&binding.name))
            .take(MAX_FILTERS)
            .map(|(i, binding)| FilterTriple {
                filter_name: binding.name.clone(),
                filter_value: binding.value,
                rows_scanned: plan
                    .filters
                    .get(i)
                    .filter(|scan| scan.variable == binding.name)
                    .map(|scan| scan.total_rows),
            })
            .collect();

        Self {
            backend: job.backend,
            dataset_name: job.dataset_name.clone(),
            job_name: job.job_name.clone(),
            total_runtime: plan.total_runtime,
            triples,
        }
    }
}

// Flat row consumed by the sampling tools: filter_n/val_n/rows_n, "" when absent
impl Serialize for PlanRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4 + 3 * MAX_FILTERS))?;
        map.serialize_entry("server", &self.backend)?;
        map.serialize_entry("database", &self.dataset_name)?;
        map.serialize_entry("query", &self.job_name)?;
        map.serialize_entry("runtime", &self.total_runtime)?;
        for i in 0..MAX_FILTERS {
            let n = i + 1;
            match self.triples.get(i) {
                Some(triple) => {
                    map.serialize_entry(&format!("filter_{}", n), &triple.filter_name)?;
                    map.serialize_entry(&format!("val_{}", n), &triple.filter_value)?;
                    match triple.rows_scanned {
                        Some(rows) => map.serialize_entry(&format!("rows_{}", n), &rows)?,
                        None => map.serialize_entry(&format!("rows_{}", n), "")?,
                    }
                }
                None => {
                    map.serialize_entry(&format!("filter_{}", n), "")?;
                    map.serialize_entry(&format!("val_{}", n), "")?;
                    map.serialize_entry(&format!("rows_{}", n), "")?;
                }
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_str() {
        assert_eq!("mysql".parse::<Backend>().unwrap(), Backend::MySQL);
        assert_eq!("PostgreSQL".parse::<Backend>().unwrap(), Backend::Postgres);
        assert_eq!("DuckDB".parse::<Backend>().unwrap(), Backend::DuckDB);
        assert!(matches!(
            "oracle".parse::<Backend>(),
            Err(BenchError::UnknownBackend(_))
        ));
    }

    #[test]
    fn test_admission_policy() {
        assert_eq!(Backend::MySQL.admission(), Admission::Concurrent);
        assert_eq!(Backend::Postgres.admission(), Admission::SingleFlight);
        assert_eq!(Backend::DuckDB.admission(), Admission::SingleFlight);
    }

    #[test]
    fn test_render_values() {
        assert_eq!(ParamValue::Int(10).render(ParamType::Int), "10");
        assert_eq!(ParamValue::Int(10).render(ParamType::Float), "10.0");
        assert_eq!(ParamValue::Float(2.75).render(ParamType::Int), "2");
        assert_eq!(ParamValue::Float(0.5).render(ParamType::Float), "0.5");
    }

    #[test]
    fn test_range_spec() {
        let range = ParameterRange::parse_spec("days", ParamType::Int, "10, 100, 5").unwrap();
        assert_eq!(range.cardinality().unwrap(), 19);

        let fixed = ParameterRange::parse_spec("days", ParamType::Int, "42").unwrap();
        assert_eq!(fixed.values().unwrap(), vec![ParamValue::Int(42)]);

        assert!(ParameterRange::parse_spec("days", ParamType::Int, "1,2").is_err());
        assert!(ParameterRange::parse_spec("days", ParamType::Int, "1,x,1").is_err());
        assert!(ParameterRange::parse_spec("days", ParamType::Int, "1,10,0").is_err());
    }

    #[test]
    fn test_float_range_hits_end() {
        let range = ParameterRange::float("ratio", 0.0, 1.0, 0.1);
        let values = range.values().unwrap();
        assert_eq!(values.len(), 11);
        assert_eq!(values[0], ParamValue::Float(0.0));
    }

    #[test]
    fn test_descending_range_is_empty() {
        let range = ParameterRange::int("x", 10, 1, 1);
        assert_eq!(range.cardinality().unwrap(), 0);
        assert!(range.values().unwrap().is_empty());
    }

    #[test]
    fn test_wide_int_range_does_not_overflow() {
        let (low, high) = (-5_000_000_000_000_000_000, 5_000_000_000_000_000_000);
        let wide = ParameterRange::int("x", low, high, 1);
        assert!(matches!(wide.cardinality(), Err(BenchError::InvalidRange { .. })));
        assert!(wide.values().is_err());

        let spaced = ParameterRange::int("x", low, high, 1_000_000_000_000_000_000);
        assert_eq!(spaced.cardinality().unwrap(), 11);
        assert_eq!(spaced.values().unwrap().last(), Some(&ParamValue::Int(high)));

        let coarse = ParameterRange::int("x", 0, 1_000_000_000_000_000_000, 100_000_000_000_000_000);
        assert_eq!(coarse.cardinality().unwrap(), 11);
        assert_eq!(
            coarse.values().unwrap().last(),
            Some(&ParamValue::Int(1_000_000_000_000_000_000))
        );
    }

    #[test]
    fn test_huge_float_sweep_rejected() {
        let range = ParameterRange::float("x", 0.0, 1e300, 1e-10);
        assert!(matches!(range.cardinality(), Err(BenchError::InvalidRange { .. })));

        let at_cap = ParameterRange::int("x", 1, MAX_SWEEP_SIZE as i64, 1);
        assert_eq!(at_cap.cardinality().unwrap(), MAX_SWEEP_SIZE);
        let past_cap = ParameterRange::int("x", 0, MAX_SWEEP_SIZE as i64, 1);
        assert!(past_cap.cardinality().is_err());
    }

    #[test]
    fn test_fractional_int_step_rejected() {
        let range = ParameterRange::new("x", 1.0, 10.0, 1.5, ParamType::Int);
        assert!(matches!(range.cardinality(), Err(BenchError::InvalidRange { .. })));
        assert!(ParameterRange::parse_spec("x", ParamType::Int, "1,10,1.5").is_err());
        assert!(ParameterRange::parse_spec("x", ParamType::Int, "1,10,2.0").is_ok());
    }

    #[test]
    fn test_record_serializes_flat_row() {
        let job = BenchmarkJob::new(
            "SELECT * FROM orders WHERE o_orderkey < {{o_orderkey:INT}}",
            Backend::Postgres,
            "tpch",
            "q_orders",
        )
        .unwrap();
        let query = ReadyQuery {
            query_text: "SELECT * FROM orders WHERE o_orderkey < 5".to_string(),
            bindings: vec![Binding {
                name: "o_orderkey".to_string(),
                param_type: ParamType::Int,
                value: ParamValue::Int(5),
            }],
        };
        let plan = NormalizedPlan {
            total_runtime: 0.25,
            filters: vec![FilterScan {
                variable: "o_orderkey".to_string(),
                total_rows: 77,
            }],
        };

        let record = PlanRecord::assemble(&job, &query, &plan);
        let row = serde_json::to_value(&record).unwrap();
        assert_eq!(row["server"], "Postgres");
        assert_eq!(row["database"], "tpch");
        assert_eq!(row["query"], "q_orders");
        assert_eq!(row["runtime"], 0.25);
        assert_eq!(row["filter_1"], "o_orderkey");
        assert_eq!(row["val_1"], 5);
        assert_eq!(row["rows_1"], 77);
        assert_eq!(row["filter_2"], "");
        assert_eq!(row["rows_3"], "");
    }

    #[test]
    fn test_record_position_requires_name_match() {
        let job = BenchmarkJob::new("SELECT {{a:INT}}", Backend::MySQL, "ds", "j").unwrap();
        let query = ReadyQuery {
            query_text: "SELECT 1".to_string(),
            bindings: vec![Binding {
                name: "a".to_string(),
                param_type: ParamType::Int,
                value: ParamValue::Int(1),
            }],
        };
        let plan = NormalizedPlan {
            total_runtime: 1.0,
            filters: vec![FilterScan {
                variable: "b".to_string(),
                total_rows: 9,
            }],
        };
        let record = PlanRecord::assemble(&job, &query, &plan);
        assert_eq!(record.triples[0].rows_scanned, None);
    }

    #[test]
    fn test_undeclared_binding_gets_no_triple() {
        let job = BenchmarkJob::new("SELECT {{a:INT}}", Backend::Postgres, "ds", "j").unwrap();
        let binding = |name: &str, v: i64| Binding {
            name: name.to_string(),
            param_type: ParamType::Int,
            value: ParamValue::Int(v),
        };
        let query = ReadyQuery {
            query_text: "SELECT 1".to_string(),
            bindings: vec![binding("zz", 7), binding("a", 1)],
        };
        let plan = NormalizedPlan {
            total_runtime: 1.0,
            filters: vec![
                FilterScan {
                    variable: "zz".to_string(),
                    total_rows: 3,
                },
                FilterScan {
                    variable: "a".to_string(),
                    total_rows: 40,
                },
            ],
        };
        let record = PlanRecord::assemble(&job, &query, &plan);
        assert_eq!(record.triples.len(), 1);
        assert_eq!(record.triples[0].filter_name, "a");
        assert_eq!(record.triples[0].rows_scanned, Some(40));

        let row = serde_json::to_value(&record).unwrap();
        assert_eq!(row["filter_1"], "a");
        assert_eq!(row["filter_2"], "");
    }

    #[test]
    fn test_job_parameter_limit() {
        let template = "{{a:INT}} {{b:INT}} {{c:INT}} {{d:INT}}";
        assert!(matches!(
            BenchmarkJob::new(template, Backend::MySQL, "ds", "j"),
            Err(BenchError::TooManyParameters(4))
        ));
    }
}
