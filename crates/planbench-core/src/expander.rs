//! Template expansion
//!
//! Templates carry `{{name:TYPE}}` placeholders. A sweep is the cartesian
//! product of the parameter ranges in the order given, last range varying
//! fastest, and every combination becomes one [`ReadyQuery`].

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::types::{
    Binding, ParamType, ParamValue, ParameterRange, QueryParameter, ReadyQuery, MAX_SWEEP_SIZE,
};
use crate::{BenchError, Result};

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{(\w+):(\w+)\}\}").unwrap())
}

/// Placeholders of `template` in order of first appearance
pub fn extract_parameters(template: &str) -> Result<Vec<QueryParameter>> {
    let mut parameters: Vec<QueryParameter> = Vec::new();
    for caps in placeholder_pattern().captures_iter(template) {
        let name = &caps[1];
        let param_type = ParamType::from_tag(name, &caps[2])?;
        if !parameters.iter().any(|p| p.name == name) {
            parameters.push(QueryParameter {
                name: name.to_string(),
                param_type,
            });
        }
    }
    Ok(parameters)
}

/// Substitute every placeholder of `template` from `bindings`
pub fn build_query(template: &str, bindings: &[Binding]) -> Result<String> {
    let values: HashMap<&str, ParamValue> =
        bindings.iter().map(|b| (b.name.as_str(), b.value)).collect();

    let mut query = String::with_capacity(template.len());
    let mut last = 0;
    for caps in placeholder_pattern().captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        query.push_str(&template[last..whole.start()]);
        query.push_str(&render_placeholder(&caps, &values)?);
        last = whole.end();
    }
    query.push_str(&template[last..]);
    Ok(query)
}

fn render_placeholder(caps: &Captures<'_>, values: &HashMap<&str, ParamValue>) -> Result<String> {
    let name = &caps[1];
    let param_type = ParamType::from_tag(name, &caps[2])?;
    let value = values
        .get(name)
        .ok_or_else(|| BenchError::MissingBinding(name.to_string()))?;
    Ok(value.render(param_type))
}

/// Expand `template` over the cartesian product of `ranges`
pub fn expand(template: &str, ranges: &[ParameterRange]) -> Result<Vec<ReadyQuery>> {
    let declared = extract_parameters(template)?;
    for (i, range) in ranges.iter().enumerate() {
        let invalid = |reason: &str| BenchError::InvalidRange {
            name: range.name.clone(),
            reason: reason.to_string(),
        };
        if !declared.iter().any(|p| p.name == range.name) {
            return Err(invalid("not a placeholder of the template"));
        }
        if ranges[..i].iter().any(|r| r.name == range.name) {
            return Err(invalid("range given more than once"));
        }
    }
    sweep_size(ranges)?;

    let value_lists = ranges
        .iter()
        .map(ParameterRange::values)
        .collect::<Result<Vec<_>>>()?;

    if value_lists.iter().any(Vec::is_empty) {
        return Ok(Vec::new());
    }

    let total: usize = value_lists.iter().map(Vec::len).product();
    let mut queries = Vec::with_capacity(total);
    let mut odometer = vec![0usize; value_lists.len()];

    loop {
        let bindings: Vec<Binding> = ranges
            .iter()
            .zip(&odometer)
            .zip(&value_lists)
            .map(|((range, &idx), values)| Binding {
                name: range.name.clone(),
                param_type: range.param_type,
                value: values[idx],
            })
            .collect();

        let query_text = build_query(template, &bindings)?;
        queries.push(ReadyQuery {
            query_text,
            bindings,
        });

        // Advance the last wheel first; carry leftwards
        let mut wheel = odometer.len();
        loop {
            if wheel == 0 {
                return Ok(queries);
            }
            wheel -= 1;
            odometer[wheel] += 1;
            if odometer[wheel] < value_lists[wheel].len() {
                break;
            }
            odometer[wheel] = 0;
        }
    }
}

/// Cardinality of the sweep without materializing it
pub fn sweep_size(ranges: &[ParameterRange]) -> Result<usize> {
    let mut total = 1usize;
    for range in ranges {
        total = total
            .checked_mul(range.cardinality()?)
            .filter(|&n| n <= MAX_SWEEP_SIZE)
            .ok_or_else(|| BenchError::InvalidRange {
                name: ranges.iter().map(|r| r.name.as_str()).collect::<Vec<_>>().join(","),
                reason: format!("sweep exceeds {} queries", MAX_SWEEP_SIZE),
            })?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_parameters() {
        let template = "SELECT * FROM lineitem WHERE l_shipdate <= {{days:INT}} \
                        AND l_discount > {{disc:FLOAT}} AND l_tax < {{days:INT}}";
        let params = extract_parameters(template).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "days");
        assert_eq!(params[0].param_type, ParamType::Int);
        assert_eq!(params[1].name, "disc");
        assert_eq!(params[1].param_type, ParamType::Float);
    }

    #[test]
    fn test_extract_unsupported_type() {
        let err = extract_parameters("WHERE d = {{day:DATE}}").unwrap_err();
        assert!(matches!(err, BenchError::UnsupportedType { .. }));
    }

    #[test]
    fn test_odometer_order() {
        let ranges = vec![
            ParameterRange::int("a", 1, 2, 1),
            ParameterRange::int("b", 10, 30, 10),
        ];
        let queries = expand("a={{a:INT}} b={{b:INT}}", &ranges).unwrap();
        let texts: Vec<&str> = queries.iter().map(|q| q.query_text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "a=1 b=10", "a=1 b=20", "a=1 b=30", "a=2 b=10", "a=2 b=20", "a=2 b=30",
            ]
        );
        assert_eq!(queries[4].bindings[0].name, "a");
        assert_eq!(queries[4].bindings[1].value, ParamValue::Int(20));
    }

    #[test]
    fn test_repeated_placeholder_substituted_everywhere() {
        let ranges = vec![ParameterRange::int("x", 5, 5, 1)];
        let queries = expand("{{x:INT}} + {{x:INT}}", &ranges).unwrap();
        assert_eq!(queries[0].query_text, "5 + 5");
    }

    #[test]
    fn test_float_placeholder_rendering() {
        let ranges = vec![ParameterRange::int("x", 3, 3, 1)];
        let queries = expand("v = {{x:FLOAT}}", &ranges).unwrap();
        assert_eq!(queries[0].query_text, "v = 3.0");
    }

    #[test]
    fn test_missing_binding() {
        let ranges = vec![ParameterRange::int("a", 1, 3, 1)];
        let err = expand("{{a:INT}} {{b:INT}}", &ranges).unwrap_err();
        assert!(matches!(err, BenchError::MissingBinding(name) if name == "b"));
    }

    #[test]
    fn test_unsupported_type_at_substitution() {
        let ranges = vec![ParameterRange::int("a", 1, 3, 1)];
        let err = expand("{{a:TEXT}}", &ranges).unwrap_err();
        assert!(matches!(err, BenchError::UnsupportedType { .. }));
    }

    #[test]
    fn test_no_ranges_without_placeholders() {
        let queries = expand("SELECT 1", &[]).unwrap();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].bindings.is_empty());
    }

    #[test]
    fn test_sweep_size() {
        let ranges = vec![
            ParameterRange::int("a", 0, 10, 5),
            ParameterRange::float("b", 0.0, 0.5, 0.25),
        ];
        assert_eq!(sweep_size(&ranges).unwrap(), 9);
        assert_eq!(expand("{{a:INT}} {{b:FLOAT}}", &ranges).unwrap().len(), 9);
    }

    #[test]
    fn test_range_without_placeholder_rejected() {
        let ranges = vec![
            ParameterRange::int("a", 1, 2, 1),
            ParameterRange::int("zz", 1, 2, 1),
        ];
        let err = expand("SELECT {{a:INT}}", &ranges).unwrap_err();
        assert!(matches!(err, BenchError::InvalidRange { name, .. } if name == "zz"));
    }

    #[test]
    fn test_duplicate_range_rejected() {
        let ranges = vec![
            ParameterRange::int("a", 1, 2, 1),
            ParameterRange::int("a", 5, 6, 1),
        ];
        let err = expand("SELECT {{a:INT}}", &ranges).unwrap_err();
        assert!(matches!(err, BenchError::InvalidRange { name, .. } if name == "a"));
    }

    #[test]
    fn test_sweep_product_is_capped() {
        // Each range alone is allowed, their product is not
        let ranges = vec![
            ParameterRange::int("a", 1, 1_000, 1),
            ParameterRange::int("b", 1, 1_000, 1),
            ParameterRange::int("c", 1, 1_000, 1),
        ];
        assert!(ranges.iter().all(|r| r.cardinality().is_ok()));
        assert!(matches!(
            sweep_size(&ranges),
            Err(BenchError::InvalidRange { .. })
        ));
        assert!(expand("{{a:INT}} {{b:INT}} {{c:INT}}", &ranges).is_err());
    }
}
