//! `-u/--output-filter`: a small expression language over result fields —
//! `&&`-joined equality/inequality clauses, e.g. `classification==synack &&
//! success==true`. Not a general expression grammar; just enough to let
//! users narrow the output stream without a downstream `grep`/`jq` pass.

use crate::error::{Result, ScanError};
use crate::probe::FieldRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
}

#[derive(Debug, Clone)]
struct Clause {
    field: String,
    op: Op,
    value: String,
}

#[derive(Debug, Clone)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    /// The filter applied when the user supplies no `-u/--output-filter`:
    /// only successful results are emitted (spec.md §8 Scenario 3).
    pub fn default_success_filter() -> Self {
        Self {
            clauses: vec![Clause { field: "success".to_string(), op: Op::Eq, value: "true".to_string() }],
        }
    }

    pub fn parse(expr: &str) -> Result<Self> {
        let mut clauses = Vec::new();
        for raw in expr.split("&&") {
            let raw = raw.trim();
            if raw.is_empty() {
                return Err(ScanError::Config(format!("empty clause in output filter: {expr:?}")));
            }
            let (field, op, value) = if let Some((f, v)) = raw.split_once("!=") {
                (f, Op::Ne, v)
            } else if let Some((f, v)) = raw.split_once("==") {
                (f, Op::Eq, v)
            } else {
                return Err(ScanError::Config(format!(
                    "output filter clause missing == or !=: {raw:?}"
                )));
            };
            clauses.push(Clause {
                field: field.trim().to_string(),
                op,
                value: value.trim().trim_matches('\'').trim_matches('"').to_string(),
            });
        }
        if clauses.is_empty() {
            return Err(ScanError::Config("output filter has no clauses".into()));
        }
        Ok(Self { clauses })
    }

    pub fn matches(&self, record: &FieldRecord) -> bool {
        self.clauses.iter().all(|clause| {
            let actual = record.get(&clause.field).map(|v| v.as_csv_cell()).unwrap_or_default();
            match clause.op {
                Op::Eq => actual == clause.value,
                Op::Ne => actual != clause.value,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::FieldValue;

    fn record(classification: &str, success: bool) -> FieldRecord {
        let mut r = FieldRecord::new();
        r.push("classification", FieldValue::Str(classification.into()));
        r.push("success", FieldValue::Bool(success));
        r
    }

    #[test]
    fn single_equality_clause() {
        let f = Filter::parse("classification==synack").unwrap();
        assert!(f.matches(&record("synack", true)));
        assert!(!f.matches(&record("rst", true)));
    }

    #[test]
    fn conjunction_of_clauses() {
        let f = Filter::parse("classification==synack && success==true").unwrap();
        assert!(f.matches(&record("synack", true)));
        assert!(!f.matches(&record("synack", false)));
    }

    #[test]
    fn inequality_clause() {
        let f = Filter::parse("classification!=rst").unwrap();
        assert!(f.matches(&record("synack", true)));
        assert!(!f.matches(&record("rst", false)));
    }

    #[test]
    fn rejects_malformed_expression() {
        assert!(Filter::parse("classification").is_err());
        assert!(Filter::parse("").is_err());
    }
}
