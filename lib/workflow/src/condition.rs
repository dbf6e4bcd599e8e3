//! Edge condition evaluation.
//!
//! An edge is active iff it has no condition or its condition evaluates
//! true. Evaluation is a collaborator so hosts can plug in a richer
//! expression language.

use crate::value::{DataMap, lookup_ci};

/// Decides whether a conditional edge is active.
pub trait EdgeConditionEvaluator: Send + Sync {
    /// Evaluates `condition` against the source node's output layered over
    /// the workflow variables.
    fn evaluate(&self, condition: &str, output: &DataMap, variables: &DataMap) -> bool;
}

/// Truthiness-based evaluator.
///
/// Accepts `true`, `false`, a bare key (looked up in the source output, then
/// the variables, case-insensitively) and any of those behind a leading `!`.
/// Unknown keys are false.
#[derive(Debug, Default, Clone, Copy)]
pub struct TruthyConditionEvaluator;

impl EdgeConditionEvaluator for TruthyConditionEvaluator {
    fn evaluate(&self, condition: &str, output: &DataMap, variables: &DataMap) -> bool {
        let condition = condition.trim();
        if let Some(inner) = condition.strip_prefix('!') {
            return !self.evaluate(inner, output, variables);
        }
        match condition.to_ascii_lowercase().as_str() {
            "" | "true" => true,
            "false" => false,
            _ => lookup_ci(output, condition)
                .or_else(|| lookup_ci(variables, condition))
                .is_some_and(|v| v.is_truthy()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn scope(pairs: &[(&str, Value)]) -> DataMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn literals_and_negation() {
        let eval = TruthyConditionEvaluator;
        let empty = DataMap::new();
        assert!(eval.evaluate("true", &empty, &empty));
        assert!(!eval.evaluate(" FALSE ", &empty, &empty));
        assert!(eval.evaluate("!false", &empty, &empty));
        assert!(!eval.evaluate("unknown", &empty, &empty));
        assert!(eval.evaluate("!unknown", &empty, &empty));
    }

    #[test]
    fn output_shadows_variables() {
        let eval = TruthyConditionEvaluator;
        let output = scope(&[("approved", Value::from(false))]);
        let variables = scope(&[("approved", Value::from(true)), ("Region", Value::from("eu"))]);
        assert!(!eval.evaluate("approved", &output, &variables));
        assert!(eval.evaluate("region", &output, &variables));
    }
}
