//! Static workflow validation.
//!
//! Validation is a pure function of the graph. It checks, in order:
//! 1. the graph has nodes (otherwise stops)
//! 2. a trigger exists
//! 3. every node is reachable from some trigger
//! 4. action nodes lead somewhere (warning only)
//! 5. per-node configuration, through pluggable validators
//! 6. the graph has no cycles
//!
//! Loops are not a first-class construct, so every cycle is invalid.

use crate::edge::{Edge, EdgeId};
use crate::graph::WorkflowGraph;
use crate::node::{NodeCategory, NodeId};
use crate::value::DataMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Machine-readable finding codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    NoNodes,
    NoTrigger,
    UnreachableNode,
    NoOutgoingEdges,
    InvalidNodeConfig,
    CycleDetected,
}

impl ValidationCode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoNodes => "NO_NODES",
            Self::NoTrigger => "NO_TRIGGER",
            Self::UnreachableNode => "UNREACHABLE_NODE",
            Self::NoOutgoingEdges => "NO_OUTGOING_EDGES",
            Self::InvalidNodeConfig => "INVALID_NODE_CONFIG",
            Self::CycleDetected => "CYCLE_DETECTED",
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub node_id: Option<NodeId>,
    pub edge_id: Option<EdgeId>,
    pub code: ValidationCode,
    pub message: String,
    pub severity: Severity,
}

impl ValidationError {
    fn error(code: ValidationCode, message: String) -> Self {
        Self {
            node_id: None,
            edge_id: None,
            code,
            message,
            severity: Severity::Error,
        }
    }

    fn warning(code: ValidationCode, message: String) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, message)
        }
    }

    fn at_node(mut self, node_id: &NodeId) -> Self {
        self.node_id = Some(node_id.clone());
        self
    }

    fn at_edge(mut self, edge_id: &EdgeId) -> Self {
        self.edge_id = Some(edge_id.clone());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// All findings for one graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// False iff some finding has `Severity::Error`.
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    fn from_findings(errors: Vec<ValidationError>) -> Self {
        Self {
            is_valid: !errors.iter().any(|e| e.severity == Severity::Error),
            errors,
        }
    }

    /// Findings with `Severity::Error`.
    pub fn fatal(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter().filter(|e| e.severity == Severity::Error)
    }

    #[must_use]
    pub fn has_code(&self, code: ValidationCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }
}

/// Checks one node's static configuration.
pub trait NodeConfigValidator: Send + Sync {
    /// Returns every problem found, or `Ok` if the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns one message per configuration problem.
    fn validate(&self, node_type: &str, config: &DataMap) -> Result<(), Vec<String>>;
}

/// Requires a fixed set of keys in a node's activity properties.
#[derive(Debug, Clone, Default)]
pub struct RequiredPropertiesValidator {
    required: Vec<String>,
}

impl RequiredPropertiesValidator {
    #[must_use]
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
        }
    }
}

impl NodeConfigValidator for RequiredPropertiesValidator {
    fn validate(&self, node_type: &str, config: &DataMap) -> Result<(), Vec<String>> {
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|key| config.get(key.as_str()).is_none_or(|v| v.is_null()))
            .map(|key| format!("{node_type} requires property '{key}'"))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing)
        }
    }
}

/// Graph validator with per-activity-type configuration checks.
#[derive(Clone, Default)]
pub struct WorkflowValidator {
    config_validators: HashMap<String, Arc<dyn NodeConfigValidator>>,
}

impl WorkflowValidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a configuration validator for one activity type.
    #[must_use]
    pub fn with_config_validator(
        mut self,
        activity_type: impl Into<String>,
        validator: impl NodeConfigValidator + 'static,
    ) -> Self {
        self.config_validators
            .insert(activity_type.into(), Arc::new(validator));
        self
    }

    /// Validates `graph`. Pure: the same graph always yields the same result.
    #[must_use]
    pub fn validate(&self, graph: &WorkflowGraph) -> ValidationResult {
        let mut findings = Vec::new();

        if graph.node_count() == 0 {
            findings.push(ValidationError::error(
                ValidationCode::NoNodes,
                "workflow has no nodes".to_string(),
            ));
            return ValidationResult::from_findings(findings);
        }

        let triggers: Vec<&NodeId> = graph.trigger_nodes().into_iter().map(|n| &n.id).collect();
        if triggers.is_empty() {
            findings.push(ValidationError::error(
                ValidationCode::NoTrigger,
                "workflow has no trigger node".to_string(),
            ));
        } else {
            check_reachability(graph, &triggers, &mut findings);
        }

        for node in graph.nodes() {
            let leaves = graph
                .outgoing_edges(&node.id)
                .map_or(true, |edges| edges.is_empty());
            if node.category == NodeCategory::Action && leaves {
                findings.push(
                    ValidationError::warning(
                        ValidationCode::NoOutgoingEdges,
                        format!("node {} has no outgoing edges", node.id),
                    )
                    .at_node(&node.id),
                );
            }
        }

        for node in graph.nodes() {
            let Some(validator) = self.config_validators.get(&node.activity_type) else {
                continue;
            };
            if let Err(problems) = validator.validate(&node.activity_type, &node.activity_properties)
            {
                findings.extend(problems.into_iter().map(|message| {
                    ValidationError::error(ValidationCode::InvalidNodeConfig, message)
                        .at_node(&node.id)
                }));
            }
        }

        CycleSearch::new(graph).run(&mut findings);

        ValidationResult::from_findings(findings)
    }
}

impl fmt::Debug for WorkflowValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.config_validators.keys().collect();
        types.sort();
        f.debug_struct("WorkflowValidator")
            .field("config_validators", &types)
            .finish()
    }
}

/// Multi-source BFS from every trigger.
fn check_reachability<'g>(
    graph: &'g WorkflowGraph,
    triggers: &[&'g NodeId],
    findings: &mut Vec<ValidationError>,
) {
    let mut reached: HashSet<&NodeId> = triggers.iter().copied().collect();
    let mut queue: VecDeque<&NodeId> = triggers.iter().copied().collect();

    while let Some(current) = queue.pop_front() {
        for edge in graph.outgoing_edges(current).unwrap_or_default() {
            if reached.insert(&edge.target) {
                queue.push_back(&edge.target);
            }
        }
    }

    for node in graph.nodes() {
        if !reached.contains(&node.id) {
            findings.push(
                ValidationError::error(
                    ValidationCode::UnreachableNode,
                    format!("node {} is not reachable from any trigger", node.id),
                )
                .at_node(&node.id),
            );
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    OnStack,
    Done,
}

/// DFS with an explicit recursion stack over every node.
struct CycleSearch<'g> {
    graph: &'g WorkflowGraph,
    state: HashMap<&'g NodeId, Visit>,
    stack: Vec<&'g NodeId>,
}

impl<'g> CycleSearch<'g> {
    fn new(graph: &'g WorkflowGraph) -> Self {
        Self {
            graph,
            state: HashMap::new(),
            stack: Vec::new(),
        }
    }

    fn run(mut self, findings: &mut Vec<ValidationError>) {
        let graph = self.graph;
        for node in graph.nodes() {
            if !self.state.contains_key(&node.id) {
                self.search_from(&node.id, findings);
            }
        }
    }

    fn search_from(&mut self, root: &'g NodeId, findings: &mut Vec<ValidationError>) {
        let mut frames = vec![self.enter(root)];
        while let Some(frame) = frames.last_mut() {
            let Some(edge) = frame.edges.get(frame.next).copied() else {
                let finished = frame.node_id;
                frames.pop();
                self.stack.pop();
                self.state.insert(finished, Visit::Done);
                continue;
            };
            frame.next += 1;
            match self.state.get(&edge.target) {
                None => frames.push(self.enter(&edge.target)),
                Some(Visit::OnStack) => self.report(edge, findings),
                Some(Visit::Done) => {}
            }
        }
    }

    fn enter(&mut self, node_id: &'g NodeId) -> Frame<'g> {
        let graph = self.graph;
        self.state.insert(node_id, Visit::OnStack);
        self.stack.push(node_id);
        Frame {
            node_id,
            edges: graph.outgoing_edges(node_id).unwrap_or_default(),
            next: 0,
        }
    }

    /// Records the cycle closed by `edge`, whose target is on the path.
    fn report(&self, edge: &Edge, findings: &mut Vec<ValidationError>) {
        let start = self
            .stack
            .iter()
            .position(|id| *id == &edge.target)
            .unwrap_or(0);
        let mut path: Vec<String> = self.stack[start..].iter().map(ToString::to_string).collect();
        path.push(edge.target.to_string());
        findings.push(
            ValidationError::error(
                ValidationCode::CycleDetected,
                format!("cycle detected: {}", path.join(" -> ")),
            )
            .at_node(&edge.target)
            .at_edge(&edge.id),
        );
    }
}

/// One node on the DFS path and its remaining outgoing edges.
struct Frame<'g> {
    node_id: &'g NodeId,
    edges: Vec<&'g Edge>,
    next: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::Edge;
    use crate::node::Node;
    use nodeflow_core::GraphId;

    fn graph(nodes: Vec<Node>, edges: Vec<Edge>) -> WorkflowGraph {
        WorkflowGraph::from_parts(GraphId::new(), "test", nodes, edges).unwrap()
    }

    fn codes(result: &ValidationResult) -> Vec<ValidationCode> {
        result.errors.iter().map(|e| e.code).collect()
    }

    #[test]
    fn empty_graph_short_circuits() {
        let result = WorkflowValidator::new().validate(&graph(vec![], vec![]));
        assert!(!result.is_valid);
        assert_eq!(codes(&result), vec![ValidationCode::NoNodes]);
    }

    #[test]
    fn missing_trigger_does_not_stop_other_checks() {
        let g = graph(
            vec![Node::new("a", "Data.Transform"), Node::new("b", "Data.Transform")],
            vec![Edge::between("a", "b"), Edge::between("b", "a")],
        );
        let result = WorkflowValidator::new().validate(&g);
        assert!(!result.is_valid);
        assert!(result.has_code(ValidationCode::NoTrigger));
        assert!(result.has_code(ValidationCode::CycleDetected));
    }

    #[test]
    fn disconnected_node_is_unreachable() {
        let g = graph(
            vec![
                Node::new("T", "Trigger.Manual"),
                Node::new("A", "Data.Transform").with_category(NodeCategory::Terminal),
                Node::new("B", "Data.Transform").with_category(NodeCategory::Terminal),
            ],
            vec![Edge::between("T", "A")],
        );
        let result = WorkflowValidator::new().validate(&g);

        assert!(!result.is_valid);
        let unreachable: Vec<_> = result
            .errors
            .iter()
            .filter(|e| e.code == ValidationCode::UnreachableNode)
            .collect();
        assert_eq!(unreachable.len(), 1);
        assert_eq!(unreachable[0].node_id, Some(NodeId::from("B")));
    }

    #[test]
    fn node_with_edges_can_still_be_unreachable() {
        let g = graph(
            vec![
                Node::new("T", "Trigger.Manual").with_category(NodeCategory::Trigger),
                Node::new("X", "Data.Transform"),
                Node::new("Y", "Data.Transform").with_category(NodeCategory::Terminal),
            ],
            vec![Edge::between("X", "Y")],
        );
        let result = WorkflowValidator::new().validate(&g);
        let unreachable: Vec<_> = result
            .errors
            .iter()
            .filter(|e| e.code == ValidationCode::UnreachableNode)
            .filter_map(|e| e.node_id.clone())
            .collect();
        assert_eq!(unreachable, vec![NodeId::from("X"), NodeId::from("Y")]);
    }

    #[test]
    fn two_node_cycle_is_detected() {
        let g = graph(
            vec![
                Node::new("T", "Trigger.Manual"),
                Node::new("A", "Data.Transform"),
                Node::new("B", "Data.Transform"),
            ],
            vec![
                Edge::new("t-a", "T", "A"),
                Edge::new("a-b", "A", "B"),
                Edge::new("b-a", "B", "A"),
            ],
        );
        let result = WorkflowValidator::new().validate(&g);

        assert!(!result.is_valid);
        let cycle = result
            .errors
            .iter()
            .find(|e| e.code == ValidationCode::CycleDetected)
            .unwrap();
        assert_eq!(cycle.edge_id, Some(EdgeId::from("b-a")));
        assert_eq!(cycle.message, "cycle detected: A -> B -> A");
    }

    #[test]
    fn cycle_outside_trigger_reach_is_still_detected() {
        let g = graph(
            vec![
                Node::new("T", "Trigger.Manual"),
                Node::new("A", "Data.Transform").with_category(NodeCategory::Terminal),
                Node::new("X", "Data.Transform"),
                Node::new("Y", "Data.Transform"),
            ],
            vec![Edge::between("T", "A"), Edge::between("X", "Y"), Edge::between("Y", "X")],
        );
        let result = WorkflowValidator::new().validate(&g);
        assert!(result.has_code(ValidationCode::CycleDetected));
    }

    #[test]
    fn dangling_action_is_only_a_warning() {
        let g = graph(
            vec![Node::new("T", "Trigger.Manual"), Node::new("A", "Http.Get")],
            vec![Edge::between("T", "A")],
        );
        let result = WorkflowValidator::new().validate(&g);

        assert!(result.is_valid);
        assert_eq!(codes(&result), vec![ValidationCode::NoOutgoingEdges]);
        assert_eq!(result.errors[0].severity, Severity::Warning);
    }

    #[test]
    fn config_validator_findings_are_fatal() {
        let g = graph(
            vec![
                Node::new("T", "Trigger.Manual"),
                Node::new("H", "Http.Get").with_category(NodeCategory::Terminal),
            ],
            vec![Edge::between("T", "H")],
        );
        let validator = WorkflowValidator::new()
            .with_config_validator("Http.Get", RequiredPropertiesValidator::new(["url", "method"]));
        let result = validator.validate(&g);

        assert!(!result.is_valid);
        let config: Vec<_> = result
            .fatal()
            .filter(|e| e.code == ValidationCode::InvalidNodeConfig)
            .collect();
        assert_eq!(config.len(), 2);
        assert!(config[0].message.contains("'url'"));
        assert_eq!(config[0].node_id, Some(NodeId::from("H")));
    }

    #[test]
    fn validation_is_idempotent() {
        let g = graph(
            vec![
                Node::new("T", "Trigger.Manual"),
                Node::new("A", "Data.Transform"),
                Node::new("B", "Data.Transform"),
                Node::new("C", "Data.Transform"),
            ],
            vec![
                Edge::between("T", "A"),
                Edge::between("A", "B"),
                Edge::between("B", "A"),
            ],
        );
        let validator = WorkflowValidator::new();
        assert_eq!(validator.validate(&g), validator.validate(&g));
    }

    #[test]
    fn long_chain_is_checked_without_recursion() {
        let len = 100_000;
        let mut nodes = vec![Node::new("n0", "Trigger.Manual")];
        nodes.extend((1..len).map(|i| Node::new(format!("n{i}"), "Data.Transform")));
        let mut edges: Vec<Edge> = (1..len)
            .map(|i| Edge::between(format!("n{}", i - 1), format!("n{i}")))
            .collect();
        edges.push(Edge::between(format!("n{}", len - 1), "n1"));

        let result = WorkflowValidator::new().validate(&graph(nodes, edges));
        let cycles: Vec<_> = result
            .errors
            .iter()
            .filter(|e| e.code == ValidationCode::CycleDetected)
            .collect();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].node_id, Some(NodeId::from("n1")));
    }

    #[test]
    fn graph_document_without_categories_validates() {
        let graph: WorkflowGraph = serde_json::from_value(serde_json::json!({
            "name": "from editor",
            "nodes": [
                {"id": "start", "activityType": "Trigger.Manual"},
                {"id": "shape", "activityType": "Data.Transform"}
            ],
            "edges": [
                {"id": "e1", "source": "start", "target": "shape"}
            ]
        }))
        .unwrap();

        let result = WorkflowValidator::new().validate(&graph);
        assert!(result.is_valid, "{:?}", result.errors);
        assert!(!result.has_code(ValidationCode::NoTrigger));
    }

    #[test]
    fn codes_serialize_in_screaming_snake_case() {
        let json = serde_json::to_string(&ValidationCode::UnreachableNode).unwrap();
        assert_eq!(json, "\"UNREACHABLE_NODE\"");
        assert_eq!(ValidationCode::CycleDetected.to_string(), "CYCLE_DETECTED");
    }
}
