//! # Evaluation Diagnostics
//!
//! [`DiagnosticsBuilder`] listens to an evaluation and records one
//! [`DiagnosticNode`] per visited sub-expression in an arena addressed by
//! index. A node is opened when its evaluation starts (input known, result
//! pending) and closed when it finishes.
//!
//! [`DiagnosticsTree::causes`] explains a false result: it walks the tree
//! and reports the innermost sub-expressions that evaluated to false or
//! failed.
//!
//! ```rust
//! use atrius_fhir_path::context::EvaluationContext;
//! use atrius_fhir_path::diagnostics::DiagnosticsBuilder;
//! use atrius_fhir_path::evaluator::evaluate_with_listener;
//! use atrius_fhir_path::parser::parse;
//!
//! let parsed = parse("1 > 2 or 'a' = 'b'").unwrap();
//! let mut builder = DiagnosticsBuilder::new(&parsed);
//! let mut context = EvaluationContext::new();
//! evaluate_with_listener(&parsed, &mut context, Some(&mut builder)).unwrap();
//! let tree = builder.finish();
//! let causes: Vec<&str> = tree.causes().iter().map(|n| n.text.as_str()).collect();
//! assert_eq!(causes, vec!["1 > 2", "'a' = 'b'"]);
//! ```

use std::collections::HashSet;
use std::fmt::Write as _;
use std::ops::Range;
use std::sync::Arc;

use atrius_fhirpath_support::{Collection, EvaluationError, SystemValue};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::evaluator::EvaluationListener;
use crate::json_utils::collection_to_json;
use crate::parser::{Expression, ParsedExpression, SyntaxKind};

/// Functions whose non-empty result is a selection, not a verdict.
const FILTERING_FUNCTIONS: &[&str] = &["where", "select", "ofType", "repeat"];

/// Result of a diagnostics node.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Evaluation entered the node but has not finished it.
    Pending,
    Value(Collection),
    Error(String),
}

/// One evaluated sub-expression.
#[derive(Debug, Clone)]
pub struct DiagnosticNode {
    pub text: String,
    pub kind: SyntaxKind,
    pub function: Option<String>,
    pub span: Range<usize>,
    pub depth: usize,
    pub input: Collection,
    pub outcome: Outcome,
    pub children: Vec<usize>,
}

impl DiagnosticNode {
    fn is_filtering(&self) -> bool {
        self.function
            .as_deref()
            .is_some_and(|f| FILTERING_FUNCTIONS.contains(&f))
    }

    fn boolean(&self) -> Option<bool> {
        match &self.outcome {
            Outcome::Value(c) => match c.nodes() {
                [node] => match node.system_value() {
                    Some(SystemValue::Boolean(b)) => Some(b),
                    _ => None,
                },
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    pub fn is_false(&self) -> bool {
        self.boolean() == Some(false)
    }
}

/// Arena-backed [`EvaluationListener`] building a [`DiagnosticsTree`].
#[derive(Debug)]
pub struct DiagnosticsBuilder {
    source: Arc<str>,
    nodes: Vec<DiagnosticNode>,
    stack: Vec<usize>,
    roots: Vec<usize>,
    kinds: Option<HashSet<SyntaxKind>>,
}

impl DiagnosticsBuilder {
    pub fn new(parsed: &ParsedExpression) -> Self {
        Self {
            source: parsed.source.clone(),
            nodes: Vec::new(),
            stack: Vec::new(),
            roots: Vec::new(),
            kinds: None,
        }
    }

    /// Only records nodes of the given kinds; the children of a skipped
    /// node attach to its nearest recorded ancestor.
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = SyntaxKind>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Number of nodes entered and not yet finished.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn finish(self) -> DiagnosticsTree {
        if !self.stack.is_empty() {
            warn!(open = self.stack.len(), "diagnostics finished with unclosed nodes");
        }
        DiagnosticsTree {
            source: self.source,
            nodes: self.nodes,
            roots: self.roots,
        }
    }

    fn text_of(&self, expression: &Expression) -> String {
        self.source
            .get(expression.span.clone())
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    }
}

impl EvaluationListener for DiagnosticsBuilder {
    fn tracks(&self, expression: &Expression) -> bool {
        self.kinds
            .as_ref()
            .is_none_or(|kinds| kinds.contains(&expression.syntax_kind()))
    }

    fn before_evaluation(&mut self, expression: &Expression, input: &Collection) {
        let index = self.nodes.len();
        self.nodes.push(DiagnosticNode {
            text: self.text_of(expression),
            kind: expression.syntax_kind(),
            function: expression.function_name().map(str::to_string),
            span: expression.span.clone(),
            depth: self.stack.len(),
            input: input.clone(),
            outcome: Outcome::Pending,
            children: Vec::new(),
        });
        match self.stack.last() {
            Some(&parent) => self.nodes[parent].children.push(index),
            None => self.roots.push(index),
        }
        self.stack.push(index);
    }

    fn after_evaluation(&mut self, expression: &Expression, output: Result<&Collection, &EvaluationError>) {
        let Some(index) = self.stack.pop() else {
            warn!(expression = %self.text_of(expression), "diagnostics exit without matching entry");
            return;
        };
        debug_assert_eq!(self.nodes[index].span, expression.span);
        self.nodes[index].outcome = match output {
            Ok(collection) => Outcome::Value(collection.clone()),
            Err(error) => Outcome::Error(error.to_string()),
        };
    }

    fn reset(&mut self) {
        self.nodes.clear();
        self.stack.clear();
        self.roots.clear();
    }
}

/// Completed diagnostics of one evaluation.
#[derive(Debug, Clone)]
pub struct DiagnosticsTree {
    source: Arc<str>,
    nodes: Vec<DiagnosticNode>,
    roots: Vec<usize>,
}

#[derive(Serialize)]
struct NodeJson {
    expression: String,
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    function: Option<String>,
    start: usize,
    end: usize,
    input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<NodeJson>,
}

impl DiagnosticsTree {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The node of the whole expression.
    pub fn root(&self) -> Option<&DiagnosticNode> {
        self.roots.first().map(|&i| &self.nodes[i])
    }

    pub fn node(&self, index: usize) -> Option<&DiagnosticNode> {
        self.nodes.get(index)
    }

    pub fn nodes(&self) -> &[DiagnosticNode] {
        &self.nodes
    }

    pub fn children(&self, node: &DiagnosticNode) -> impl Iterator<Item = &DiagnosticNode> {
        node.children.iter().map(|&i| &self.nodes[i])
    }

    /// The innermost false or failed sub-expressions explaining the result.
    ///
    /// True nodes and filtering functions with a non-empty selection are not
    /// explored. A false or failed node is reported only when nothing below
    /// it is.
    pub fn causes(&self) -> Vec<&DiagnosticNode> {
        let mut causes = Vec::new();
        for &root in &self.roots {
            self.collect_causes(root, &mut causes);
        }
        causes.into_iter().map(|i| &self.nodes[i]).collect()
    }

    fn collect_causes(&self, index: usize, causes: &mut Vec<usize>) {
        let node = &self.nodes[index];
        if node.boolean() == Some(true) {
            return;
        }
        if node.is_filtering() && matches!(&node.outcome, Outcome::Value(c) if !c.is_empty()) {
            return;
        }
        let before = causes.len();
        for &child in &node.children {
            self.collect_causes(child, causes);
        }
        if causes.len() == before && (node.is_false() || node.is_error()) {
            causes.push(index);
        }
    }

    fn node_json(&self, index: usize) -> NodeJson {
        let node = &self.nodes[index];
        let (result, error) = match &node.outcome {
            Outcome::Pending => (None, None),
            Outcome::Value(c) => (Some(collection_to_json(c)), None),
            Outcome::Error(e) => (None, Some(e.clone())),
        };
        NodeJson {
            expression: node.text.clone(),
            kind: format!("{:?}", node.kind),
            function: node.function.clone(),
            start: node.span.start,
            end: node.span.end,
            input: collection_to_json(&node.input),
            result,
            error,
            children: node.children.iter().map(|&c| self.node_json(c)).collect(),
        }
    }

    pub fn to_json(&self) -> Value {
        let roots: Vec<NodeJson> = self.roots.iter().map(|&r| self.node_json(r)).collect();
        let causes: Vec<&str> = self.causes().into_iter().map(|n| n.text.as_str()).collect();
        serde_json::json!({
            "expression": &*self.source,
            "tree": roots,
            "causes": causes,
        })
    }

    /// Indented text rendering, one line per node.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            let outcome = match &node.outcome {
                Outcome::Pending => "?".to_string(),
                Outcome::Value(c) => collection_to_json(c).to_string(),
                Outcome::Error(e) => format!("error: {}", e),
            };
            let _ = writeln!(out, "{}{} => {}", "  ".repeat(node.depth), node.text, outcome);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvaluationContext;
    use crate::evaluator::evaluate_with_listener;
    use crate::parser::parse;
    use atrius_fhir_model::Element;

    fn diagnose(expression: &str, context: &mut EvaluationContext) -> DiagnosticsTree {
        let parsed = parse(expression).unwrap();
        let mut builder = DiagnosticsBuilder::new(&parsed);
        let _ = evaluate_with_listener(&parsed, context, Some(&mut builder));
        assert_eq!(builder.depth(), 0);
        builder.finish()
    }

    fn patient() -> EvaluationContext {
        let patient = Element::new("Patient")
            .with("active", Element::boolean(false))
            .with("gender", Element::code("female"));
        EvaluationContext::from_resource(std::sync::Arc::new(patient))
    }

    #[test]
    fn nodes_nest_by_depth() {
        let tree = diagnose("Patient.active.not()", &mut patient());
        let root = tree.root().unwrap();
        assert_eq!(root.text, "Patient.active.not()");
        assert_eq!(root.function.as_deref(), Some("not"));
        assert_eq!(root.depth, 0);
        assert!(tree.nodes().iter().all(|n| n.outcome != Outcome::Pending));
        let child = tree.children(root).next().unwrap();
        assert_eq!(child.depth, 1);
        assert_eq!(child.text, "Patient.active");
    }

    #[test]
    fn innermost_false_is_the_cause() {
        let tree = diagnose("gender = 'female' and active", &mut patient());
        let causes: Vec<&str> = tree.causes().iter().map(|n| n.text.as_str()).collect();
        assert_eq!(causes, vec!["active"]);
    }

    #[test]
    fn filtering_selection_is_not_explored() {
        let tree = diagnose("Patient.where(gender = 'male').exists()", &mut patient());
        let causes: Vec<&str> = tree.causes().iter().map(|n| n.text.as_str()).collect();
        assert_eq!(causes, vec!["gender = 'male'"]);

        let tree = diagnose("Patient.where(gender = 'female').active", &mut patient());
        assert!(tree.causes().iter().all(|n| n.function.as_deref() != Some("where")));
    }

    #[test]
    fn errors_are_recorded_and_closed() {
        let tree = diagnose("(1 | 2).not()", &mut EvaluationContext::new());
        let root = tree.root().unwrap();
        assert!(root.is_error());
        assert_eq!(tree.causes().len(), 1);
        assert!(tree.to_json()["tree"][0]["error"].is_string());
    }

    #[test]
    fn kind_filter_skips_nodes_consistently() {
        let parsed = parse("1 + 2 = 3 and true").unwrap();
        let mut builder = DiagnosticsBuilder::new(&parsed).with_kinds([SyntaxKind::And, SyntaxKind::Equality]);
        evaluate_with_listener(&parsed, &mut EvaluationContext::new(), Some(&mut builder)).unwrap();
        assert_eq!(builder.depth(), 0);
        let tree = builder.finish();
        let kinds: Vec<SyntaxKind> = tree.nodes().iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![SyntaxKind::And, SyntaxKind::Equality]);
        assert_eq!(tree.nodes()[1].depth, 1);
    }

    #[test]
    fn reset_clears_state() {
        let parsed = parse("1 = 1").unwrap();
        let mut builder = DiagnosticsBuilder::new(&parsed);
        builder.before_evaluation(&parsed.root, &Collection::empty());
        assert_eq!(builder.depth(), 1);
        builder.reset();
        assert_eq!(builder.depth(), 0);
        assert!(builder.is_empty());
        assert!(builder.finish().root().is_none());
    }

    #[test]
    fn render_indents_children() {
        let tree = diagnose("1 = 2", &mut EvaluationContext::new());
        let text = tree.render();
        assert!(text.starts_with("1 = 2 => [false]"));
        assert!(text.contains("\n  1 => [1]"));
    }
}
