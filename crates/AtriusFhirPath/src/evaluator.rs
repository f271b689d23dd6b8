//! # FHIRPath Evaluator
//!
//! Walks a parsed [`Expression`] against an [`EvaluationContext`] and
//! produces a [`Collection`]. Each term is evaluated with the collection
//! produced by its left-hand side as input; function arguments are
//! evaluated against the current `$this` focus.
//!
//! Functions whose arguments are re-evaluated per input item (`where`,
//! `select`, `all`, `exists`, `repeat`, `iif`, `trace`) and the type
//! functions (`is`, `as`, `ofType`) are implemented here. Every other
//! function is dispatched through the [`FunctionRegistry`](crate::registry::FunctionRegistry)
//! held by the context.
//!
//! An optional [`EvaluationListener`] observes every visited node in strict
//! enter/exit pairs; [`DiagnosticsBuilder`](crate::diagnostics::DiagnosticsBuilder)
//! uses this to build a diagnostics tree.

use std::collections::VecDeque;

use atrius_fhirpath_support::conversion::{evaluates_to_true, singleton_boolean};
use atrius_fhirpath_support::{Collection, EvaluationError, IntoCollection, Node, SystemValue};
use tracing::debug;

use crate::context::EvaluationContext;
use crate::operators;
use crate::parser::{ExprKind, Expression, Invocation, Literal, ParsedExpression, Term};
use crate::type_function::{is_type, resolve_type};

/// Observer of sub-expression evaluation.
///
/// `tracks` is consulted once per visited node; when it returns true the node
/// gets exactly one `before_evaluation` and one `after_evaluation` call, the
/// latter even when evaluation of the node failed.
pub trait EvaluationListener {
    fn tracks(&self, expression: &Expression) -> bool {
        let _ = expression;
        true
    }

    fn before_evaluation(&mut self, expression: &Expression, input: &Collection);

    fn after_evaluation(
        &mut self,
        expression: &Expression,
        output: Result<&Collection, &EvaluationError>,
    );

    /// Discards any partially collected state.
    fn reset(&mut self);
}

/// Evaluates `parsed` on the context node of `context`.
pub fn evaluate(
    parsed: &ParsedExpression,
    context: &mut EvaluationContext,
) -> Result<Collection, EvaluationError> {
    evaluate_with_listener(parsed, context, None)
}

pub fn evaluate_with_listener(
    parsed: &ParsedExpression,
    context: &mut EvaluationContext,
    listener: Option<&mut dyn EvaluationListener>,
) -> Result<Collection, EvaluationError> {
    let input = context.context_node().cloned().to_collection();
    debug!(expression = %parsed.source, "evaluating");
    let mut evaluator = Evaluator {
        context,
        listener,
        frames: Vec::new(),
        root_input: input.clone(),
    };
    evaluator.eval(&parsed.root, &input)
}

struct Frame {
    this: Node,
    index: usize,
}

struct Evaluator<'a, 'l> {
    context: &'a mut EvaluationContext,
    listener: Option<&'l mut dyn EvaluationListener>,
    frames: Vec<Frame>,
    root_input: Collection,
}

/// Arity of the functions evaluated here, checked before any argument is touched.
fn visitor_arity(name: &str) -> Option<(usize, usize)> {
    let arity = match name {
        "where" | "select" | "all" | "repeat" | "is" | "as" | "ofType" => (1, 1),
        "exists" => (0, 1),
        "iif" => (2, 3),
        "trace" => (1, 2),
        _ => return None,
    };
    Some(arity)
}

fn literal_collection(literal: &Literal) -> Collection {
    let value = match literal {
        Literal::Null => return Collection::empty(),
        Literal::Boolean(b) => SystemValue::Boolean(*b),
        Literal::String(s) => SystemValue::String(s.clone()),
        Literal::Number(d) => SystemValue::Decimal(*d),
        Literal::Integer(i) => SystemValue::Integer(*i),
        Literal::Date(d) => SystemValue::Date(d.clone()),
        Literal::DateTime(dt) => SystemValue::DateTime(dt.clone()),
        Literal::Time(t) => SystemValue::Time(t.clone()),
        Literal::Quantity(value, unit) => {
            return Collection::singleton(Node::quantity(*value, unit.clone()));
        }
    };
    Collection::singleton(Node::from_system_value(value))
}

/// Identity used by `repeat()`: tree nodes by position, values by equality.
fn same_node(a: &Node, b: &Node) -> bool {
    match (a.path(), b.path()) {
        (Some(pa), Some(pb)) => pa == pb,
        _ => a == b,
    }
}

impl Evaluator<'_, '_> {
    fn eval(&mut self, expression: &Expression, input: &Collection) -> Result<Collection, EvaluationError> {
        let tracked = match self.listener.as_deref_mut() {
            Some(listener) if listener.tracks(expression) => {
                listener.before_evaluation(expression, input);
                true
            }
            _ => false,
        };
        let result = self.eval_kind(expression, input);
        if tracked {
            if let Some(listener) = self.listener.as_deref_mut() {
                listener.after_evaluation(expression, result.as_ref());
            }
        }
        result
    }

    fn eval_kind(&mut self, expression: &Expression, input: &Collection) -> Result<Collection, EvaluationError> {
        match &expression.kind {
            ExprKind::Term(term) => self.eval_term(term, input),
            ExprKind::Invocation(left, invocation) => {
                let base = self.eval(left, input)?;
                self.invoke(invocation, &base)
            }
            ExprKind::Indexer(left, index) => {
                let base = self.eval(left, input)?;
                let this = self.this_collection();
                let index = self.eval(index, &this)?;
                index_collection(&base, &index)
            }
            ExprKind::Polarity(operator, operand) => {
                let value = self.eval(operand, input)?;
                operators::polarity(*operator, &value)
            }
            ExprKind::Multiplicative(left, operator, right) => {
                let (a, b) = self.eval_pair(left, right, input)?;
                operators::multiplicative(operator, &a, &b)
            }
            ExprKind::Additive(left, operator, right) => {
                let (a, b) = self.eval_pair(left, right, input)?;
                operators::additive(operator, &a, &b)
            }
            ExprKind::Type(left, operator, specifier) => {
                let base = self.eval(left, input)?;
                let target = resolve_type(&specifier.qualified_name())?;
                type_operation(operator, &base, &target)
            }
            ExprKind::Union(left, right) => {
                let (a, b) = self.eval_pair(left, right, input)?;
                Ok(operators::union(&a, &b))
            }
            ExprKind::Inequality(left, operator, right) => {
                let (a, b) = self.eval_pair(left, right, input)?;
                operators::comparison(operator, &a, &b)
            }
            ExprKind::Equality(left, operator, right) => {
                let (a, b) = self.eval_pair(left, right, input)?;
                operators::equality(operator, &a, &b)
            }
            ExprKind::Membership(left, operator, right) => {
                let (a, b) = self.eval_pair(left, right, input)?;
                operators::membership(operator, &a, &b)
            }
            ExprKind::And(left, right) => {
                let a = singleton_boolean(&self.eval(left, input)?)?;
                if a == Some(false) {
                    return Ok(Collection::boolean(false));
                }
                let b = singleton_boolean(&self.eval(right, input)?)?;
                Ok(operators::boolean_result(operators::and(a, b)))
            }
            ExprKind::Or(left, operator, right) => {
                let a = singleton_boolean(&self.eval(left, input)?)?;
                if operator == "or" && a == Some(true) {
                    return Ok(Collection::boolean(true));
                }
                let b = singleton_boolean(&self.eval(right, input)?)?;
                let result = if operator == "xor" {
                    operators::xor(a, b)
                } else {
                    operators::or(a, b)
                };
                Ok(operators::boolean_result(result))
            }
            ExprKind::Implies(left, right) => {
                let a = singleton_boolean(&self.eval(left, input)?)?;
                if a == Some(false) {
                    return Ok(Collection::boolean(true));
                }
                let b = singleton_boolean(&self.eval(right, input)?)?;
                Ok(operators::boolean_result(operators::implies(a, b)))
            }
        }
    }

    fn eval_pair(
        &mut self,
        left: &Expression,
        right: &Expression,
        input: &Collection,
    ) -> Result<(Collection, Collection), EvaluationError> {
        let a = self.eval(left, input)?;
        let b = self.eval(right, input)?;
        Ok((a, b))
    }

    fn eval_term(&mut self, term: &Term, input: &Collection) -> Result<Collection, EvaluationError> {
        match term {
            Term::Invocation(invocation) => self.invoke(invocation, input),
            Term::Literal(literal) => Ok(literal_collection(literal)),
            Term::ExternalConstant(name) => self.context.resolve_constant(name),
            Term::Parenthesized(inner) => self.eval(inner, input),
        }
    }

    fn this_collection(&self) -> Collection {
        match self.frames.last() {
            Some(frame) => Collection::singleton(frame.this.clone()),
            None => self.root_input.clone(),
        }
    }

    fn invoke(&mut self, invocation: &Invocation, base: &Collection) -> Result<Collection, EvaluationError> {
        match invocation {
            Invocation::Member(name) => Ok(navigate(base, name)),
            Invocation::Function(name, arguments) => self.call_function(name, arguments, base),
            Invocation::This => Ok(self.this_collection()),
            Invocation::Index => Ok(self
                .frames
                .last()
                .map(|f| Collection::singleton(Node::integer(f.index as i64)))
                .unwrap_or_default()),
            // Only meaningful inside aggregate(), which is not provided.
            Invocation::Total => Ok(Collection::empty()),
        }
    }

    /// Evaluates `expression` with `node` as `$this` and `index` as `$index`.
    fn eval_for_item(&mut self, expression: &Expression, node: &Node, index: usize) -> Result<Collection, EvaluationError> {
        self.frames.push(Frame {
            this: node.clone(),
            index,
        });
        let result = self.eval(expression, &Collection::singleton(node.clone()));
        self.frames.pop();
        result
    }

    /// Evaluates against the single input item when there is one, otherwise
    /// against the current focus.
    fn eval_in_focus(&mut self, expression: &Expression, base: &Collection) -> Result<Collection, EvaluationError> {
        match base.optional_single()? {
            Some(node) => {
                let node = node.clone();
                self.eval_for_item(expression, &node, 0)
            }
            None => {
                let this = self.this_collection();
                self.eval(expression, &this)
            }
        }
    }

    fn call_function(
        &mut self,
        name: &str,
        arguments: &[Expression],
        base: &Collection,
    ) -> Result<Collection, EvaluationError> {
        if let Some((min, max)) = visitor_arity(name) {
            if arguments.len() < min || arguments.len() > max {
                return Err(EvaluationError::arity(name, arguments.len()));
            }
            return self.call_visitor(name, arguments, base);
        }

        let registry = self.context.registry().clone();
        let function = registry.lookup(name)?;
        if !function.descriptor().accepts(arguments.len()) {
            return Err(EvaluationError::arity(name, arguments.len()));
        }
        let this = self.this_collection();
        let mut values = Vec::with_capacity(arguments.len());
        for argument in arguments {
            values.push(self.eval(argument, &this)?);
        }

        let cacheable = matches!(name, "resolve" | "memberOf");
        if cacheable {
            if let Some(hit) = self.context.cached_result(name, base, &values) {
                return Ok(hit);
            }
        }
        let result = function.apply(self.context, base, &values)?;
        if cacheable {
            self.context.cache_result(name, base, &values, &result);
        }
        Ok(result)
    }

    fn call_visitor(
        &mut self,
        name: &str,
        arguments: &[Expression],
        base: &Collection,
    ) -> Result<Collection, EvaluationError> {
        match name {
            "where" => {
                let mut kept = Vec::new();
                for (index, node) in base.iter().enumerate() {
                    if evaluates_to_true(&self.eval_for_item(&arguments[0], node, index)?) {
                        kept.push(node.clone());
                    }
                }
                Ok(preserve_order(base, kept))
            }
            "select" => {
                let mut projected = Collection::empty();
                for (index, node) in base.iter().enumerate() {
                    projected.extend(self.eval_for_item(&arguments[0], node, index)?);
                }
                Ok(if base.is_ordered() { projected } else { projected.into_unordered() })
            }
            "all" => {
                for (index, node) in base.iter().enumerate() {
                    if !evaluates_to_true(&self.eval_for_item(&arguments[0], node, index)?) {
                        return Ok(Collection::boolean(false));
                    }
                }
                Ok(Collection::boolean(true))
            }
            "exists" => {
                let Some(criteria) = arguments.first() else {
                    return Ok(Collection::boolean(!base.is_empty()));
                };
                for (index, node) in base.iter().enumerate() {
                    if evaluates_to_true(&self.eval_for_item(criteria, node, index)?) {
                        return Ok(Collection::boolean(true));
                    }
                }
                Ok(Collection::boolean(false))
            }
            "repeat" => self.repeat(&arguments[0], base),
            "iif" => {
                let criterion = self.eval_in_focus(&arguments[0], base)?;
                if evaluates_to_true(&criterion) {
                    self.eval_in_focus(&arguments[1], base)
                } else if let Some(otherwise) = arguments.get(2) {
                    self.eval_in_focus(otherwise, base)
                } else {
                    Ok(Collection::empty())
                }
            }
            "is" | "as" | "ofType" => {
                let type_name = arguments[0].as_type_name().ok_or_else(|| {
                    EvaluationError::InvalidTypeSpecifier(format!(
                        "The argument of '{}' must be a type name",
                        name
                    ))
                })?;
                let target = resolve_type(&type_name)?;
                if name == "ofType" {
                    let kept = base.iter().filter(|n| is_type(n, &target)).cloned().collect();
                    return Ok(preserve_order(base, kept));
                }
                type_operation(name, base, &target)
            }
            "trace" => {
                let this = self.this_collection();
                let label = self.eval(&arguments[0], &this)?;
                let label = match label.optional_single()?.and_then(Node::system_value) {
                    Some(SystemValue::String(s)) => s,
                    _ => {
                        return Err(EvaluationError::InvalidArgument(
                            "The name passed to 'trace' must be a string".to_string(),
                        ));
                    }
                };
                let logged = match arguments.get(1) {
                    Some(projection) => {
                        let mut projected = Collection::empty();
                        for (index, node) in base.iter().enumerate() {
                            projected.extend(self.eval_for_item(projection, node, index)?);
                        }
                        projected
                    }
                    None => base.clone(),
                };
                debug!(target: "fhirpath::trace", name = %label, items = logged.len(), "{:?}", logged.nodes());
                self.context.record_trace(&label, &logged);
                Ok(base.clone())
            }
            _ => Err(EvaluationError::unknown_function(name)),
        }
    }

    fn repeat(&mut self, projection: &Expression, base: &Collection) -> Result<Collection, EvaluationError> {
        let mut result: Vec<Node> = Vec::new();
        let mut queue: VecDeque<Node> = base.iter().cloned().collect();
        let mut index = 0;
        let mut ordered = base.is_ordered();
        while let Some(node) = queue.pop_front() {
            let step = self.eval_for_item(projection, &node, index)?;
            ordered &= step.is_ordered();
            for item in step {
                if !result.iter().any(|seen| same_node(seen, &item)) {
                    result.push(item.clone());
                    queue.push_back(item);
                }
            }
            index += 1;
        }
        Ok(if ordered { Collection::from_nodes(result) } else { Collection::unordered(result) })
    }
}

fn preserve_order(base: &Collection, nodes: Vec<Node>) -> Collection {
    if base.is_ordered() {
        Collection::from_nodes(nodes)
    } else {
        Collection::unordered(nodes)
    }
}

/// Member access. A name matching the focus node's type (or a base type)
/// yields the node itself, so `Patient.name` works on a Patient root. A
/// choice element may be addressed with its typed name, e.g. `valueQuantity`.
fn navigate(base: &Collection, name: &str) -> Collection {
    let mut out = Collection::empty();
    for node in base {
        let members = node.members(name);
        if !members.is_empty() {
            out.extend(Collection::from_nodes(members));
            continue;
        }
        let typed = typed_choice_members(node, name);
        if !typed.is_empty() {
            out.extend(Collection::from_nodes(typed));
            continue;
        }
        if node.fhirpath_type().closure().contains(&name) {
            out.push(node.clone());
        }
    }
    if base.is_ordered() { out } else { out.into_unordered() }
}

fn typed_choice_members(node: &Node, name: &str) -> Vec<Node> {
    let Some(descriptor) = node.element().and_then(|e| e.descriptor()) else {
        return Vec::new();
    };
    for element in descriptor.all_elements() {
        if !element.is_choice() {
            continue;
        }
        if let Some(type_name) = element.type_for_key(name) {
            return node
                .members(element.name)
                .into_iter()
                .filter(|m| m.element_type() == Some(type_name))
                .collect();
        }
    }
    Vec::new()
}

fn index_collection(base: &Collection, index: &Collection) -> Result<Collection, EvaluationError> {
    let position = match index.optional_single()?.and_then(Node::system_value) {
        Some(SystemValue::Integer(i)) => i,
        _ => {
            return Err(EvaluationError::InvalidIndex(
                "Index must be an integer".to_string(),
            ));
        }
    };
    base.require_ordered("[]")?;
    let node = usize::try_from(position).ok().and_then(|i| base.nodes().get(i));
    Ok(node.cloned().into_iter().collect())
}

/// `is` and `as`, as operators or functions.
fn type_operation(
    operator: &str,
    base: &Collection,
    target: &atrius_fhirpath_support::FhirPathType,
) -> Result<Collection, EvaluationError> {
    let Some(node) = base.optional_single()? else {
        return Ok(Collection::empty());
    };
    let matches = is_type(node, target);
    Ok(match operator {
        "is" => Collection::boolean(matches),
        _ if matches => Collection::singleton(node.clone()),
        _ => Collection::empty(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use atrius_fhir_model::Element;
    use std::sync::Arc;

    fn patient() -> Arc<Element> {
        Arc::new(
            Element::new("Patient")
                .with("active", Element::boolean(true))
                .with(
                    "name",
                    Element::new("HumanName")
                        .with("use", Element::code("official"))
                        .with("family", Element::string("Chalmers"))
                        .with("given", Element::string("Peter"))
                        .with("given", Element::string("James")),
                )
                .with(
                    "name",
                    Element::new("HumanName")
                        .with("use", Element::code("usual"))
                        .with("given", Element::string("Jim")),
                ),
        )
    }

    fn eval(expression: &str) -> Result<Collection, EvaluationError> {
        let parsed = parse(expression).unwrap();
        let mut context = EvaluationContext::from_resource(patient());
        evaluate(&parsed, &mut context)
    }

    fn strings(collection: &Collection) -> Vec<String> {
        collection
            .iter()
            .filter_map(|n| n.system_value())
            .map(|v| v.to_display_string())
            .collect()
    }

    #[test]
    fn navigation_and_filters() {
        assert_eq!(strings(&eval("Patient.name.given").unwrap()), ["Peter", "James", "Jim"]);
        assert_eq!(
            strings(&eval("name.where(use = 'usual').given").unwrap()),
            ["Jim"]
        );
        assert_eq!(strings(&eval("name.select(given.first())").unwrap()), ["Peter", "Jim"]);
        assert_eq!(eval("name.given[1]").unwrap().len(), 1);
        assert_eq!(eval("name.given[7]").unwrap(), Collection::empty());
        assert_eq!(eval("name.all(given.exists())").unwrap(), Collection::boolean(true));
        assert_eq!(eval("name.exists(family = 'Chalmers')").unwrap(), Collection::boolean(true));
    }

    #[test]
    fn index_and_this() {
        assert_eq!(
            strings(&eval("name.given.where($index = 1)").unwrap()),
            ["James"]
        );
        assert_eq!(
            strings(&eval("name.given.select($this & '!')").unwrap()),
            ["Peter!", "James!", "Jim!"]
        );
    }

    #[test]
    fn boolean_logic_short_circuits() {
        assert_eq!(eval("active or name.single()").unwrap(), Collection::boolean(true));
        assert_eq!(eval("{} and false").unwrap(), Collection::boolean(false));
        assert_eq!(eval("{} and true").unwrap(), Collection::empty());
        assert!(matches!(
            eval("name and true"),
            Err(EvaluationError::SingletonEvaluationError(_))
        ));
    }

    #[test]
    fn visitor_arity_checked_first() {
        assert!(matches!(
            eval("name.where()"),
            Err(EvaluationError::InvalidArity(_))
        ));
        assert!(matches!(
            eval("name.iif(true)"),
            Err(EvaluationError::InvalidArity(_))
        ));
    }

    #[test]
    fn type_operators() {
        assert_eq!(eval("Patient is DomainResource").unwrap(), Collection::boolean(true));
        assert_eq!(eval("active is boolean").unwrap(), Collection::boolean(true));
        assert_eq!(eval("active.as(string)").unwrap(), Collection::empty());
        assert_eq!(eval("name.given.ofType(string)").unwrap().len(), 3);
        assert!(matches!(
            eval("active is Foo"),
            Err(EvaluationError::InvalidTypeSpecifier(_))
        ));
    }

    #[test]
    fn repeat_and_iif() {
        let descendants = eval("repeat(children())").unwrap();
        assert!(descendants.len() > 5);
        assert_eq!(strings(&eval("iif(active, 'yes', 'no')").unwrap()), ["yes"]);
        assert_eq!(eval("iif(false, 'yes')").unwrap(), Collection::empty());
    }

    #[test]
    fn trace_records_output() {
        let parsed = parse("name.trace('names').given.count()").unwrap();
        let mut context = EvaluationContext::from_resource(patient());
        let result = evaluate(&parsed, &mut context).unwrap();
        assert_eq!(result, Collection::singleton(Node::integer(3)));
        let traces = context.trace_outputs();
        assert_eq!(traces[0].0, "names");
        assert_eq!(traces[0].1.len(), 2);
    }

    #[test]
    fn unknown_function() {
        assert!(matches!(
            eval("name.frobnicate()"),
            Err(EvaluationError::UndefinedFunction(_))
        ));
        assert!(matches!(eval("%nope"), Err(EvaluationError::UndefinedVariable(_))));
    }
}
