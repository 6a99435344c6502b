//! Velocity template evaluation

use std::collections::HashMap;
use std::fmt::Write;
use std::rc::Rc;

use serde_json::{json, Value};

use super::parser::{self, BinaryOp, Expr, MacroDef, Node, Position, Reference, Segment};
use super::value::{self, PathKey};
use super::{ErrorKind, VelocityError, MAX_DEPTH};
use crate::engine::{Context, EngineOptions};

/// Largest list a range literal may produce
const MAX_RANGE: u64 = 1_000_000;

/// What rendering a node list asks its caller to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Break,
    Stop,
}

pub(crate) struct Evaluator<'o> {
    options: &'o EngineOptions,
    macros: HashMap<String, Rc<MacroDef>>,
    defines: HashMap<String, Rc<Vec<Node>>>,
    /// Innermost scope last; index 0 is the global context
    scopes: Vec<Context>,
    depth: usize,
}

fn render_error(at: Position, message: impl Into<String>) -> VelocityError {
    VelocityError::new(ErrorKind::Render, message, Some(at))
}

impl<'o> Evaluator<'o> {
    pub(crate) fn new(
        options: &'o EngineOptions,
        macros: HashMap<String, Rc<MacroDef>>,
        context: &Context,
    ) -> Self {
        Self {
            options,
            macros,
            defines: HashMap::new(),
            scopes: vec![context.clone()],
            depth: 0,
        }
    }

    pub(crate) fn render(&mut self, nodes: &[Node], out: &mut String) -> Result<Flow, VelocityError> {
        for node in nodes {
            let flow = match node {
                Node::Text(text) => {
                    out.push_str(text);
                    Flow::Continue
                }
                Node::Reference(reference) => {
                    self.render_reference(reference, out)?;
                    Flow::Continue
                }
                Node::Set { target, value, at } => {
                    self.assign(target, value, *at)?;
                    Flow::Continue
                }
                Node::If {
                    branches,
                    otherwise,
                } => {
                    let mut chosen = otherwise.as_deref();
                    for (condition, body) in branches {
                        if self.condition(condition)? {
                            chosen = Some(body.as_slice());
                            break;
                        }
                    }
                    match chosen {
                        Some(body) => self.render(body, out)?,
                        None => Flow::Continue,
                    }
                }
                Node::Foreach {
                    var,
                    iterable,
                    body,
                } => self.foreach(var, iterable, body, out)?,
                Node::Define { name, body } => {
                    self.defines.insert(name.clone(), Rc::clone(body));
                    Flow::Continue
                }
                Node::MacroCall {
                    name,
                    args,
                    source,
                    at,
                } => self.call_macro(name, args, source, *at, out)?,
                Node::Evaluate { expr, at } => self.evaluate(expr, *at, out)?,
                Node::Include { directive, at } => {
                    return Err(render_error(
                        *at,
                        format!("#{} is not supported: no resource loader is configured", directive),
                    ))
                }
                Node::Break => Flow::Break,
                Node::Stop => Flow::Stop,
            };
            if flow != Flow::Continue {
                return Ok(flow);
            }
        }
        Ok(Flow::Continue)
    }

    fn render_reference(&mut self, reference: &Reference, out: &mut String) -> Result<(), VelocityError> {
        match self.resolve(reference)? {
            Some(value) => out.push_str(&value::to_text(&value)),
            None if reference.quiet => {}
            None if self.options.strict_references => return Err(undefined(reference)),
            None => out.push_str(&reference.literal),
        }
        Ok(())
    }

    /// Resolve a reference chain. `None` when any step is undefined or null.
    fn resolve(&mut self, reference: &Reference) -> Result<Option<Value>, VelocityError> {
        let mut current = match &reference.call {
            Some(args) => self.call_helper(&reference.root, args)?,
            None => self.lookup(&reference.root, reference.at)?,
        };

        for segment in &reference.segments {
            let Some(base) = current.take().filter(|v| !v.is_null()) else {
                return Ok(None);
            };
            current = match segment {
                Segment::Property(name) => value::property(&base, name),
                Segment::Method(name, args) => {
                    let mut values = Vec::with_capacity(args.len());
                    for arg in args {
                        values.push(self.eval(arg)?.unwrap_or(Value::Null));
                    }
                    value::call_method(&base, name, &values)
                        .map_err(|message| render_error(reference.at, message))?
                }
                Segment::Index(expr) => {
                    let index = self.eval(expr)?;
                    value::index(&base, index.as_ref())
                }
            };
        }
        Ok(current.filter(|v| !v.is_null()))
    }

    fn lookup(&mut self, name: &str, at: Position) -> Result<Option<Value>, VelocityError> {
        if let Some(value) = self.scopes.iter().rev().find_map(|scope| scope.get(name)) {
            return Ok(Some(value.clone()));
        }
        let Some(body) = self.defines.get(name).cloned() else {
            return Ok(None);
        };
        if self.depth >= MAX_DEPTH {
            return Err(render_error(at, format!("#define ${} refers to itself too deeply", name)));
        }
        let mut rendered = String::new();
        self.depth += 1;
        let flow = self.render(&body, &mut rendered);
        self.depth -= 1;
        flow?;
        Ok(Some(Value::String(rendered)))
    }

    fn call_helper(&mut self, name: &str, args: &[Expr]) -> Result<Option<Value>, VelocityError> {
        if !self.options.helpers || name != "format_date" {
            return Ok(None);
        }
        let format = match args.first() {
            Some(arg) => self.eval(arg)?.map(|v| value::to_text(&v)).unwrap_or_default(),
            None => String::new(),
        };
        Ok(Some(Value::String(format_date(&format))))
    }

    fn assign(&mut self, target: &Reference, expr: &Expr, at: Position) -> Result<(), VelocityError> {
        let new = self.eval(expr)?;

        if target.segments.is_empty() {
            self.defines.remove(&target.root);
            let idx = self
                .scopes
                .iter()
                .rposition(|scope| scope.contains_key(&target.root))
                .unwrap_or(0);
            let scope = &mut self.scopes[idx];
            match new {
                Some(value) => {
                    scope.insert(target.root.clone(), value);
                }
                None => {
                    scope.remove(&target.root);
                }
            }
            return Ok(());
        }

        let mut keys = Vec::with_capacity(target.segments.len());
        for segment in &target.segments {
            keys.push(match segment {
                Segment::Property(name) => PathKey::Field(name.clone()),
                Segment::Index(expr) => PathKey::Item(self.eval(expr)?.unwrap_or(Value::Null)),
                Segment::Method(..) => {
                    return Err(render_error(at, "Cannot assign to a method call"))
                }
            });
        }

        let strict = self.options.strict_references;
        let Some(mut slot) = self
            .scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(&target.root))
        else {
            return if strict {
                Err(undefined(target))
            } else {
                tracing::debug!("Ignoring #set on undefined {}", target.literal);
                Ok(())
            };
        };

        let (last, path) = keys.split_last().ok_or_else(|| render_error(at, "Empty assignment path"))?;
        for key in path {
            match value::child_mut(slot, key) {
                Some(child) => slot = child,
                None if strict => return Err(undefined(target)),
                None => return Ok(()),
            }
        }
        value::set_child(slot, last, new.unwrap_or(Value::Null))
            .map_err(|message| render_error(at, message))
    }

    /// Evaluate an `#if` / `#elseif` condition. A bare undefined reference is
    /// false even in strict mode.
    fn condition(&mut self, expr: &Expr) -> Result<bool, VelocityError> {
        let value = match expr {
            Expr::Reference(reference) => self.resolve(reference)?,
            other => self.eval(other)?,
        };
        Ok(value::truthy(value.as_ref()))
    }

    /// Evaluate an expression. `None` is an unresolved reference or null.
    fn eval(&mut self, expr: &Expr) -> Result<Option<Value>, VelocityError> {
        let value = match expr {
            Expr::Literal(value) => Some(value.clone()),
            Expr::Reference(reference) => {
                let resolved = self.resolve(reference)?;
                if resolved.is_none() && self.options.strict_references && !reference.quiet {
                    return Err(undefined(reference));
                }
                resolved
            }
            Expr::Interpolated(nodes) => {
                let mut text = String::new();
                self.render(nodes, &mut text)?;
                Some(Value::String(text))
            }
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?.unwrap_or(Value::Null));
                }
                Some(Value::Array(values))
            }
            Expr::Range(first, last, at) => {
                let first = self.range_bound(first, *at)?;
                let last = self.range_bound(last, *at)?;
                if first.abs_diff(last) >= MAX_RANGE {
                    return Err(render_error(*at, format!("Range [{}..{}] is too large", first, last)));
                }
                let values: Vec<Value> = if first <= last {
                    (first..=last).map(Value::from).collect()
                } else {
                    (last..=first).rev().map(Value::from).collect()
                };
                Some(Value::Array(values))
            }
            Expr::Map(entries) => {
                let mut map = Context::new();
                for (key, val) in entries {
                    let key = self.eval(key)?.map(|k| value::to_text(&k)).unwrap_or_default();
                    let val = self.eval(val)?.unwrap_or(Value::Null);
                    map.insert(key, val);
                }
                Some(Value::Object(map))
            }
            Expr::Not(inner) => {
                let inner = self.eval(inner)?;
                Some(Value::Bool(!value::truthy(inner.as_ref())))
            }
            Expr::Negate(inner, at) => match self.eval(inner)? {
                Some(v) => Some(value::negate(&v).map_err(|message| render_error(*at, message))?),
                None => None,
            },
            Expr::Binary(op, lhs, rhs, at) => self.binary(*op, lhs, rhs, *at)?,
        };
        Ok(value)
    }

    fn range_bound(&mut self, expr: &Expr, at: Position) -> Result<i64, VelocityError> {
        self.eval(expr)?
            .as_ref()
            .and_then(Value::as_i64)
            .ok_or_else(|| render_error(at, "Range bounds must be integers"))
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        at: Position,
    ) -> Result<Option<Value>, VelocityError> {
        match op {
            BinaryOp::Or => {
                if self.condition(lhs)? {
                    return Ok(Some(Value::Bool(true)));
                }
                return Ok(Some(Value::Bool(self.condition(rhs)?)));
            }
            BinaryOp::And => {
                if !self.condition(lhs)? {
                    return Ok(Some(Value::Bool(false)));
                }
                return Ok(Some(Value::Bool(self.condition(rhs)?)));
            }
            _ => {}
        }

        let left = self.eval(lhs)?.unwrap_or(Value::Null);
        let right = self.eval(rhs)?.unwrap_or(Value::Null);

        let result = match op {
            BinaryOp::Eq => Value::Bool(value::equals(&left, &right)),
            BinaryOp::Ne => Value::Bool(!value::equals(&left, &right)),
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
                if left.is_null() || right.is_null() {
                    return Ok(Some(Value::Bool(false)));
                }
                let Some(ordering) = value::compare(&left, &right) else {
                    return Err(render_error(
                        at,
                        format!(
                            "Cannot compare {} with {}",
                            value::type_name(&left),
                            value::type_name(&right)
                        ),
                    ));
                };
                Value::Bool(match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Gt => ordering.is_gt(),
                    BinaryOp::Le => ordering.is_le(),
                    _ => ordering.is_ge(),
                })
            }
            _ => {
                if left.is_null() || right.is_null() {
                    return Ok(None);
                }
                value::arithmetic(op, &left, &right).map_err(|message| render_error(at, message))?
            }
        };
        Ok(Some(result))
    }

    fn foreach(
        &mut self,
        var: &str,
        iterable: &Expr,
        body: &[Node],
        out: &mut String,
    ) -> Result<Flow, VelocityError> {
        let items: Vec<Value> = match self.eval(iterable)? {
            Some(Value::Array(items)) => items,
            Some(Value::Object(map)) => map.into_iter().map(|(_, v)| v).collect(),
            Some(other) => {
                tracing::debug!("#foreach over a {}, skipping", value::type_name(&other));
                return Ok(Flow::Continue);
            }
            None => return Ok(Flow::Continue),
        };

        let total = items.len();
        for (i, item) in items.into_iter().enumerate() {
            let mut scope = Context::new();
            scope.insert(var.to_string(), item);
            scope.insert(
                "foreach".to_string(),
                json!({
                    "count": i + 1,
                    "index": i,
                    "hasNext": i + 1 < total,
                    "first": i == 0,
                    "last": i + 1 == total,
                }),
            );
            scope.insert("velocityCount".to_string(), Value::from(i + 1));

            self.scopes.push(scope);
            let flow = self.render(body, out);
            self.scopes.pop();
            match flow? {
                Flow::Continue => {}
                Flow::Break => break,
                Flow::Stop => return Ok(Flow::Stop),
            }
        }
        Ok(Flow::Continue)
    }

    fn call_macro(
        &mut self,
        name: &str,
        args: &[Expr],
        source: &str,
        at: Position,
        out: &mut String,
    ) -> Result<Flow, VelocityError> {
        let Some(def) = self.macros.get(name).cloned() else {
            if self.options.strict_references {
                return Err(render_error(at, format!("Macro #{} is not defined", name)));
            }
            out.push_str(source);
            return Ok(Flow::Continue);
        };
        if args.len() > def.params.len() {
            return Err(render_error(
                at,
                format!(
                    "Macro #{} expects {} argument(s), got {}",
                    name,
                    def.params.len(),
                    args.len()
                ),
            ));
        }
        if self.depth >= MAX_DEPTH {
            return Err(render_error(at, "Maximum macro nesting depth exceeded"));
        }

        let mut scope = Context::new();
        for (param, arg) in def.params.iter().zip(args) {
            if let Some(value) = self.eval(arg)? {
                scope.insert(param.clone(), value);
            }
        }

        self.scopes.push(scope);
        self.depth += 1;
        let flow = self.render(&def.body, out);
        self.depth -= 1;
        self.scopes.pop();
        Ok(match flow? {
            Flow::Stop => Flow::Stop,
            _ => Flow::Continue,
        })
    }

    fn evaluate(&mut self, expr: &Expr, at: Position, out: &mut String) -> Result<Flow, VelocityError> {
        let Some(source) = self.eval(expr)?.map(|v| value::to_text(&v)) else {
            return Ok(Flow::Continue);
        };
        if self.depth >= MAX_DEPTH {
            return Err(render_error(at, "Maximum #evaluate nesting depth exceeded"));
        }

        let nested = |err: VelocityError| {
            VelocityError::new(err.kind, format!("In #evaluate: {}", err.message), Some(at))
        };
        let template = parser::parse(&source).map_err(nested)?;
        self.macros.extend(template.macros);

        self.depth += 1;
        let flow = self.render(&template.nodes, out);
        self.depth -= 1;
        flow.map_err(nested)
    }
}

fn undefined(reference: &Reference) -> VelocityError {
    render_error(
        reference.at,
        format!("Variable {} has not been set", reference.literal),
    )
}

/// Current local date in `format`. `DDMMYYYY` is shorthand for `%d%m%Y`,
/// which is also the fallback for an invalid format.
pub(crate) fn format_date(format: &str) -> String {
    let now = chrono::Local::now();
    let format = if format == "DDMMYYYY" { "%d%m%Y" } else { format };
    let mut out = String::new();
    if write!(out, "{}", now.format(format)).is_err() {
        out.clear();
        let _ = write!(out, "{}", now.format("%d%m%Y"));
    }
    out
}
