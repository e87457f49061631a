//! Tree-walking evaluation.
//!
//! The interpreter descends the node structure directly, replaying the
//! decisions the builder recorded. All semantics shared with the compiling
//! executor live in [`runtime`]; anything added here must stay observably
//! identical to the compiled form.

use std::cell::RefCell;
use std::rc::Rc;

use exprtree_core::{Catalog, DelegateValue, EvalError, ObjectData, Value};

use crate::node::{BinaryOp, LambdaNode, MemberBinding, NodeKind, NodeRef};
use crate::runtime::{self, convert::apply_conversion, expect_bool, ops};
use crate::runtime::scope::{Scope, Sink};

pub use crate::runtime::DEFAULT_MAX_DEPTH;

fn unbound(name: &str) -> EvalError {
    EvalError::TypeMismatch { expected: "bound variable".into(), actual: name.to_string() }
}

/// Recursive tree evaluator.
#[derive(Clone)]
pub struct Interpreter {
    catalog: Rc<Catalog>,
    max_depth: usize,
}

impl Interpreter {
    pub fn new(catalog: Rc<Catalog>) -> Interpreter {
        Interpreter::with_max_depth(catalog, DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(catalog: Rc<Catalog>, max_depth: usize) -> Interpreter {
        Interpreter { catalog, max_depth }
    }

    pub fn catalog(&self) -> &Rc<Catalog> {
        &self.catalog
    }

    pub fn eval(&self, node: &NodeRef, scope: &Rc<Scope>) -> Result<Value, EvalError> {
        self.eval_at(node, scope, 0)
    }

    fn eval_at(&self, node: &NodeRef, scope: &Rc<Scope>, depth: usize) -> Result<Value, EvalError> {
        if depth >= self.max_depth {
            return Err(EvalError::StackOverflow { max_depth: self.max_depth });
        }
        let d = depth + 1;

        match &node.kind {
            NodeKind::Constant(value) => Ok(value.clone()),
            NodeKind::Parameter { id, name } => {
                scope.get(*id).ok_or_else(|| unbound(name))
            }
            NodeKind::Unary { op, operand, method, lifted } => {
                let value = self.eval_at(operand, scope, d)?;
                match method {
                    Some(method) => ops::apply_user_unary(*lifted, method, value),
                    None => ops::apply_unary(*op, *lifted, &value),
                }
            }
            NodeKind::Binary { op, left, right, method, lifted, conversion } => match op {
                BinaryOp::AndAlso => {
                    if !expect_bool(&self.eval_at(left, scope, d)?)? {
                        return Ok(Value::Bool(false));
                    }
                    self.eval_at(right, scope, d)
                }
                BinaryOp::OrElse => {
                    if expect_bool(&self.eval_at(left, scope, d)?)? {
                        return Ok(Value::Bool(true));
                    }
                    self.eval_at(right, scope, d)
                }
                BinaryOp::Coalesce => {
                    let value = self.eval_at(left, scope, d)?;
                    if value.is_null() {
                        return self.eval_at(right, scope, d);
                    }
                    match conversion {
                        Some(lambda) => self.apply_inline_lambda(lambda, value, scope, d),
                        None => Ok(value),
                    }
                }
                _ => {
                    let lv = self.eval_at(left, scope, d)?;
                    let rv = self.eval_at(right, scope, d)?;
                    match method {
                        Some(method) => ops::apply_user_binary(*op, *lifted, method, lv, rv),
                        None => ops::apply_binary(*op, *lifted, &lv, &rv),
                    }
                }
            },
            NodeKind::Convert { operand, kind, checked } => {
                let value = self.eval_at(operand, scope, d)?;
                apply_conversion(&self.catalog, kind, *checked, value)
            }
            NodeKind::TypeIs { operand, target } => {
                let value = self.eval_at(operand, scope, d)?;
                Ok(Value::Bool(runtime::runtime_matches(&self.catalog, &value, target)))
            }
            NodeKind::TypeAs { operand, target } => {
                let value = self.eval_at(operand, scope, d)?;
                if !value.is_null() && runtime::runtime_matches(&self.catalog, &value, target) {
                    Ok(value)
                } else {
                    Ok(Value::Null)
                }
            }
            NodeKind::Member { instance, field, .. } => {
                let obj = self.eval_obj(instance, scope, d, &field.name)?;
                let data = obj.borrow();
                Ok(data
                    .fields
                    .get(&field.name)
                    .cloned()
                    .unwrap_or_else(|| Value::default_for(&field.ty)))
            }
            NodeKind::Call { instance, method, args } => {
                let receiver = match instance {
                    Some(node) => {
                        let value = self.eval_at(node, scope, d)?;
                        if value.is_null() {
                            return Err(EvalError::NullReference {
                                member: method.name.clone(),
                            });
                        }
                        Some(value)
                    }
                    None => None,
                };
                let mut argvals = Vec::with_capacity(args.len());
                let mut sinks: Vec<Option<Sink>> = Vec::with_capacity(args.len());
                for (param, arg) in method.params.iter().zip(args) {
                    if param.by_ref {
                        let (value, sink) = self.eval_with_sink(arg, scope, d)?;
                        argvals.push(value);
                        sinks.push(sink);
                    } else {
                        argvals.push(self.eval_at(arg, scope, d)?);
                        sinks.push(None);
                    }
                }
                let result = (method.native)(receiver.as_ref(), &mut argvals)?;
                for (i, sink) in sinks.iter().enumerate() {
                    if let Some(sink) = sink {
                        sink.store(argvals[i].clone());
                    }
                }
                Ok(result)
            }
            NodeKind::New { ty, ctor, args } => match ctor {
                None => runtime::new_default_instance(&self.catalog, *ty),
                Some(ctor) => {
                    let mut argvals = Vec::with_capacity(args.len());
                    for arg in args {
                        argvals.push(self.eval_at(arg, scope, d)?);
                    }
                    (ctor.native)(None, &mut argvals)
                }
            },
            NodeKind::NewArray { items, .. } => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_at(item, scope, d)?);
                }
                Ok(Value::array(values))
            }
            NodeKind::ListInit { new_node, items } => {
                let value = self.eval_at(new_node, scope, d)?;
                for item in items {
                    let mut argvals = Vec::with_capacity(item.args.len());
                    for arg in &item.args {
                        argvals.push(self.eval_at(arg, scope, d)?);
                    }
                    (item.method.native)(Some(&value), &mut argvals)?;
                }
                Ok(value)
            }
            NodeKind::MemberInit { new_node, bindings } => {
                let value = self.eval_at(new_node, scope, d)?;
                let Some(obj) = value.as_obj().cloned() else {
                    return Err(EvalError::TypeMismatch {
                        expected: "object".into(),
                        actual: value.shape_name().to_string(),
                    });
                };
                self.apply_bindings(&obj, bindings, scope, d)?;
                Ok(value)
            }
            NodeKind::Conditional { test, if_true, if_false } => {
                if expect_bool(&self.eval_at(test, scope, d)?)? {
                    self.eval_at(if_true, scope, d)
                } else {
                    self.eval_at(if_false, scope, d)
                }
            }
            NodeKind::Switch { value, cases, default, comparison } => {
                let subject = self.eval_at(value, scope, d)?;
                for case in cases {
                    for test in &case.tests {
                        let candidate = self.eval_at(test, scope, d)?;
                        if runtime::switch_matches(comparison.as_ref(), &subject, &candidate)? {
                            return self.eval_at(&case.body, scope, d);
                        }
                    }
                }
                match default {
                    Some(default) => self.eval_at(default, scope, d),
                    None => Ok(Value::Null),
                }
            }
            NodeKind::Lambda(lambda) => Ok(self.make_delegate(lambda, scope)),
            NodeKind::Invoke { target, args } => {
                let target = self.eval_at(target, scope, d)?;
                if target.is_null() {
                    return Err(EvalError::NullReference { member: "invoke".into() });
                }
                let Some(delegate) = target.as_delegate().cloned() else {
                    return Err(EvalError::TypeMismatch {
                        expected: "delegate".into(),
                        actual: target.shape_name().to_string(),
                    });
                };
                let mut argvals = Vec::with_capacity(args.len());
                for arg in args {
                    argvals.push(self.eval_at(arg, scope, d)?);
                }
                (delegate.f)(&argvals)
            }
            NodeKind::Block { variables, exprs } => {
                let frame = scope.child();
                for variable in variables {
                    if let NodeKind::Parameter { id, .. } = &variable.kind {
                        frame.declare(*id, Value::default_for(&variable.ty));
                    }
                }
                let mut last = Value::Null;
                for expr in exprs {
                    last = self.eval_at(expr, &frame, d)?;
                }
                Ok(last)
            }
            NodeKind::Assign { target, value } => {
                let value = self.eval_at(value, scope, d)?;
                match &target.kind {
                    NodeKind::Parameter { id, name } => {
                        let cell = scope.cell(*id).ok_or_else(|| unbound(name))?;
                        *cell.borrow_mut() = value.clone();
                    }
                    NodeKind::Member { instance, field, .. } => {
                        let obj = self.eval_obj(instance, scope, d, &field.name)?;
                        obj.borrow_mut().fields.insert(field.name.clone(), value.clone());
                    }
                    _ => {
                        return Err(EvalError::TypeMismatch {
                            expected: "assignable target".into(),
                            actual: "expression".into(),
                        });
                    }
                }
                Ok(value)
            }
        }
    }

    fn eval_obj(
        &self,
        node: &NodeRef,
        scope: &Rc<Scope>,
        depth: usize,
        member: &str,
    ) -> Result<Rc<RefCell<ObjectData>>, EvalError> {
        let value = self.eval_at(node, scope, depth)?;
        if value.is_null() {
            return Err(EvalError::NullReference { member: member.to_string() });
        }
        value.as_obj().cloned().ok_or_else(|| EvalError::TypeMismatch {
            expected: "object".into(),
            actual: value.shape_name().to_string(),
        })
    }

    /// Evaluate a by-ref argument together with its write-back location.
    fn eval_with_sink(
        &self,
        node: &NodeRef,
        scope: &Rc<Scope>,
        depth: usize,
    ) -> Result<(Value, Option<Sink>), EvalError> {
        match &node.kind {
            NodeKind::Parameter { id, name } => {
                let cell = scope.cell(*id).ok_or_else(|| unbound(name))?;
                let value = cell.borrow().clone();
                Ok((value, Some(Sink::Cell(cell))))
            }
            NodeKind::Member { instance, field, .. } => {
                let obj = self.eval_obj(instance, scope, depth, &field.name)?;
                let value = obj
                    .borrow()
                    .fields
                    .get(&field.name)
                    .cloned()
                    .unwrap_or_else(|| Value::default_for(&field.ty));
                Ok((value, Some(Sink::Field { obj, name: field.name.clone() })))
            }
            _ => Ok((self.eval_at(node, scope, depth)?, None)),
        }
    }

    /// Run a single-parameter lambda against one value in the current scope.
    fn apply_inline_lambda(
        &self,
        lambda: &Rc<LambdaNode>,
        value: Value,
        scope: &Rc<Scope>,
        depth: usize,
    ) -> Result<Value, EvalError> {
        let frame = scope.child();
        if let Some(NodeKind::Parameter { id, .. }) = lambda.params.first().map(|p| &p.kind) {
            frame.declare(*id, value);
        }
        self.eval_at(&lambda.body, &frame, depth)
    }

    /// Close a lambda over the current scope, producing an invokable
    /// delegate value. Captures are by reference: the delegate shares cells
    /// with the scope it was evaluated in.
    fn make_delegate(&self, lambda: &Rc<LambdaNode>, scope: &Rc<Scope>) -> Value {
        let interp = self.clone();
        let lambda = lambda.clone();
        let captured = scope.clone();
        let ty = lambda.ty.clone();
        Value::Delegate(Rc::new(DelegateValue {
            ty,
            f: Box::new(move |args| {
                if args.len() != lambda.params.len() {
                    return Err(EvalError::ArityMismatch {
                        expected: lambda.params.len(),
                        actual: args.len(),
                    });
                }
                let frame = captured.child();
                for (param, arg) in lambda.params.iter().zip(args) {
                    if let NodeKind::Parameter { id, .. } = &param.kind {
                        frame.declare(*id, arg.clone());
                    }
                }
                interp.eval(&lambda.body, &frame)
            }),
        }))
    }

    fn apply_bindings(
        &self,
        obj: &Rc<RefCell<ObjectData>>,
        bindings: &[MemberBinding],
        scope: &Rc<Scope>,
        depth: usize,
    ) -> Result<(), EvalError> {
        for binding in bindings {
            match binding {
                MemberBinding::Assignment { field, value } => {
                    let value = self.eval_at(value, scope, depth)?;
                    obj.borrow_mut().fields.insert(field.name.clone(), value);
                }
                MemberBinding::Nested { field, bindings } => {
                    let inner = runtime::field_object(&self.catalog, obj, field)?;
                    self.apply_bindings(&inner, bindings, scope, depth)?;
                }
                MemberBinding::List { field, items } => {
                    let inner = runtime::field_object(&self.catalog, obj, field)?;
                    let receiver = Value::Obj(inner);
                    for item in items {
                        let mut argvals = Vec::with_capacity(item.args.len());
                        for arg in &item.args {
                            argvals.push(self.eval_at(arg, scope, depth)?);
                        }
                        (item.method.native)(Some(&receiver), &mut argvals)?;
                    }
                }
            }
        }
        Ok(())
    }
}
