//! Closure compilation.
//!
//! The compiling executor walks the tree once, ahead of execution, and
//! produces a [`Thunk`] per node: a closure over the precompiled thunks of
//! its children. Execution then runs no node dispatch at all. Every semantic
//! decision flows through the same `runtime` machinery the interpreter uses,
//! which is what keeps the two modes observably identical. That includes the
//! recursion guard: nodes past [`DEFAULT_MAX_DEPTH`] compile to a thunk that
//! fails the same way the interpreter does when it reaches that depth.

use std::rc::Rc;

use exprtree_core::{Catalog, DelegateValue, EvalError, FieldEntry, MethodRef, Ty, Value};

use crate::node::{BinaryOp, LambdaNode, MemberBinding, NodeKind, NodeRef, ParamId};
use crate::runtime::{self, convert::apply_conversion, expect_bool, ops, DEFAULT_MAX_DEPTH};
use crate::runtime::scope::{Scope, Sink};

/// A compiled node: invoked against a scope, yields the node's value.
pub type Thunk = Rc<dyn Fn(&Rc<Scope>) -> Result<Value, EvalError>>;

type SinkThunk = Rc<dyn Fn(&Rc<Scope>) -> Result<(Value, Option<Sink>), EvalError>>;

struct CompiledInit {
    method: MethodRef,
    args: Vec<Thunk>,
}

enum CompiledBinding {
    Assignment { name: String, value: Thunk },
    Nested { field: Rc<FieldEntry>, bindings: Vec<CompiledBinding> },
    List { field: Rc<FieldEntry>, items: Vec<CompiledInit> },
}

/// One-pass tree-to-closure compiler.
pub struct Compiler {
    catalog: Rc<Catalog>,
    max_depth: usize,
}

impl Compiler {
    pub fn new(catalog: Rc<Catalog>) -> Compiler {
        Compiler::with_max_depth(catalog, DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(catalog: Rc<Catalog>, max_depth: usize) -> Compiler {
        Compiler { catalog, max_depth }
    }

    pub fn catalog(&self) -> &Rc<Catalog> {
        &self.catalog
    }

    pub fn compile(&self, node: &NodeRef) -> Thunk {
        self.compile_at(node, 0)
    }

    /// Compile one node at its nesting depth; children sit one level deeper,
    /// matching the depth the interpreter would count evaluating the same
    /// node. Compilation stops descending at the limit.
    fn compile_at(&self, node: &NodeRef, depth: usize) -> Thunk {
        if depth >= self.max_depth {
            let max_depth = self.max_depth;
            return Rc::new(move |_| Err(EvalError::StackOverflow { max_depth }));
        }
        let d = depth + 1;

        match &node.kind {
            NodeKind::Constant(value) => {
                let value = value.clone();
                Rc::new(move |_| Ok(value.clone()))
            }
            NodeKind::Parameter { id, name } => {
                let id = *id;
                let name: Rc<str> = name.clone();
                Rc::new(move |scope| {
                    scope.get(id).ok_or_else(|| EvalError::TypeMismatch {
                        expected: "bound variable".into(),
                        actual: name.to_string(),
                    })
                })
            }
            NodeKind::Unary { op, operand, method, lifted } => {
                let operand = self.compile_at(operand, d);
                let (op, lifted) = (*op, *lifted);
                match method {
                    Some(method) => {
                        let method = method.clone();
                        Rc::new(move |scope| {
                            ops::apply_user_unary(lifted, &method, operand(scope)?)
                        })
                    }
                    None => Rc::new(move |scope| ops::apply_unary(op, lifted, &operand(scope)?)),
                }
            }
            NodeKind::Binary { op, left, right, method, lifted, conversion } => {
                self.compile_binary(*op, left, right, method, *lifted, conversion, d)
            }
            NodeKind::Convert { operand, kind, checked } => {
                let operand = self.compile_at(operand, d);
                let catalog = self.catalog.clone();
                let kind = kind.clone();
                let checked = *checked;
                Rc::new(move |scope| {
                    apply_conversion(&catalog, &kind, checked, operand(scope)?)
                })
            }
            NodeKind::TypeIs { operand, target } => {
                let operand = self.compile_at(operand, d);
                let catalog = self.catalog.clone();
                let target = target.clone();
                Rc::new(move |scope| {
                    let value = operand(scope)?;
                    Ok(Value::Bool(runtime::runtime_matches(&catalog, &value, &target)))
                })
            }
            NodeKind::TypeAs { operand, target } => {
                let operand = self.compile_at(operand, d);
                let catalog = self.catalog.clone();
                let target = target.clone();
                Rc::new(move |scope| {
                    let value = operand(scope)?;
                    if !value.is_null() && runtime::runtime_matches(&catalog, &value, &target) {
                        Ok(value)
                    } else {
                        Ok(Value::Null)
                    }
                })
            }
            NodeKind::Member { instance, field, .. } => {
                let instance = self.compile_at(instance, d);
                let field = field.clone();
                Rc::new(move |scope| {
                    let obj = expect_obj(instance(scope)?, &field.name)?;
                    let data = obj.borrow();
                    Ok(data
                        .fields
                        .get(&field.name)
                        .cloned()
                        .unwrap_or_else(|| Value::default_for(&field.ty)))
                })
            }
            NodeKind::Call { instance, method, args } => {
                let instance = instance.as_ref().map(|n| self.compile_at(n, d));
                let method = method.clone();
                let compiled: Vec<SinkThunk> = method
                    .params
                    .iter()
                    .zip(args)
                    .map(|(param, arg)| {
                        if param.by_ref {
                            self.compile_sink(arg, d)
                        } else {
                            let thunk = self.compile_at(arg, d);
                            let plain: SinkThunk =
                                Rc::new(move |scope| Ok((thunk(scope)?, None)));
                            plain
                        }
                    })
                    .collect();
                Rc::new(move |scope| {
                    let receiver = match &instance {
                        Some(thunk) => {
                            let value = thunk(scope)?;
                            if value.is_null() {
                                return Err(EvalError::NullReference {
                                    member: method.name.clone(),
                                });
                            }
                            Some(value)
                        }
                        None => None,
                    };
                    let mut argvals = Vec::with_capacity(compiled.len());
                    let mut sinks = Vec::with_capacity(compiled.len());
                    for thunk in &compiled {
                        let (value, sink) = thunk(scope)?;
                        argvals.push(value);
                        sinks.push(sink);
                    }
                    let result = (method.native)(receiver.as_ref(), &mut argvals)?;
                    for (i, sink) in sinks.iter().enumerate() {
                        if let Some(sink) = sink {
                            sink.store(argvals[i].clone());
                        }
                    }
                    Ok(result)
                })
            }
            NodeKind::New { ty, ctor, args } => match ctor {
                None => {
                    let catalog = self.catalog.clone();
                    let ty = *ty;
                    Rc::new(move |_| runtime::new_default_instance(&catalog, ty))
                }
                Some(ctor) => {
                    let ctor = ctor.clone();
                    let args: Vec<Thunk> = args.iter().map(|a| self.compile_at(a, d)).collect();
                    Rc::new(move |scope| {
                        let mut argvals = Vec::with_capacity(args.len());
                        for arg in &args {
                            argvals.push(arg(scope)?);
                        }
                        (ctor.native)(None, &mut argvals)
                    })
                }
            },
            NodeKind::NewArray { items, .. } => {
                let items: Vec<Thunk> = items.iter().map(|i| self.compile_at(i, d)).collect();
                Rc::new(move |scope| {
                    let mut values = Vec::with_capacity(items.len());
                    for item in &items {
                        values.push(item(scope)?);
                    }
                    Ok(Value::array(values))
                })
            }
            NodeKind::ListInit { new_node, items } => {
                let new_node = self.compile_at(new_node, d);
                let items: Vec<CompiledInit> =
                    items.iter().map(|i| self.compile_init(&i.method, &i.args, d)).collect();
                Rc::new(move |scope| {
                    let value = new_node(scope)?;
                    for item in &items {
                        run_init(item, Some(&value), scope)?;
                    }
                    Ok(value)
                })
            }
            NodeKind::MemberInit { new_node, bindings } => {
                let new_node = self.compile_at(new_node, d);
                let catalog = self.catalog.clone();
                let bindings: Vec<CompiledBinding> =
                    bindings.iter().map(|b| self.compile_binding(b, d)).collect();
                Rc::new(move |scope| {
                    let value = new_node(scope)?;
                    let obj = expect_obj(value.clone(), "member initializer")?;
                    apply_bindings(&catalog, &obj, &bindings, scope)?;
                    Ok(value)
                })
            }
            NodeKind::Conditional { test, if_true, if_false } => {
                let test = self.compile_at(test, d);
                let if_true = self.compile_at(if_true, d);
                let if_false = self.compile_at(if_false, d);
                Rc::new(move |scope| {
                    if expect_bool(&test(scope)?)? {
                        if_true(scope)
                    } else {
                        if_false(scope)
                    }
                })
            }
            NodeKind::Switch { value, cases, default, comparison } => {
                let value = self.compile_at(value, d);
                let comparison = comparison.clone();
                let cases: Vec<(Vec<Thunk>, Thunk)> = cases
                    .iter()
                    .map(|case| {
                        let tests = case.tests.iter().map(|t| self.compile_at(t, d)).collect();
                        (tests, self.compile_at(&case.body, d))
                    })
                    .collect();
                let default = default.as_ref().map(|n| self.compile_at(n, d));
                Rc::new(move |scope| {
                    let subject = value(scope)?;
                    for (tests, body) in &cases {
                        for test in tests {
                            let candidate = test(scope)?;
                            if runtime::switch_matches(comparison.as_ref(), &subject, &candidate)? {
                                return body(scope);
                            }
                        }
                    }
                    match &default {
                        Some(default) => default(scope),
                        None => Ok(Value::Null),
                    }
                })
            }
            NodeKind::Lambda(lambda) => {
                let delegate = self.compile_lambda_body(lambda);
                Rc::new(move |scope| Ok(delegate(scope)))
            }
            NodeKind::Invoke { target, args } => {
                let target = self.compile_at(target, d);
                let args: Vec<Thunk> = args.iter().map(|a| self.compile_at(a, d)).collect();
                Rc::new(move |scope| {
                    let target = target(scope)?;
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
                    for arg in &args {
                        argvals.push(arg(scope)?);
                    }
                    (delegate.f)(&argvals)
                })
            }
            NodeKind::Block { variables, exprs } => {
                let variables: Vec<(ParamId, Ty)> = variables
                    .iter()
                    .filter_map(|v| match &v.kind {
                        NodeKind::Parameter { id, .. } => Some((*id, v.ty.clone())),
                        _ => None,
                    })
                    .collect();
                let exprs: Vec<Thunk> = exprs.iter().map(|e| self.compile_at(e, d)).collect();
                Rc::new(move |scope| {
                    let frame = scope.child();
                    for (id, ty) in &variables {
                        frame.declare(*id, Value::default_for(ty));
                    }
                    let mut last = Value::Null;
                    for expr in &exprs {
                        last = expr(&frame)?;
                    }
                    Ok(last)
                })
            }
            NodeKind::Assign { target, value } => {
                let value = self.compile_at(value, d);
                match &target.kind {
                    NodeKind::Parameter { id, name } => {
                        let id = *id;
                        let name: Rc<str> = name.clone();
                        Rc::new(move |scope| {
                            let value = value(scope)?;
                            let cell = scope.cell(id).ok_or_else(|| EvalError::TypeMismatch {
                                expected: "bound variable".into(),
                                actual: name.to_string(),
                            })?;
                            *cell.borrow_mut() = value.clone();
                            Ok(value)
                        })
                    }
                    NodeKind::Member { instance, field, .. } => {
                        let instance = self.compile_at(instance, d);
                        let field = field.clone();
                        Rc::new(move |scope| {
                            let value = value(scope)?;
                            let obj = expect_obj(instance(scope)?, &field.name)?;
                            obj.borrow_mut().fields.insert(field.name.clone(), value.clone());
                            Ok(value)
                        })
                    }
                    _ => Rc::new(move |_| {
                        Err(EvalError::TypeMismatch {
                            expected: "assignable target".into(),
                            actual: "expression".into(),
                        })
                    }),
                }
            }
        }
    }

    fn compile_binary(
        &self,
        op: BinaryOp,
        left: &NodeRef,
        right: &NodeRef,
        method: &Option<MethodRef>,
        lifted: bool,
        conversion: &Option<Rc<LambdaNode>>,
        depth: usize,
    ) -> Thunk {
        let left = self.compile_at(left, depth);
        let right = self.compile_at(right, depth);
        match op {
            BinaryOp::AndAlso => Rc::new(move |scope| {
                if !expect_bool(&left(scope)?)? {
                    return Ok(Value::Bool(false));
                }
                right(scope)
            }),
            BinaryOp::OrElse => Rc::new(move |scope| {
                if expect_bool(&left(scope)?)? {
                    return Ok(Value::Bool(true));
                }
                right(scope)
            }),
            BinaryOp::Coalesce => {
                let conversion = conversion.as_ref().map(|lambda| {
                    let param = lambda.params.first().and_then(|p| match &p.kind {
                        NodeKind::Parameter { id, .. } => Some(*id),
                        _ => None,
                    });
                    (param, self.compile_at(&lambda.body, depth))
                });
                Rc::new(move |scope| {
                    let value = left(scope)?;
                    if value.is_null() {
                        return right(scope);
                    }
                    match &conversion {
                        Some((param, body)) => {
                            let frame = scope.child();
                            if let Some(id) = param {
                                frame.declare(*id, value);
                            }
                            body(&frame)
                        }
                        None => Ok(value),
                    }
                })
            }
            _ => match method {
                Some(method) => {
                    let method = method.clone();
                    Rc::new(move |scope| {
                        ops::apply_user_binary(op, lifted, &method, left(scope)?, right(scope)?)
                    })
                }
                None => Rc::new(move |scope| {
                    ops::apply_binary(op, lifted, &left(scope)?, &right(scope)?)
                }),
            },
        }
    }

    fn compile_sink(&self, node: &NodeRef, depth: usize) -> SinkThunk {
        match &node.kind {
            NodeKind::Parameter { id, name } => {
                let id = *id;
                let name: Rc<str> = name.clone();
                Rc::new(move |scope| {
                    let cell = scope.cell(id).ok_or_else(|| EvalError::TypeMismatch {
                        expected: "bound variable".into(),
                        actual: name.to_string(),
                    })?;
                    let value = cell.borrow().clone();
                    Ok((value, Some(Sink::Cell(cell))))
                })
            }
            NodeKind::Member { instance, field, .. } => {
                let instance = self.compile_at(instance, depth);
                let field = field.clone();
                Rc::new(move |scope| {
                    let obj = expect_obj(instance(scope)?, &field.name)?;
                    let value = obj
                        .borrow()
                        .fields
                        .get(&field.name)
                        .cloned()
                        .unwrap_or_else(|| Value::default_for(&field.ty));
                    Ok((value, Some(Sink::Field { obj, name: field.name.clone() })))
                })
            }
            _ => {
                let thunk = self.compile_at(node, depth);
                Rc::new(move |scope| Ok((thunk(scope)?, None)))
            }
        }
    }

    fn compile_init(&self, method: &MethodRef, args: &[NodeRef], depth: usize) -> CompiledInit {
        CompiledInit {
            method: method.clone(),
            args: args.iter().map(|a| self.compile_at(a, depth)).collect(),
        }
    }

    fn compile_binding(&self, binding: &MemberBinding, depth: usize) -> CompiledBinding {
        match binding {
            MemberBinding::Assignment { field, value } => CompiledBinding::Assignment {
                name: field.name.clone(),
                value: self.compile_at(value, depth),
            },
            MemberBinding::Nested { field, bindings } => CompiledBinding::Nested {
                field: field.clone(),
                bindings: bindings.iter().map(|b| self.compile_binding(b, depth)).collect(),
            },
            MemberBinding::List { field, items } => CompiledBinding::List {
                field: field.clone(),
                items: items.iter().map(|i| self.compile_init(&i.method, &i.args, depth)).collect(),
            },
        }
    }

    /// Precompile a lambda body; evaluating the node then only closes the
    /// compiled body over the current scope. Depth restarts at zero: a
    /// delegate invocation opens a fresh evaluation, as in the interpreter.
    pub(crate) fn compile_lambda_body(
        &self,
        lambda: &Rc<LambdaNode>,
    ) -> Rc<dyn Fn(&Rc<Scope>) -> Value> {
        let body = self.compile_at(&lambda.body, 0);
        let params: Vec<ParamId> = lambda
            .params
            .iter()
            .filter_map(|p| match &p.kind {
                NodeKind::Parameter { id, .. } => Some(*id),
                _ => None,
            })
            .collect();
        let ty = lambda.ty.clone();
        Rc::new(move |scope: &Rc<Scope>| {
            let body = body.clone();
            let params = params.clone();
            let captured = scope.clone();
            Value::Delegate(Rc::new(DelegateValue {
                ty: ty.clone(),
                f: Box::new(move |args| {
                    if args.len() != params.len() {
                        return Err(EvalError::ArityMismatch {
                            expected: params.len(),
                            actual: args.len(),
                        });
                    }
                    let frame = captured.child();
                    for (id, arg) in params.iter().zip(args) {
                        frame.declare(*id, arg.clone());
                    }
                    body(&frame)
                }),
            }))
        })
    }
}

fn expect_obj(
    value: Value,
    member: &str,
) -> Result<Rc<std::cell::RefCell<exprtree_core::ObjectData>>, EvalError> {
    if value.is_null() {
        return Err(EvalError::NullReference { member: member.to_string() });
    }
    value.as_obj().cloned().ok_or_else(|| EvalError::TypeMismatch {
        expected: "object".into(),
        actual: value.shape_name().to_string(),
    })
}

fn run_init(
    init: &CompiledInit,
    receiver: Option<&Value>,
    scope: &Rc<Scope>,
) -> Result<Value, EvalError> {
    let mut argvals = Vec::with_capacity(init.args.len());
    for arg in &init.args {
        argvals.push(arg(scope)?);
    }
    (init.method.native)(receiver, &mut argvals)
}

fn apply_bindings(
    catalog: &Catalog,
    obj: &Rc<std::cell::RefCell<exprtree_core::ObjectData>>,
    bindings: &[CompiledBinding],
    scope: &Rc<Scope>,
) -> Result<(), EvalError> {
    for binding in bindings {
        match binding {
            CompiledBinding::Assignment { name, value } => {
                let value = value(scope)?;
                obj.borrow_mut().fields.insert(name.clone(), value);
            }
            CompiledBinding::Nested { field, bindings } => {
                let inner = runtime::field_object(catalog, obj, field)?;
                apply_bindings(catalog, &inner, bindings, scope)?;
            }
            CompiledBinding::List { field, items } => {
                let inner = runtime::field_object(catalog, obj, field)?;
                let receiver = Value::Obj(inner);
                for item in items {
                    run_init(item, Some(&receiver), scope)?;
                }
            }
        }
    }
    Ok(())
}
