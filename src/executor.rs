//! The execution surface: prepare a lambda once, invoke it many times.
//!
//! Both modes produce a [`CompiledLambda`]; the mode only decides whether
//! invocation walks the tree or runs precompiled closures. A prepared
//! lambda with the same tree and arguments yields the same value or the
//! same failure in either mode.

use std::rc::Rc;

use exprtree_core::{BuildError, Catalog, EvalError, Ty, Value};
use tracing::{debug, trace};

use crate::compile::{Compiler, Thunk};
use crate::interpret::Interpreter;
use crate::node::{LambdaNode, NodeKind, NodeRef, ParamId};
use crate::runtime::scope::Scope;

/// How a prepared lambda executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecMode {
    /// Precompile the tree into closures.
    #[default]
    Compile,
    /// Walk the tree on every invocation.
    Interpret,
}

enum Body {
    Interpret { interp: Interpreter, lambda: Rc<LambdaNode> },
    Compiled(Thunk),
}

/// An executable lambda, bound to a catalog and an execution mode.
pub struct CompiledLambda {
    ty: Ty,
    params: Vec<(ParamId, Ty)>,
    body: Body,
}

/// Prepare a lambda node for execution. Only lambda nodes are executable;
/// wrap a bare expression in a parameterless lambda first.
pub fn prepare(
    catalog: Rc<Catalog>,
    node: &NodeRef,
    mode: ExecMode,
) -> Result<CompiledLambda, BuildError> {
    let NodeKind::Lambda(lambda) = &node.kind else {
        return Err(BuildError::InvalidArgument {
            message: "only lambda nodes are executable".into(),
        });
    };
    let params: Vec<(ParamId, Ty)> = lambda
        .params
        .iter()
        .filter_map(|p| match &p.kind {
            NodeKind::Parameter { id, .. } => Some((*id, p.ty.clone())),
            _ => None,
        })
        .collect();
    debug!(?mode, params = params.len(), "preparing lambda");
    let body = match mode {
        ExecMode::Interpret => Body::Interpret {
            interp: Interpreter::new(catalog),
            lambda: lambda.clone(),
        },
        ExecMode::Compile => {
            let compiler = Compiler::new(catalog);
            Body::Compiled(compiler.compile(&lambda.body))
        }
    };
    Ok(CompiledLambda { ty: lambda.ty.clone(), params, body })
}

impl CompiledLambda {
    /// The delegate type of the underlying lambda.
    pub fn ty(&self) -> &Ty {
        &self.ty
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value, EvalError> {
        if args.len() != self.params.len() {
            return Err(EvalError::ArityMismatch {
                expected: self.params.len(),
                actual: args.len(),
            });
        }
        trace!(args = args.len(), "invoking lambda");
        let scope = Scope::root();
        for ((id, _), arg) in self.params.iter().zip(args) {
            scope.declare(*id, arg.clone());
        }
        match &self.body {
            Body::Interpret { interp, lambda } => interp.eval(&lambda.body, &scope),
            Body::Compiled(thunk) => thunk(&scope),
        }
    }
}
