//! The immutable expression node model.
//!
//! Nodes are built bottom-up by the factory functions in [`build`](crate::build)
//! and shared behind [`NodeRef`] handles; a node never changes after
//! construction, so subtrees can be freely reused across trees. Every node
//! carries the static [`Ty`] computed at construction time, and every
//! resolution decision (operator method, conversion classification, lifting)
//! is recorded on the node so the executors replay decisions instead of
//! re-resolving them.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use exprtree_core::{FieldEntry, MethodRef, PrimitiveKind, Ty, TypeHash, Value};

/// Shared handle to an immutable node.
pub type NodeRef = Rc<Node>;

/// One expression node: a static type plus the operation-specific payload.
#[derive(Debug)]
pub struct Node {
    pub ty: Ty,
    pub kind: NodeKind,
}

impl Node {
    pub(crate) fn new(ty: Ty, kind: NodeKind) -> NodeRef {
        Rc::new(Node { ty, kind })
    }
}

/// Identity of a parameter node. Two parameters with the same name and type
/// are still distinct binding sites; only the same node instance refers to
/// the same variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(u64);

impl ParamId {
    pub(crate) fn fresh() -> ParamId {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        ParamId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    /// Negation that raises an overflow failure instead of wrapping.
    NegateChecked,
    /// Logical not on `bool`, bitwise complement on integers.
    Not,
    UnaryPlus,
    ArrayLength,
}

impl UnaryOp {
    /// The `op_*` method name searched for user-defined operators.
    pub fn op_method_name(self) -> Option<&'static str> {
        match self {
            UnaryOp::Negate | UnaryOp::NegateChecked => Some("op_neg"),
            UnaryOp::Not => Some("op_not"),
            UnaryOp::UnaryPlus => Some("op_plus"),
            UnaryOp::ArrayLength => None,
        }
    }

    pub fn is_checked(self) -> bool {
        matches!(self, UnaryOp::NegateChecked)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Negate | UnaryOp::NegateChecked => "-",
            UnaryOp::Not => "!",
            UnaryOp::UnaryPlus => "+",
            UnaryOp::ArrayLength => "length",
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    AddChecked,
    Subtract,
    SubtractChecked,
    Multiply,
    MultiplyChecked,
    Divide,
    Modulo,
    And,
    Or,
    ExclusiveOr,
    LeftShift,
    RightShift,
    AndAlso,
    OrElse,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Coalesce,
}

impl BinaryOp {
    /// The `op_*` method name searched for user-defined operators. Checked
    /// variants share the unchecked operator method.
    pub fn op_method_name(self) -> Option<&'static str> {
        match self {
            BinaryOp::Add | BinaryOp::AddChecked => Some("op_add"),
            BinaryOp::Subtract | BinaryOp::SubtractChecked => Some("op_sub"),
            BinaryOp::Multiply | BinaryOp::MultiplyChecked => Some("op_mul"),
            BinaryOp::Divide => Some("op_div"),
            BinaryOp::Modulo => Some("op_mod"),
            BinaryOp::And => Some("op_and"),
            BinaryOp::Or => Some("op_or"),
            BinaryOp::ExclusiveOr => Some("op_xor"),
            BinaryOp::LeftShift => Some("op_shl"),
            BinaryOp::RightShift => Some("op_shr"),
            BinaryOp::Equal => Some("op_eq"),
            BinaryOp::NotEqual => Some("op_ne"),
            BinaryOp::LessThan => Some("op_lt"),
            BinaryOp::LessThanOrEqual => Some("op_le"),
            BinaryOp::GreaterThan => Some("op_gt"),
            BinaryOp::GreaterThanOrEqual => Some("op_ge"),
            BinaryOp::AndAlso | BinaryOp::OrElse | BinaryOp::Coalesce => None,
        }
    }

    pub fn is_checked(self) -> bool {
        matches!(
            self,
            BinaryOp::AddChecked | BinaryOp::SubtractChecked | BinaryOp::MultiplyChecked
        )
    }

    /// Operators that produce `bool` from two same-typed operands.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanOrEqual
        )
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinaryOp::Equal | BinaryOp::NotEqual)
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::LeftShift | BinaryOp::RightShift)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add | BinaryOp::AddChecked => "+",
            BinaryOp::Subtract | BinaryOp::SubtractChecked => "-",
            BinaryOp::Multiply | BinaryOp::MultiplyChecked => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::ExclusiveOr => "^",
            BinaryOp::LeftShift => "<<",
            BinaryOp::RightShift => ">>",
            BinaryOp::AndAlso => "&&",
            BinaryOp::OrElse => "||",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::Coalesce => "??",
        }
    }
}

/// The conversion a `Convert` node performs, classified at build time.
/// Wrapping variants compose: a nullable-to-nullable numeric conversion is
/// `Lifted(Numeric { .. })`, an unwrap-then-convert is `Unwrap(..)`, and a
/// convert-then-wrap is `Wrap(..)`.
#[derive(Debug, Clone)]
pub enum ConversionKind {
    /// Representation-preserving: the value passes through unchanged.
    Identity,
    /// Numeric conversion between primitive kinds.
    Numeric { from: PrimitiveKind, to: PrimitiveKind },
    /// Perform the inner conversion, then wrap into a nullable context
    /// (a no-op on the value representation).
    Wrap(Box<ConversionKind>),
    /// Unwrap a nullable operand (empty raises a null-unwrap failure), then
    /// perform the inner conversion.
    Unwrap(Box<ConversionKind>),
    /// Null propagates as null; otherwise perform the inner conversion.
    Lifted(Box<ConversionKind>),
    /// Value type into the object root.
    Boxing,
    /// Object root back to a value type; fails at runtime when the boxed
    /// value's runtime type does not match.
    Unboxing { target: Ty },
    /// User-defined conversion operator.
    Method { method: MethodRef },
    /// Reference conversion along the inheritance chain. Downcasts are
    /// checked against the runtime type.
    Reference { target: Ty, downcast: bool },
}

/// A case arm of a `Switch` node: several test values sharing one body.
#[derive(Debug)]
pub struct SwitchCase {
    pub tests: Vec<NodeRef>,
    pub body: NodeRef,
}

/// One element-add step of a `ListInit` node.
#[derive(Debug)]
pub struct ElementInit {
    pub method: MethodRef,
    pub args: Vec<NodeRef>,
}

/// One binding step of a `MemberInit` node.
#[derive(Debug)]
pub enum MemberBinding {
    /// Assign a value to a field.
    Assignment { field: Rc<FieldEntry>, value: NodeRef },
    /// Recurse into a struct-typed field and bind its members in place.
    Nested { field: Rc<FieldEntry>, bindings: Vec<MemberBinding> },
    /// Populate a collection-typed field through its add method.
    List { field: Rc<FieldEntry>, items: Vec<ElementInit> },
}

/// A lambda: parameter nodes (each a `Parameter`) and a body.
#[derive(Debug)]
pub struct LambdaNode {
    pub params: Vec<NodeRef>,
    pub body: NodeRef,
    /// The delegate type of the lambda.
    pub ty: Ty,
}

/// The operation-specific payload of a node.
pub enum NodeKind {
    Constant(Value),
    Parameter {
        id: ParamId,
        name: Rc<str>,
    },
    Unary {
        op: UnaryOp,
        operand: NodeRef,
        /// User-defined operator method, when one was resolved.
        method: Option<MethodRef>,
        /// Nullable lifting applied over a non-nullable operator.
        lifted: bool,
    },
    Binary {
        op: BinaryOp,
        left: NodeRef,
        right: NodeRef,
        method: Option<MethodRef>,
        lifted: bool,
        /// Conversion applied to the left value of a coalesce before it is
        /// produced as the result.
        conversion: Option<Rc<LambdaNode>>,
    },
    Convert {
        operand: NodeRef,
        kind: ConversionKind,
        /// Checked conversions raise an overflow failure instead of
        /// truncating out-of-range numerics.
        checked: bool,
    },
    /// Runtime type test producing `bool`.
    TypeIs {
        operand: NodeRef,
        target: Ty,
    },
    /// Runtime type cast producing the target type or null.
    TypeAs {
        operand: NodeRef,
        target: Ty,
    },
    /// Field read (or assignment target).
    Member {
        instance: NodeRef,
        field: Rc<FieldEntry>,
        owner: TypeHash,
    },
    Call {
        instance: Option<NodeRef>,
        method: MethodRef,
        args: Vec<NodeRef>,
    },
    New {
        ty: TypeHash,
        /// `None` means the synthesized default constructor.
        ctor: Option<MethodRef>,
        args: Vec<NodeRef>,
    },
    NewArray {
        elem: Ty,
        items: Vec<NodeRef>,
    },
    ListInit {
        new_node: NodeRef,
        items: Vec<ElementInit>,
    },
    MemberInit {
        new_node: NodeRef,
        bindings: Vec<MemberBinding>,
    },
    Conditional {
        test: NodeRef,
        if_true: NodeRef,
        if_false: NodeRef,
    },
    Switch {
        value: NodeRef,
        cases: Vec<SwitchCase>,
        default: Option<NodeRef>,
        /// Custom comparison method; structural value equality otherwise.
        comparison: Option<MethodRef>,
    },
    Lambda(Rc<LambdaNode>),
    /// Invocation of a delegate-typed expression.
    Invoke {
        target: NodeRef,
        args: Vec<NodeRef>,
    },
    Block {
        variables: Vec<NodeRef>,
        exprs: Vec<NodeRef>,
    },
    Assign {
        target: NodeRef,
        value: NodeRef,
    },
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Constant(v) => f.debug_tuple("Constant").field(v).finish(),
            NodeKind::Parameter { id, name } => f
                .debug_struct("Parameter")
                .field("id", id)
                .field("name", name)
                .finish(),
            NodeKind::Unary { op, operand, lifted, .. } => f
                .debug_struct("Unary")
                .field("op", op)
                .field("operand", operand)
                .field("lifted", lifted)
                .finish_non_exhaustive(),
            NodeKind::Binary { op, left, right, lifted, .. } => f
                .debug_struct("Binary")
                .field("op", op)
                .field("left", left)
                .field("right", right)
                .field("lifted", lifted)
                .finish_non_exhaustive(),
            NodeKind::Convert { operand, kind, checked } => f
                .debug_struct("Convert")
                .field("operand", operand)
                .field("kind", kind)
                .field("checked", checked)
                .finish(),
            NodeKind::TypeIs { operand, target } => f
                .debug_struct("TypeIs")
                .field("operand", operand)
                .field("target", target)
                .finish(),
            NodeKind::TypeAs { operand, target } => f
                .debug_struct("TypeAs")
                .field("operand", operand)
                .field("target", target)
                .finish(),
            NodeKind::Member { instance, field, .. } => f
                .debug_struct("Member")
                .field("instance", instance)
                .field("field", &field.name)
                .finish(),
            NodeKind::Call { instance, method, args } => f
                .debug_struct("Call")
                .field("instance", instance)
                .field("method", &method.name)
                .field("args", args)
                .finish(),
            NodeKind::New { ty, args, .. } => f
                .debug_struct("New")
                .field("ty", ty)
                .field("args", args)
                .finish_non_exhaustive(),
            NodeKind::NewArray { elem, items } => f
                .debug_struct("NewArray")
                .field("elem", elem)
                .field("items", items)
                .finish(),
            NodeKind::ListInit { new_node, items } => f
                .debug_struct("ListInit")
                .field("new_node", new_node)
                .field("items", &items.len())
                .finish(),
            NodeKind::MemberInit { new_node, bindings } => f
                .debug_struct("MemberInit")
                .field("new_node", new_node)
                .field("bindings", &bindings.len())
                .finish(),
            NodeKind::Conditional { test, if_true, if_false } => f
                .debug_struct("Conditional")
                .field("test", test)
                .field("if_true", if_true)
                .field("if_false", if_false)
                .finish(),
            NodeKind::Switch { value, cases, default, .. } => f
                .debug_struct("Switch")
                .field("value", value)
                .field("cases", &cases.len())
                .field("default", &default.is_some())
                .finish_non_exhaustive(),
            NodeKind::Lambda(lambda) => f.debug_tuple("Lambda").field(&lambda.ty).finish(),
            NodeKind::Invoke { target, args } => f
                .debug_struct("Invoke")
                .field("target", target)
                .field("args", args)
                .finish(),
            NodeKind::Block { variables, exprs } => f
                .debug_struct("Block")
                .field("variables", variables)
                .field("exprs", exprs)
                .finish(),
            NodeKind::Assign { target, value } => f
                .debug_struct("Assign")
                .field("target", target)
                .field("value", value)
                .finish(),
        }
    }
}
