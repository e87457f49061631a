//! Catalog entries: registered struct/class metadata.
//!
//! A [`StructEntry`] describes one nominal type: its fields, methods,
//! constructors, operator methods, and conversion operators. Methods carry a
//! native implementation (`Rc<dyn Fn>`) invoked by the executors; the engine
//! itself never reflects over host types at runtime.

use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;

use crate::{EvalError, Ty, TypeHash, Value};

bitflags! {
    /// Member and parameter flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemberFlags: u8 {
        const STATIC = 1;
        /// Field has no setter; assignment through it is a resolution failure.
        const READONLY = 2;
    }
}

/// A registered field.
#[derive(Debug, Clone)]
pub struct FieldEntry {
    pub name: String,
    pub ty: Ty,
    pub flags: MemberFlags,
}

impl FieldEntry {
    pub fn is_readonly(&self) -> bool {
        self.flags.contains(MemberFlags::READONLY)
    }
}

/// A method parameter declaration.
#[derive(Debug, Clone)]
pub struct ParamDef {
    pub ty: Ty,
    /// By-reference parameter: after the call returns, the (possibly
    /// mutated) argument is written back to its originating location.
    pub by_ref: bool,
}

impl ParamDef {
    pub fn new(ty: Ty) -> ParamDef {
        ParamDef { ty, by_ref: false }
    }

    pub fn by_ref(ty: Ty) -> ParamDef {
        ParamDef { ty, by_ref: true }
    }
}

/// Native implementation of a method: receives the instance (for instance
/// methods) and the argument values. Arguments are passed as a mutable slice
/// so by-ref parameters can be written in place.
pub type NativeFn = Rc<dyn Fn(Option<&Value>, &mut [Value]) -> Result<Value, EvalError>>;

/// A registered method, operator method, conversion operator, or constructor.
#[derive(Clone)]
pub struct MethodEntry {
    pub hash: TypeHash,
    pub name: String,
    pub owner: TypeHash,
    pub params: Vec<ParamDef>,
    pub ret: Ty,
    pub flags: MemberFlags,
    /// Declared generic arity; zero for non-generic methods. Generics are
    /// opaque: explicit type arguments only narrow candidate sets by count.
    pub type_params: usize,
    pub native: NativeFn,
}

/// Shared handle to a resolved method, stored on nodes.
pub type MethodRef = Rc<MethodEntry>;

impl MethodEntry {
    pub fn is_static(&self) -> bool {
        self.flags.contains(MemberFlags::STATIC)
    }
}

impl fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodEntry")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("params", &self.params)
            .field("ret", &self.ret)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// A registered struct or class.
pub struct StructEntry {
    pub name: String,
    pub hash: TypeHash,
    /// Value types box when converted to a reference context and participate
    /// in nullable lifting; reference types do not.
    pub is_value_type: bool,
    pub base: Option<TypeHash>,
    pub interfaces: Vec<TypeHash>,
    pub fields: Vec<Rc<FieldEntry>>,
    pub methods: Vec<MethodRef>,
    pub ctors: Vec<MethodRef>,
}

impl StructEntry {
    /// Start a new entry. Use the `with_*` builders, then register it.
    pub fn new(name: &str, is_value_type: bool) -> StructEntry {
        StructEntry {
            name: name.to_string(),
            hash: TypeHash::from_name(name),
            is_value_type,
            base: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            ctors: Vec::new(),
        }
    }

    pub fn with_base(mut self, base: TypeHash) -> StructEntry {
        self.base = Some(base);
        self
    }

    pub fn with_interface(mut self, interface: TypeHash) -> StructEntry {
        self.interfaces.push(interface);
        self
    }

    pub fn with_field(mut self, name: &str, ty: Ty) -> StructEntry {
        self.fields.push(Rc::new(FieldEntry {
            name: name.to_string(),
            ty,
            flags: MemberFlags::empty(),
        }));
        self
    }

    pub fn with_readonly_field(mut self, name: &str, ty: Ty) -> StructEntry {
        self.fields.push(Rc::new(FieldEntry {
            name: name.to_string(),
            ty,
            flags: MemberFlags::READONLY,
        }));
        self
    }

    /// Register an instance method.
    pub fn with_method(
        self,
        name: &str,
        params: Vec<ParamDef>,
        ret: Ty,
        native: NativeFn,
    ) -> StructEntry {
        self.push_method(name, params, ret, MemberFlags::empty(), 0, native)
    }

    /// Register a static method.
    pub fn with_static_method(
        self,
        name: &str,
        params: Vec<ParamDef>,
        ret: Ty,
        native: NativeFn,
    ) -> StructEntry {
        self.push_method(name, params, ret, MemberFlags::STATIC, 0, native)
    }

    /// Register a generic method group member with the given type-parameter
    /// count. Generic arity narrows overload candidate sets.
    pub fn with_generic_method(
        self,
        name: &str,
        type_params: usize,
        params: Vec<ParamDef>,
        ret: Ty,
        native: NativeFn,
    ) -> StructEntry {
        self.push_method(name, params, ret, MemberFlags::empty(), type_params, native)
    }

    /// Register a user-defined operator method (static, two operands for
    /// binary operators, one for unary). Operator names follow the `op_*`
    /// convention: `op_add`, `op_sub`, `op_eq`, `op_neg`, ...
    pub fn with_operator(
        self,
        op_name: &str,
        params: Vec<ParamDef>,
        ret: Ty,
        native: NativeFn,
    ) -> StructEntry {
        self.push_method(op_name, params, ret, MemberFlags::STATIC, 0, native)
    }

    /// Register a user-defined conversion operator: `op_implicit` or
    /// `op_explicit`, one parameter (the source), return type is the target.
    pub fn with_conversion(
        self,
        op_name: &str,
        from: Ty,
        to: Ty,
        native: NativeFn,
    ) -> StructEntry {
        self.push_method(op_name, vec![ParamDef::new(from)], to, MemberFlags::STATIC, 0, native)
    }

    /// Register a constructor.
    pub fn with_ctor(mut self, params: Vec<ParamDef>, native: NativeFn) -> StructEntry {
        let slot = self.ctors.len();
        let ret = Ty::Object(self.hash);
        self.ctors.push(Rc::new(MethodEntry {
            hash: TypeHash::from_ctor(self.hash, slot),
            name: "ctor".to_string(),
            owner: self.hash,
            params,
            ret,
            flags: MemberFlags::STATIC,
            type_params: 0,
            native,
        }));
        self
    }

    fn push_method(
        mut self,
        name: &str,
        params: Vec<ParamDef>,
        ret: Ty,
        flags: MemberFlags,
        type_params: usize,
        native: NativeFn,
    ) -> StructEntry {
        let slot = self.methods.len();
        self.methods.push(Rc::new(MethodEntry {
            hash: TypeHash::from_method(self.hash, name, slot),
            name: name.to_string(),
            owner: self.hash,
            params,
            ret,
            flags,
            type_params,
            native,
        }));
        self
    }
}

impl fmt::Debug for StructEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructEntry")
            .field("name", &self.name)
            .field("hash", &self.hash)
            .field("is_value_type", &self.is_value_type)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}
