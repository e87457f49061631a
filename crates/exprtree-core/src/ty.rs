//! Semantic type references.
//!
//! Every expression node carries exactly one [`Ty`], computed at construction
//! time. Structural types (nullable wrappers, arrays, delegates) are expressed
//! inline so they can be derived without touching the registry; nominal types
//! (user-registered structs and classes) are identified by [`TypeHash`] and
//! described by the [`Catalog`](crate::Catalog).

use std::fmt;

use crate::TypeHash;

/// Built-in primitive numeric kinds.
///
/// `Decimal` is deliberately kept outside the float family: the promotion
/// rules never mix it with `F32`/`F64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Decimal,
}

impl PrimitiveKind {
    pub fn is_integer(self) -> bool {
        !matches!(self, PrimitiveKind::F32 | PrimitiveKind::F64 | PrimitiveKind::Decimal)
    }

    pub fn is_float(self) -> bool {
        matches!(self, PrimitiveKind::F32 | PrimitiveKind::F64)
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            PrimitiveKind::I8
                | PrimitiveKind::I16
                | PrimitiveKind::I32
                | PrimitiveKind::I64
                | PrimitiveKind::F32
                | PrimitiveKind::F64
                | PrimitiveKind::Decimal
        )
    }

    /// Width in bits for the integer kinds.
    pub fn bits(self) -> u32 {
        match self {
            PrimitiveKind::I8 | PrimitiveKind::U8 => 8,
            PrimitiveKind::I16 | PrimitiveKind::U16 => 16,
            PrimitiveKind::I32 | PrimitiveKind::U32 | PrimitiveKind::F32 => 32,
            PrimitiveKind::I64 | PrimitiveKind::U64 | PrimitiveKind::F64 => 64,
            PrimitiveKind::Decimal => 128,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::I8 => "i8",
            PrimitiveKind::I16 => "i16",
            PrimitiveKind::I32 => "i32",
            PrimitiveKind::I64 => "i64",
            PrimitiveKind::U8 => "u8",
            PrimitiveKind::U16 => "u16",
            PrimitiveKind::U32 => "u32",
            PrimitiveKind::U64 => "u64",
            PrimitiveKind::F32 => "f32",
            PrimitiveKind::F64 => "f64",
            PrimitiveKind::Decimal => "decimal",
        }
    }

    /// Widen the small integer kinds to `I32` before promotion, the way the
    /// fixed-rank operand promotion table expects.
    pub fn widened(self) -> PrimitiveKind {
        match self {
            PrimitiveKind::I8 | PrimitiveKind::I16 | PrimitiveKind::U8 | PrimitiveKind::U16 => {
                PrimitiveKind::I32
            }
            other => other,
        }
    }

    /// Common operand type for a binary numeric operation, per the fixed rank
    /// ordering (int < long < float < double, decimal kept separate).
    ///
    /// Returns `None` when no promotion exists: decimal mixed with any float,
    /// or `u64` mixed with a signed kind.
    pub fn promoted(a: PrimitiveKind, b: PrimitiveKind) -> Option<PrimitiveKind> {
        use PrimitiveKind::*;

        let a = a.widened();
        let b = b.widened();
        if a == b {
            return Some(a);
        }

        // Decimal never mixes with the float family.
        if a == Decimal || b == Decimal {
            return if a.is_float() || b.is_float() { None } else { Some(Decimal) };
        }

        if a == F64 || b == F64 {
            return Some(F64);
        }
        if a == F32 || b == F32 {
            return Some(F32);
        }

        // Pure integer mix. u64 with a signed operand has no common type.
        match (a, b) {
            (U64, other) | (other, U64) => {
                if other.is_signed() {
                    None
                } else {
                    Some(U64)
                }
            }
            (I64, _) | (_, I64) => Some(I64),
            // u32 with i32 widens to i64 so neither side loses range.
            (U32, I32) | (I32, U32) => Some(I64),
            (U32, _) | (_, U32) => Some(U32),
            _ => Some(I32),
        }
    }
}

/// A semantic type reference.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    Void,
    Bool,
    Str,
    Primitive(PrimitiveKind),
    /// Nullable wrapper over a value type.
    Nullable(Box<Ty>),
    Array(Box<Ty>),
    /// Function type: argument types in order, then the return type.
    Delegate { params: Vec<Ty>, ret: Box<Ty> },
    /// User-registered struct or class, described by the catalog.
    Object(TypeHash),
}

impl Ty {
    pub fn primitive(kind: PrimitiveKind) -> Ty {
        Ty::Primitive(kind)
    }

    pub fn nullable(inner: Ty) -> Ty {
        Ty::Nullable(Box::new(inner))
    }

    pub fn array(elem: Ty) -> Ty {
        Ty::Array(Box::new(elem))
    }

    pub fn delegate(params: Vec<Ty>, ret: Ty) -> Ty {
        Ty::Delegate { params, ret: Box::new(ret) }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, Ty::Nullable(_))
    }

    /// The wrapped type of a nullable wrapper, or `None`.
    pub fn underlying(&self) -> Option<&Ty> {
        match self {
            Ty::Nullable(inner) => Some(inner),
            _ => None,
        }
    }

    /// The type with one nullable wrapper stripped, or the type itself.
    pub fn strip_nullable(&self) -> &Ty {
        match self {
            Ty::Nullable(inner) => inner,
            other => other,
        }
    }

    pub fn as_primitive(&self) -> Option<PrimitiveKind> {
        match self {
            Ty::Primitive(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<TypeHash> {
        match self {
            Ty::Object(hash) => Some(*hash),
            _ => None,
        }
    }
}

impl fmt::Debug for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Void => write!(f, "void"),
            Ty::Bool => write!(f, "bool"),
            Ty::Str => write!(f, "str"),
            Ty::Primitive(kind) => write!(f, "{}", kind.name()),
            Ty::Nullable(inner) => write!(f, "{:?}?", inner),
            Ty::Array(elem) => write!(f, "{:?}[]", elem),
            Ty::Delegate { params, ret } => {
                write!(f, "fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}", p)?;
                }
                write!(f, ") -> {:?}", ret)
            }
            Ty::Object(hash) => write!(f, "object#{}", hash),
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
