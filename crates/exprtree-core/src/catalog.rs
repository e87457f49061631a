//! The type & member catalog.
//!
//! [`Catalog`] is the registry the builder consults for every resolution
//! question: assignability, nullable underlyings, member lookup, overload
//! candidate sets, user-defined operator and conversion methods. It is a
//! load-time registry keyed by [`TypeHash`], not a runtime reflection layer.
//!
//! # Thread safety
//!
//! The catalog is not thread-safe by design: it is populated single-threaded
//! during setup and becomes effectively read-only once trees are being built
//! and executed.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::{
    BuildError, FieldEntry, MethodRef, PrimitiveKind, StructEntry, Ty, TypeHash,
};

/// Name of the root reference type every value can box into.
pub const OBJECT_ROOT: &str = "Object";

/// Registry of nominal types and their members.
pub struct Catalog {
    entries: FxHashMap<TypeHash, StructEntry>,
    names: FxHashMap<String, TypeHash>,
    object_root: TypeHash,
}

impl Catalog {
    /// An empty catalog containing only the `Object` root type.
    pub fn new() -> Catalog {
        let mut catalog = Catalog {
            entries: FxHashMap::default(),
            names: FxHashMap::default(),
            object_root: TypeHash::from_name(OBJECT_ROOT),
        };
        catalog.register(StructEntry::new(OBJECT_ROOT, false));
        catalog
    }

    /// The root reference type's hash.
    pub fn object_root(&self) -> TypeHash {
        self.object_root
    }

    /// The root reference type, as a `Ty`.
    pub fn object_ty(&self) -> Ty {
        Ty::Object(self.object_root)
    }

    /// Register a struct or class entry. Re-registering a name replaces the
    /// previous entry.
    pub fn register(&mut self, entry: StructEntry) -> TypeHash {
        let hash = entry.hash;
        self.names.insert(entry.name.clone(), hash);
        self.entries.insert(hash, entry);
        hash
    }

    pub fn get(&self, hash: TypeHash) -> Option<&StructEntry> {
        self.entries.get(&hash)
    }

    pub fn lookup_name(&self, name: &str) -> Option<TypeHash> {
        self.names.get(name).copied()
    }

    /// Readable name for a type, for error messages.
    pub fn ty_name(&self, ty: &Ty) -> String {
        match ty {
            Ty::Object(hash) => self
                .get(*hash)
                .map(|e| e.name.clone())
                .unwrap_or_else(|| format!("{:?}", hash)),
            Ty::Nullable(inner) => format!("{}?", self.ty_name(inner)),
            Ty::Array(elem) => format!("{}[]", self.ty_name(elem)),
            other => format!("{:?}", other),
        }
    }

    /// Whether the type is a value type (participates in boxing and
    /// nullable lifting).
    pub fn is_value_type(&self, ty: &Ty) -> bool {
        match ty {
            Ty::Bool | Ty::Primitive(_) | Ty::Nullable(_) => true,
            Ty::Object(hash) => self.get(*hash).map(|e| e.is_value_type).unwrap_or(false),
            _ => false,
        }
    }

    /// The underlying type of a nullable wrapper, or `None`.
    pub fn underlying_type(&self, ty: &Ty) -> Option<Ty> {
        ty.underlying().cloned()
    }

    /// Implicit assignability: identity, value-to-nullable lift, implicit
    /// numeric widening, boxing into the object root, derived-to-base and
    /// class-to-interface for registered types.
    pub fn is_assignable(&self, from: &Ty, to: &Ty) -> bool {
        if from == to {
            return true;
        }
        // Lifted conversions: nullable-to-nullable follows the underlying
        // types, and a value lifts into a nullable wrapper.
        if let (Ty::Nullable(fa), Ty::Nullable(tb)) = (from, to) {
            return self.is_assignable(fa, tb);
        }
        if let Ty::Nullable(inner) = to
            && self.is_assignable(from, inner)
        {
            return true;
        }
        if let (Ty::Primitive(a), Ty::Primitive(b)) = (from, to) {
            return implicit_widening(*a, *b);
        }
        // Everything non-void boxes into the object root.
        if *to == Ty::Object(self.object_root) {
            return *from != Ty::Void;
        }
        if let (Ty::Object(a), Ty::Object(b)) = (from, to) {
            return self.object_assignable(*a, *b);
        }
        false
    }

    /// Whether `a` is `b` or derives from / implements `b`.
    pub fn object_assignable(&self, a: TypeHash, b: TypeHash) -> bool {
        if b == self.object_root {
            return true;
        }
        let mut current = Some(a);
        while let Some(hash) = current {
            if hash == b {
                return true;
            }
            let Some(entry) = self.get(hash) else { return false };
            if entry.interfaces.iter().any(|i| *i == b) {
                return true;
            }
            current = entry.base;
        }
        false
    }

    /// Look up a field by name, walking the base chain. Exact match first;
    /// a case-insensitive match is accepted only when it is unique.
    pub fn find_field(
        &self,
        owner: TypeHash,
        name: &str,
    ) -> Result<Option<Rc<FieldEntry>>, BuildError> {
        let mut insensitive: Vec<Rc<FieldEntry>> = Vec::new();
        let mut current = Some(owner);
        while let Some(hash) = current {
            let Some(entry) = self.get(hash) else { break };
            for field in &entry.fields {
                if field.name == name {
                    return Ok(Some(field.clone()));
                }
                if field.name.eq_ignore_ascii_case(name) {
                    insensitive.push(field.clone());
                }
            }
            current = entry.base;
        }
        match insensitive.len() {
            0 => Ok(None),
            1 => Ok(Some(insensitive.remove(0))),
            _ => Err(BuildError::AmbiguousMatch {
                name: name.to_string(),
                candidates: insensitive
                    .iter()
                    .map(|f| f.name.clone())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    /// Look up the overload set for a method name, walking the base chain.
    /// Same case-sensitivity rule as [`find_field`](Self::find_field): the
    /// case-insensitive fallback applies only when it resolves to exactly
    /// one distinct name.
    pub fn find_methods(
        &self,
        owner: TypeHash,
        name: &str,
    ) -> Result<Vec<MethodRef>, BuildError> {
        let mut exact: Vec<MethodRef> = Vec::new();
        let mut insensitive_names: Vec<String> = Vec::new();
        let mut current = Some(owner);
        while let Some(hash) = current {
            let Some(entry) = self.get(hash) else { break };
            for method in &entry.methods {
                if method.name == name {
                    exact.push(method.clone());
                } else if method.name.eq_ignore_ascii_case(name)
                    && !insensitive_names.contains(&method.name)
                {
                    insensitive_names.push(method.name.clone());
                }
            }
            current = entry.base;
        }
        if !exact.is_empty() {
            return Ok(exact);
        }
        match insensitive_names.len() {
            0 => Ok(Vec::new()),
            1 => self.find_methods(owner, &insensitive_names[0].clone()),
            _ => Err(BuildError::AmbiguousMatch {
                name: name.to_string(),
                candidates: insensitive_names.join(", "),
            }),
        }
    }

    /// All user-defined operator methods with the given `op_*` name on a
    /// type (exact name, base chain included).
    pub fn find_operator_methods(&self, owner: TypeHash, op_name: &str) -> Vec<MethodRef> {
        let mut found = Vec::new();
        let mut current = Some(owner);
        while let Some(hash) = current {
            let Some(entry) = self.get(hash) else { break };
            found.extend(
                entry
                    .methods
                    .iter()
                    .filter(|m| m.name == op_name)
                    .cloned(),
            );
            current = entry.base;
        }
        found
    }

    /// Find a user-defined conversion operator from `from` to `to`,
    /// searching both types when they are registered objects. Implicit
    /// operators are preferred over explicit ones.
    pub fn find_conversion(&self, from: &Ty, to: &Ty) -> Option<MethodRef> {
        let mut explicit: Option<MethodRef> = None;
        for owner in [from.strip_nullable().as_object(), to.strip_nullable().as_object()]
            .into_iter()
            .flatten()
        {
            for name in ["op_implicit", "op_explicit"] {
                for method in self.find_operator_methods(owner, name) {
                    if method.params.len() != 1 {
                        continue;
                    }
                    let matches = method.params[0].ty == *from.strip_nullable()
                        && method.ret == *to.strip_nullable();
                    if !matches {
                        continue;
                    }
                    if name == "op_implicit" {
                        return Some(method);
                    }
                    explicit.get_or_insert(method);
                }
            }
        }
        explicit
    }

    /// Constructor overload set for a registered type.
    pub fn find_ctors(&self, owner: TypeHash) -> Vec<MethodRef> {
        self.get(owner).map(|e| e.ctors.clone()).unwrap_or_default()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog::new()
    }
}

/// Implicit numeric widening per the fixed promotion ranks: integers widen
/// within their signedness family (or to a strictly larger signed kind),
/// every integer converts implicitly to `F32`/`F64`/`Decimal`, and `F32`
/// widens to `F64`. Narrowing is never implicit.
pub fn implicit_widening(from: PrimitiveKind, to: PrimitiveKind) -> bool {
    use PrimitiveKind::*;
    if from == to {
        return true;
    }
    match (from, to) {
        (_, Decimal) => from.is_integer(),
        (F32, F64) => true,
        (_, F32) | (_, F64) => from.is_integer(),
        _ => {
            if !from.is_integer() || !to.is_integer() {
                return false;
            }
            if from.is_signed() == to.is_signed() {
                to.bits() > from.bits()
            } else {
                // Unsigned widens into a strictly larger signed kind.
                !from.is_signed() && to.is_signed() && to.bits() > from.bits()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemberFlags;

    fn point_entry() -> StructEntry {
        StructEntry::new("Point", true)
            .with_field("x", Ty::Primitive(PrimitiveKind::I32))
            .with_field("y", Ty::Primitive(PrimitiveKind::I32))
    }

    #[test]
    fn register_and_lookup_by_name() {
        let mut catalog = Catalog::new();
        let hash = catalog.register(point_entry());
        assert_eq!(catalog.lookup_name("Point"), Some(hash));
        assert_eq!(catalog.get(hash).unwrap().name, "Point");
    }

    #[test]
    fn field_lookup_exact_then_case_insensitive() {
        let mut catalog = Catalog::new();
        let hash = catalog.register(point_entry());
        assert!(catalog.find_field(hash, "x").unwrap().is_some());
        // Unique case-insensitive fallback.
        assert!(catalog.find_field(hash, "X").unwrap().is_some());
        assert!(catalog.find_field(hash, "z").unwrap().is_none());
    }

    #[test]
    fn ambiguous_case_insensitive_field_fails() {
        let mut catalog = Catalog::new();
        let hash = catalog.register(
            StructEntry::new("Weird", false)
                .with_field("value", Ty::Bool)
                .with_field("Value", Ty::Bool),
        );
        assert!(catalog.find_field(hash, "value").unwrap().is_some());
        assert!(matches!(
            catalog.find_field(hash, "VALUE"),
            Err(BuildError::AmbiguousMatch { .. })
        ));
    }

    #[test]
    fn base_chain_assignability() {
        let mut catalog = Catalog::new();
        let base = catalog.register(StructEntry::new("Shape", false));
        let derived = catalog.register(StructEntry::new("Circle", false).with_base(base));
        assert!(catalog.object_assignable(derived, base));
        assert!(!catalog.object_assignable(base, derived));
        assert!(catalog.object_assignable(derived, catalog.object_root()));
    }

    #[test]
    fn interface_assignability() {
        let mut catalog = Catalog::new();
        let iface = catalog.register(StructEntry::new("Sized", false));
        let imp = catalog.register(StructEntry::new("Box", false).with_interface(iface));
        assert!(catalog.object_assignable(imp, iface));
        assert!(!catalog.object_assignable(iface, imp));
    }

    #[test]
    fn value_lifts_into_nullable() {
        let catalog = Catalog::new();
        let int = Ty::Primitive(PrimitiveKind::I32);
        assert!(catalog.is_assignable(&int, &Ty::nullable(int.clone())));
        assert!(!catalog.is_assignable(&Ty::nullable(int.clone()), &int));
    }

    #[test]
    fn boxing_into_object_root() {
        let catalog = Catalog::new();
        assert!(catalog.is_assignable(&Ty::Primitive(PrimitiveKind::I32), &catalog.object_ty()));
        assert!(catalog.is_assignable(&Ty::Str, &catalog.object_ty()));
        assert!(!catalog.is_assignable(&Ty::Void, &catalog.object_ty()));
    }

    #[test]
    fn widening_is_implicit_narrowing_is_not() {
        use PrimitiveKind::*;
        assert!(implicit_widening(I32, I64));
        assert!(implicit_widening(U8, I16));
        assert!(implicit_widening(I32, F64));
        assert!(implicit_widening(I64, Decimal));
        assert!(!implicit_widening(I64, I32));
        assert!(!implicit_widening(F64, F32));
        assert!(!implicit_widening(F64, Decimal));
        assert!(!implicit_widening(I8, U16));
    }

    #[test]
    fn readonly_flag_round_trips() {
        let entry = StructEntry::new("Frozen", true).with_readonly_field("id", Ty::Str);
        assert!(entry.fields[0].flags.contains(MemberFlags::READONLY));
    }
}
