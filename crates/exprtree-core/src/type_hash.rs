//! Deterministic hash-based type identity.
//!
//! [`TypeHash`] is a 64-bit hash that identifies registered nominal types and
//! their members. Hashes are computed from names, so the same name always
//! yields the same identity regardless of registration order, and a member
//! hash can be computed before the owning type is fully registered.
//!
//! XXHash64 with domain-specific mixing constants keeps type, method, and
//! constructor hashes from colliding even when they share a name.

use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Domain markers mixed into hash computation so that different entity kinds
/// never collide on a shared name.
mod domain {
    pub const TYPE: u64 = 0x2fac_10b6_3a6c_c57c;
    pub const METHOD: u64 = 0x7d3c_8b4a_92e1_5f6d;
    pub const CTOR: u64 = 0x9a7f_3d5e_2b8c_4601;
}

/// Deterministic 64-bit identity for a registered type or member.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeHash(pub u64);

impl TypeHash {
    /// Hash for a type, from its registered name.
    pub fn from_name(name: &str) -> Self {
        TypeHash(xxh64(name.as_bytes(), domain::TYPE))
    }

    /// Hash for a method or operator, from its owner, name, and overload slot.
    ///
    /// The slot index disambiguates overloads that share a name.
    pub fn from_method(owner: TypeHash, name: &str, slot: usize) -> Self {
        let seed = domain::METHOD ^ owner.0 ^ (slot as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        TypeHash(xxh64(name.as_bytes(), seed))
    }

    /// Hash for a constructor, from its owner and overload slot.
    pub fn from_ctor(owner: TypeHash, slot: usize) -> Self {
        let seed = domain::CTOR ^ owner.0 ^ (slot as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        TypeHash(xxh64(b"ctor", seed))
    }
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash({:#018x})", self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_same_hash() {
        assert_eq!(TypeHash::from_name("Point"), TypeHash::from_name("Point"));
    }

    #[test]
    fn different_names_differ() {
        assert_ne!(TypeHash::from_name("Point"), TypeHash::from_name("Size"));
    }

    #[test]
    fn method_domain_separated_from_type_domain() {
        let owner = TypeHash::from_name("Point");
        assert_ne!(TypeHash::from_method(owner, "Point", 0), owner);
    }

    #[test]
    fn overload_slots_differ() {
        let owner = TypeHash::from_name("Point");
        assert_ne!(
            TypeHash::from_method(owner, "offset", 0),
            TypeHash::from_method(owner, "offset", 1)
        );
    }
}
