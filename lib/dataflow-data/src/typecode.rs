use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A stable hash of `T`'s type name, stored in every [`crate::Block`] so a
/// reader attaching to a stream can verify it was built for the same item
/// type before attempting to decode anything (§6 of the design: "typecode
/// hash verification").
///
/// Not a substitute for a real schema id: it only catches gross mismatches
/// (a `Stream<u64>` reader attached to a `Stream<String>`), the same way a
/// debug assertion would, not a versioned wire contract.
pub fn typecode_hash<T: ?Sized>() -> u64 {
    let mut hasher = DefaultHasher::new();
    std::any::type_name::<T>().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::typecode_hash;

    #[test]
    fn distinct_types_hash_differently() {
        assert_ne!(typecode_hash::<u64>(), typecode_hash::<String>());
    }

    #[test]
    fn same_type_hashes_identically() {
        assert_eq!(typecode_hash::<Vec<u8>>(), typecode_hash::<Vec<u8>>());
    }
}
