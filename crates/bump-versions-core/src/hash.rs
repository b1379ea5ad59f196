//! FNV-1a 64-bit hashing used to derive stable, short identifiers for
//! changes and change groups.

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Hashes raw bytes with FNV-1a and returns the digest as lowercase hex.
pub fn fnv1a_hex(data: &[u8]) -> String {
    format!("{:016x}", fnv1a(data))
}

fn fnv1a(data: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in data {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Hashes a sequence of already-hashed hex digests by joining them with a
/// unit separator and hashing the result again. Used to combine per-change
/// hashes into a single changeset-level hash.
pub fn fnv1a_hex_join<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let joined = parts.into_iter().collect::<Vec<_>>().join("\u{1}");
    fnv1a_hex(joined.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_hashes_the_same() {
        assert_eq!(fnv1a_hex(b"hello"), fnv1a_hex(b"hello"));
    }

    #[test]
    fn different_input_hashes_differently() {
        assert_ne!(fnv1a_hex(b"hello"), fnv1a_hex(b"world"));
    }

    #[test]
    fn hex_digest_is_sixteen_chars() {
        assert_eq!(fnv1a_hex(b"").len(), 16);
        assert_eq!(fnv1a_hex(b"a-somewhat-longer-input-string").len(), 16);
    }

    #[test]
    fn join_order_matters() {
        let a = fnv1a_hex_join(["aaa", "bbb"]);
        let b = fnv1a_hex_join(["bbb", "aaa"]);
        assert_ne!(a, b);
    }

    #[test]
    fn known_vector_matches_fnv1a_spec() {
        // FNV-1a 64-bit of the empty string is the offset basis itself.
        assert_eq!(fnv1a(b""), FNV_OFFSET_BASIS);
    }
}
