//! Merkle root over transaction ids.

use crate::hash::{blake2b256, Hash256};

fn merkle_node(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_bytes());
    buf[32..].copy_from_slice(right.as_bytes());
    blake2b256(&buf)
}

/// Root of the merkle tree over `hashes`.
///
/// Rows with an odd element count duplicate their last element. An empty
/// input yields the zero hash.
pub fn merkle_root(hashes: &[Hash256]) -> Hash256 {
    if hashes.len() <= 1 {
        return hashes.first().copied().unwrap_or(Hash256::ZERO);
    }

    let mut row = Vec::with_capacity(hashes.len() / 2 + 1);
    let mut i = 0;
    while i + 1 < hashes.len() {
        row.push(merkle_node(&hashes[i], &hashes[i + 1]));
        i += 2;
    }
    if hashes.len() % 2 == 1 {
        let last = &hashes[hashes.len() - 1];
        row.push(merkle_node(last, last));
    }
    merkle_root(&row)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(n: u8) -> Hash256 {
        blake2b256(&[n])
    }

    #[test]
    fn test_empty() {
        assert_eq!(merkle_root(&[]), Hash256::ZERO);
    }

    #[test]
    fn test_single_hash_is_root() {
        assert_eq!(merkle_root(&[h(1)]), h(1));
    }

    #[test]
    fn test_two_hashes() {
        let expected = merkle_node(&h(1), &h(2));
        assert_eq!(merkle_root(&[h(1), h(2)]), expected);
    }

    #[test]
    fn test_odd_count_duplicates_last() {
        let a = merkle_node(&h(1), &h(2));
        let b = merkle_node(&h(3), &h(3));
        assert_eq!(merkle_root(&[h(1), h(2), h(3)]), merkle_node(&a, &b));
    }

    #[test]
    fn test_order_matters() {
        assert_ne!(merkle_root(&[h(1), h(2)]), merkle_root(&[h(2), h(1)]));
    }
}
