//! Balanced binary Merkle tree over block payloads.
//!
//! Leaves are raw payload bytes. A leaf hashes to `H(payload)` and an
//! internal node to `H(H(left) ‖ H(right))`, so a block's root commits to the
//! exact payload sequence. Only power-of-two leaf counts are accepted, which
//! keeps every tree perfectly balanced.

use crate::hash::{hash, hash_concat, Hash};
use thiserror::Error;

/// Errors raised by the Merkle engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MerkleError {
    #[error("merkle tree requires a non-zero power-of-two number of leaves, got {leaves}")]
    UnsupportedShape { leaves: usize },

    #[error("leaf index {index} out of range for {leaves} leaves")]
    LeafIndexOutOfRange { index: usize, leaves: usize },
}

pub type Result<T> = std::result::Result<T, MerkleError>;

fn check_shape(leaves: usize) -> Result<()> {
    if leaves.is_power_of_two() {
        Ok(())
    } else {
        Err(MerkleError::UnsupportedShape { leaves })
    }
}

/// Compute the Merkle root of a power-of-two sized list of payloads.
pub fn calculate_merkle_root<T: AsRef<[u8]>>(leaves: &[T]) -> Result<Hash> {
    check_shape(leaves.len())?;
    Ok(subtree_hash(leaves))
}

/// Hash of the (balanced) subtree spanning `leaves`.
fn subtree_hash<T: AsRef<[u8]>>(leaves: &[T]) -> Hash {
    let mut level: Vec<Hash> = leaves.iter().map(|leaf| hash(leaf.as_ref())).collect();

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => hash_concat(&[left.as_ref(), right.as_ref()]),
                [single] => *single,
                _ => unreachable!("chunks(2) yields one or two nodes"),
            })
            .collect();
    }

    level.first().copied().unwrap_or(Hash::ZERO)
}

/// Sibling hashes needed to rebuild the root from the payload at `leaf_index`.
///
/// The path is produced by recursive halving: when the leaf lies in the right
/// half the left subtree hash is emitted before descending, otherwise the
/// descent happens first and the right subtree hash follows. Use
/// [`root_from_proof`] to fold the path back in the same order.
pub fn get_required_hashes<T: AsRef<[u8]>>(leaves: &[T], leaf_index: usize) -> Result<Vec<Hash>> {
    check_shape(leaves.len())?;
    if leaf_index >= leaves.len() {
        return Err(MerkleError::LeafIndexOutOfRange {
            index: leaf_index,
            leaves: leaves.len(),
        });
    }

    let mut path = Vec::with_capacity(leaves.len().trailing_zeros() as usize);
    collect_required(leaves, leaf_index, &mut path);
    Ok(path)
}

fn collect_required<T: AsRef<[u8]>>(leaves: &[T], leaf_index: usize, path: &mut Vec<Hash>) {
    match leaves {
        [] | [_] => {}
        [first, second] => {
            let sibling = if leaf_index == 0 { second } else { first };
            path.push(hash(sibling.as_ref()));
        }
        _ => {
            let (left, right) = leaves.split_at(leaves.len() / 2);
            if leaf_index >= left.len() {
                path.push(subtree_hash(left));
                collect_required(right, leaf_index - left.len(), path);
            } else {
                collect_required(left, leaf_index, path);
                path.push(subtree_hash(right));
            }
        }
    }
}

/// Rebuild a root from a leaf payload and the path returned by
/// [`get_required_hashes`].
///
/// The tree size is implied by the path length (`2^hashes.len()`). Returns
/// `None` when the index cannot belong to a tree of that size.
pub fn root_from_proof(leaf: &[u8], leaf_index: usize, hashes: &[Hash]) -> Option<Hash> {
    let depth = u32::try_from(hashes.len()).ok()?;
    let size = 1usize.checked_shl(depth)?;
    if leaf_index >= size {
        return None;
    }

    let mut siblings = hashes.iter();
    let root = fold_path(size, leaf_index, hash(leaf), &mut siblings)?;

    // Every supplied hash must have been consumed.
    siblings.next().is_none().then_some(root)
}

fn fold_path<'a, I>(size: usize, leaf_index: usize, leaf_hash: Hash, siblings: &mut I) -> Option<Hash>
where
    I: Iterator<Item = &'a Hash>,
{
    match size {
        1 => Some(leaf_hash),
        2 => {
            let sibling = siblings.next()?;
            Some(if leaf_index == 0 {
                hash_concat(&[leaf_hash.as_ref(), sibling.as_ref()])
            } else {
                hash_concat(&[sibling.as_ref(), leaf_hash.as_ref()])
            })
        }
        _ => {
            let half = size / 2;
            let (left, right) = if leaf_index >= half {
                let left = *siblings.next()?;
                (left, fold_path(half, leaf_index - half, leaf_hash, siblings)?)
            } else {
                let left = fold_path(half, leaf_index, leaf_hash, siblings)?;
                (left, *siblings.next()?)
            };
            Some(hash_concat(&[left.as_ref(), right.as_ref()]))
        }
    }
}

/// Check that `leaf` at `leaf_index` is included under `root`.
pub fn verify_proof(root: &Hash, leaf: &[u8], leaf_index: usize, hashes: &[Hash]) -> bool {
    root_from_proof(leaf, leaf_index, hashes).as_ref() == Some(root)
}
