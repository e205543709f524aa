//! An authenticated binary trie with an in-memory overlay over a
//! pluggable key-value backend.
//!
//! Keys are addressed by the bits of their SHA2-256 digest, so the
//! structure is balanced regardless of key distribution and the root is
//! a binding commitment to the full contents. Nodes share structure via
//! `Arc`; an insert rebuilds only the path it touches. Writes accumulate
//! in memory and reach the backend as one atomic batch on `commit`.


use std::sync::Arc;

use mizar_crypto::hash::sha256;
use mizar_storage::KvBackend;
use mizar_types::error::{StateError, StorageError};
use mizar_types::Hash256;
use parity_scale_codec::{Decode, Encode};

const LEAF_PREFIX: u8 = 0x00;
const BRANCH_PREFIX: u8 = 0x01;

/// Maximum path depth; keys are 256-bit digests.
const TREE_HEIGHT: usize = 256;

#[derive(Clone, PartialEq)]
enum Node {
    Empty,
    Leaf {
        key: Vec<u8>,
        value: Vec<u8>,
        gen: u64,
    },
    Branch {
        left: Arc<Node>,
        right: Arc<Node>,
        hash: Hash256,
        gen: u64,
    },
}

/// Persisted form of a node; children are referenced by hash, with the
/// zero hash standing for the empty child.
#[derive(Encode, Decode)]
enum NodeRepr {
    Leaf { key: Vec<u8>, value: Vec<u8> },
    Branch { left: Hash256, right: Hash256 },
}

impl Node {
    fn hash(&self) -> Hash256 {
        match self {
            Node::Empty => Hash256::ZERO,
            Node::Leaf { key, value, .. } => {
                let mut data = Vec::with_capacity(1 + key.len() + value.len());
                data.push(LEAF_PREFIX);
                data.extend_from_slice(key);
                data.extend_from_slice(value);
                sha256(&data)
            }
            Node::Branch { hash, .. } => *hash,
        }
    }

    fn compute_branch_hash(left: &Node, right: &Node) -> Hash256 {
        let mut data = Vec::with_capacity(1 + 64);
        data.push(BRANCH_PREFIX);
        data.extend_from_slice(left.hash().as_bytes());
        data.extend_from_slice(right.hash().as_bytes());
        sha256(&data)
    }

    fn gen(&self) -> u64 {
        match self {
            Node::Empty => 0,
            Node::Leaf { gen, .. } | Node::Branch { gen, .. } => *gen,
        }
    }

    fn to_repr(&self) -> Option<NodeRepr> {
        match self {
            Node::Empty => None,
            Node::Leaf { key, value, .. } => Some(NodeRepr::Leaf {
                key: key.clone(),
                value: value.clone(),
            }),
            Node::Branch { left, right, .. } => Some(NodeRepr::Branch {
                left: left.hash(),
                right: right.hash(),
            }),
        }
    }
}

fn get_bit(path: &Hash256, position: usize) -> bool {
    let byte_index = position / 8;
    let bit_index = 7 - (position % 8);
    (path.0[byte_index] >> bit_index) & 1 == 1
}

/// The authenticated trie. Clones share the backend and the immutable
/// node structure but diverge from the moment either side writes.
#[derive(Clone)]
pub struct AuthTrie {
    backend: Arc<dyn KvBackend>,
    root: Arc<Node>,
    committed_root: Hash256,
    gen: u64,
}

impl AuthTrie {
    /// An empty trie over `backend`, rooted at the empty-node hash.
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            root: Arc::new(Node::Empty),
            committed_root: Hash256::ZERO,
            gen: 1,
        }
    }

    /// Resets the working tree to the empty root. The overlay is
    /// dropped; the backend is untouched.
    pub fn init(&mut self) {
        self.root = Arc::new(Node::Empty);
    }

    /// The current root hash.
    pub fn root(&self) -> Hash256 {
        self.root.hash()
    }

    /// Points the trie at an existing committed root and loads that
    /// version from the backend. The zero root is the empty trie.
    pub fn set_root(&mut self, root: Hash256) -> Result<(), StateError> {
        self.root = self.load_node(&root)?;
        self.committed_root = root;
        Ok(())
    }

    fn load_node(&self, hash: &Hash256) -> Result<Arc<Node>, StateError> {
        if hash.is_zero() {
            return Ok(Arc::new(Node::Empty));
        }
        let bytes = self
            .backend
            .get(hash.as_bytes())?
            .ok_or_else(|| StorageError::Backend(format!("missing trie node {hash}")))?;
        let repr = NodeRepr::decode(&mut &*bytes)
            .map_err(|e| StateError::MalformedInput(format!("undecodable trie node: {e}")))?;
        let node = match repr {
            NodeRepr::Leaf { key, value } => Node::Leaf { key, value, gen: 0 },
            NodeRepr::Branch { left, right } => {
                let left = self.load_node(&left)?;
                let right = self.load_node(&right)?;
                let hash = Node::compute_branch_hash(&left, &right);
                Node::Branch {
                    left,
                    right,
                    hash,
                    gen: 0,
                }
            }
        };
        if node.hash() != *hash {
            return Err(StateError::Invariant(format!(
                "trie node {hash} does not hash to its key"
            )));
        }
        Ok(Arc::new(node))
    }

    /// Inserts or replaces a value. The write lands in the overlay only.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) {
        let path = sha256(key);
        self.root = self.update_node(&self.root.clone(), &path, key, value, 0);
    }

    fn update_node(
        &self,
        node: &Arc<Node>,
        path: &Hash256,
        key: &[u8],
        value: &[u8],
        depth: usize,
    ) -> Arc<Node> {
        if depth >= TREE_HEIGHT {
            return Arc::new(Node::Leaf {
                key: key.to_vec(),
                value: value.to_vec(),
                gen: self.gen,
            });
        }

        match node.as_ref() {
            Node::Empty => Arc::new(Node::Leaf {
                key: key.to_vec(),
                value: value.to_vec(),
                gen: self.gen,
            }),
            Node::Leaf { key: leaf_key, .. } => {
                if leaf_key.as_slice() == key {
                    return Arc::new(Node::Leaf {
                        key: key.to_vec(),
                        value: value.to_vec(),
                        gen: self.gen,
                    });
                }
                // Split: push the existing leaf one level down, then
                // descend again for the new key.
                let existing_path = sha256(leaf_key);
                let bit = get_bit(&existing_path, depth);
                let (left, right) = if bit {
                    (Arc::new(Node::Empty), node.clone())
                } else {
                    (node.clone(), Arc::new(Node::Empty))
                };
                let hash = Node::compute_branch_hash(&left, &right);
                let branch = Arc::new(Node::Branch {
                    left,
                    right,
                    hash,
                    gen: self.gen,
                });
                self.update_node(&branch, path, key, value, depth)
            }
            Node::Branch { left, right, .. } => {
                let bit = get_bit(path, depth);
                let (new_left, new_right) = if bit {
                    (
                        left.clone(),
                        self.update_node(right, path, key, value, depth + 1),
                    )
                } else {
                    (
                        self.update_node(left, path, key, value, depth + 1),
                        right.clone(),
                    )
                };
                let hash = Node::compute_branch_hash(&new_left, &new_right);
                Arc::new(Node::Branch {
                    left: new_left,
                    right: new_right,
                    hash,
                    gen: self.gen,
                })
            }
        }
    }

    /// Reads a value. Absent keys are `None`, not an error.
    pub fn at(&self, key: &[u8]) -> Option<Vec<u8>> {
        let path = sha256(key);
        let mut current = &self.root;
        for depth in 0..TREE_HEIGHT {
            match current.as_ref() {
                Node::Empty => return None,
                Node::Leaf {
                    key: leaf_key,
                    value,
                    ..
                } => {
                    return (leaf_key.as_slice() == key).then(|| value.clone());
                }
                Node::Branch { left, right, .. } => {
                    current = if get_bit(&path, depth) { right } else { left };
                }
            }
        }
        match current.as_ref() {
            Node::Leaf {
                key: leaf_key,
                value,
                ..
            } if leaf_key.as_slice() == key => Some(value.clone()),
            _ => None,
        }
    }

    /// Depth-first traversal in canonical trie order (prefix-sorted by
    /// hashed path), yielding `(key, value)` pairs.
    pub fn iter(&self) -> TrieIter {
        TrieIter {
            stack: vec![self.root.clone()],
        }
    }

    /// Flushes every overlay node to the backend as one atomic batch.
    /// After a successful commit, `set_root(root)` on a fresh instance
    /// over the same backend reproduces the contents.
    pub fn commit(&mut self) -> Result<(), StateError> {
        let mut batch = Vec::new();
        Self::collect_overlay(&self.root, self.gen, &mut batch);
        if !batch.is_empty() {
            self.backend.put_batch(&batch)?;
        }
        self.committed_root = self.root();
        self.gen += 1;
        Ok(())
    }

    fn collect_overlay(node: &Arc<Node>, gen: u64, batch: &mut Vec<(Vec<u8>, Vec<u8>)>) {
        if node.gen() != gen {
            return;
        }
        if let Some(repr) = node.to_repr() {
            batch.push((node.hash().as_bytes().to_vec(), repr.encode()));
        }
        if let Node::Branch { left, right, .. } = node.as_ref() {
            Self::collect_overlay(left, gen, batch);
            Self::collect_overlay(right, gen, batch);
        }
    }

    /// Drops the overlay and reloads the last committed root.
    pub fn discard(&mut self) -> Result<(), StateError> {
        let committed = self.committed_root;
        self.set_root(committed)
    }

    /// The root the backend currently holds.
    pub fn committed_root(&self) -> Hash256 {
        self.committed_root
    }
}

/// Iterator over trie contents, depth-first, left child first.
pub struct TrieIter {
    stack: Vec<Arc<Node>>,
}

impl Iterator for TrieIter {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            match node.as_ref() {
                Node::Empty => continue,
                Node::Leaf { key, value, .. } => return Some((key.clone(), value.clone())),
                Node::Branch { left, right, .. } => {
                    self.stack.push(right.clone());
                    self.stack.push(left.clone());
                }
            }
        }
        None
    }
}
