//! 密碼學模塊
//!
//! - 默克爾證明：校驗存儲節點返回的 erasure share

pub mod merkle;

pub use merkle::{hash_leaf, hash_node, MerkleError, MerkleProof, MerkleRoot, MerkleTree};
