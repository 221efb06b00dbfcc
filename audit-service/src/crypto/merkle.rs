//! piece 級默克爾樹
//!
//! 寫入段時，每個 piece 按條帶切成等長的 erasure share，
//! 每個 share 是一個葉子，樹根記錄在段元數據的 `PieceRef::piece_root` 中。
//! 審計時存儲節點返回被挑戰條帶的 share 和對應的默克爾證明，
//! 審計員無需下載整個 piece 即可確認數據未被篡改。
//!
//! # 哈希規則
//!
//! - 葉子: `SHA3-256(0x00 || share)`
//! - 內部節點: `SHA3-256(0x01 || left || right)`
//! - 奇數層的最後一個節點與自身配對
//!
//! 前綴確保葉子哈希與內部節點哈希不會互相碰撞。

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

const LEAF_PREFIX: [u8; 1] = [0];
const INNER_PREFIX: [u8; 1] = [1];

/// 默克爾根類型別名
pub type MerkleRoot = [u8; 32];

/// 默克爾證明路徑
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MerkleProof {
    /// 從葉子到根的兄弟節點哈希，`path[0]` 是葉子的兄弟
    pub path: Vec<[u8; 32]>,

    /// 葉子索引（即條帶索引），第 i 位決定第 i 層的左右位置
    pub leaf_index: u64,
}

impl MerkleProof {
    pub fn new(path: Vec<[u8; 32]>, leaf_index: u64) -> Self {
        Self { path, leaf_index }
    }

    /// 驗證葉子數據屬於以 `root` 為根的樹
    ///
    /// ```
    /// use audit_service::crypto::merkle::{hash_leaf, hash_node, MerkleProof};
    ///
    /// let l0 = hash_leaf(b"share0");
    /// let l1 = hash_leaf(b"share1");
    /// let root = hash_node(&l0, &l1);
    ///
    /// let proof = MerkleProof::new(vec![l1], 0);
    /// assert!(proof.verify(b"share0", &root));
    /// assert!(!proof.verify(b"tampered", &root));
    /// ```
    pub fn verify(&self, leaf_data: &[u8], root: &MerkleRoot) -> bool {
        let mut current_hash = hash_leaf(leaf_data);
        let mut index = self.leaf_index;

        for sibling in &self.path {
            if index & 1 == 0 {
                current_hash = hash_node(&current_hash, sibling);
            } else {
                current_hash = hash_node(sibling, &current_hash);
            }
            index >>= 1;
        }

        &current_hash == root
    }

    /// 證明深度（樹高）
    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

/// `H(0x01 || left || right)`
pub fn hash_node(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(INNER_PREFIX);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// `H(0x00 || data)`
pub fn hash_leaf(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(LEAF_PREFIX);
    hasher.update(data);
    hasher.finalize().into()
}

/// 默克爾樹相關錯誤
#[derive(Debug, thiserror::Error)]
pub enum MerkleError {
    #[error("Cannot build tree from empty data")]
    EmptyData,

    #[error("Invalid leaf index: {index} (total leaves: {total})")]
    InvalidLeafIndex { index: usize, total: usize },
}

/// 完整的默克爾樹
///
/// 存儲端用它為每個 piece 生成根和證明；審計端只需要 [`MerkleProof::verify`]。
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// layers[0] = 葉子層, 最後一層 = 根
    layers: Vec<Vec<[u8; 32]>>,
}

impl MerkleTree {
    /// 把 piece 按 `share_size` 切分後構建
    pub fn from_piece(piece: &[u8], share_size: usize) -> Result<Self, MerkleError> {
        if piece.is_empty() || share_size == 0 {
            return Err(MerkleError::EmptyData);
        }
        Self::from_leaves(piece.chunks(share_size))
    }

    /// 從葉子數據構建
    pub fn from_leaves<'a, I>(leaves: I) -> Result<Self, MerkleError>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut current: Vec<[u8; 32]> = leaves.into_iter().map(hash_leaf).collect();
        if current.is_empty() {
            return Err(MerkleError::EmptyData);
        }

        let mut layers = vec![current.clone()];
        while current.len() > 1 {
            current = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_node(left, right),
                    [single] => hash_node(single, single),
                    _ => unreachable!("chunks(2) yields one or two nodes"),
                })
                .collect();
            layers.push(current.clone());
        }

        Ok(Self { layers })
    }

    pub fn root(&self) -> MerkleRoot {
        self.layers[self.layers.len() - 1][0]
    }

    pub fn leaf_count(&self) -> usize {
        self.layers[0].len()
    }

    /// 生成指定葉子的證明
    pub fn generate_proof(&self, leaf_index: usize) -> Result<MerkleProof, MerkleError> {
        if leaf_index >= self.leaf_count() {
            return Err(MerkleError::InvalidLeafIndex {
                index: leaf_index,
                total: self.leaf_count(),
            });
        }

        let mut path = Vec::with_capacity(self.layers.len() - 1);
        let mut index = leaf_index;

        for layer in &self.layers[..self.layers.len() - 1] {
            let sibling = index ^ 1;
            // 奇數層的最後一個節點與自身配對
            path.push(*layer.get(sibling).unwrap_or(&layer[index]));
            index /= 2;
        }

        Ok(MerkleProof::new(path, leaf_index as u64))
    }
}
