//! In-memory collaborators for audit service integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use audit_service::crypto::MerkleTree;
use audit_service::error::{AuditError, FetchError, Result};
use audit_service::pointerdb::PointerDirectory;
use audit_service::statdb::StatDb;
use audit_service::transport::PieceTransport;
use audit_service::types::{
    BatchResult, ErasureScheme, NodeUpdate, PieceRef, PieceRequest, PieceResponse,
};
use audit_service::{AuditConfig, AuthorizationToken, Collaborators, NodeId, Segment};
use node_identity::FullIdentity;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A segment plus the piece bytes each node is supposed to hold
pub struct Fixture {
    pub segment: Segment,
    pub pieces: HashMap<NodeId, Vec<u8>>,
}

/// Build a segment whose piece `i` lives on `nodes[i]`
pub fn fixture(path: &str, nodes: &[&str], stripe_size: u64, required: u16, size: u64) -> Fixture {
    let erasure = ErasureScheme {
        stripe_size,
        required,
        total: (nodes.len() as u16).max(required),
    };
    let share_size = erasure.share_size();
    let piece_len = (erasure.stripe_count(size) * share_size) as usize;

    let mut refs = Vec::with_capacity(nodes.len());
    let mut pieces = HashMap::new();

    for (num, node) in nodes.iter().enumerate() {
        let data: Vec<u8> = (0..piece_len)
            .map(|i| (i as u8).wrapping_mul(31).wrapping_add(num as u8 * 7 + 1))
            .collect();
        let tree = MerkleTree::from_piece(&data, share_size as usize).unwrap();

        let node_id = NodeId::new(*node);
        refs.push(PieceRef {
            node_id: node_id.clone(),
            piece_num: num as u16,
            piece_root: hex::encode(tree.root()),
        });
        pieces.insert(node_id, data);
    }

    Fixture {
        segment: Segment {
            path: path.to_string(),
            piece_id: format!("{}-root", path),
            size,
            erasure,
            pieces: refs,
        },
        pieces,
    }
}

/// Config tuned for fast tests
pub fn test_config() -> AuditConfig {
    AuditConfig {
        node_timeout_secs: 1,
        retry_initial_delay_ms: 1,
        retry_max_delay_ms: 5,
        ..AuditConfig::default()
    }
}

pub fn identity() -> Arc<FullIdentity> {
    Arc::new(FullIdentity::generate())
}

// ============ Pointer directory ============

pub struct MemoryPointerDirectory {
    segments: Mutex<Vec<Segment>>,
    identity: Arc<FullIdentity>,
    unreachable: AtomicBool,
    calls: AtomicUsize,
}

impl MemoryPointerDirectory {
    pub fn new(identity: Arc<FullIdentity>, segments: Vec<Segment>) -> Arc<Self> {
        Arc::new(Self {
            segments: Mutex::new(segments),
            identity,
            unreachable: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PointerDirectory for MemoryPointerDirectory {
    async fn random_segment(&self) -> Result<Segment> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.unreachable.load(Ordering::SeqCst) {
            return Err(AuditError::DirectoryUnreachable("connection refused".to_string()));
        }

        let segments = self.segments.lock().unwrap();
        if segments.is_empty() {
            return Err(AuditError::NoSegmentsAvailable);
        }
        let index = rand::thread_rng().gen_range(0..segments.len());
        Ok(segments[index].clone())
    }

    async fn signed_message(&self) -> Result<AuthorizationToken> {
        AuthorizationToken::issue(&self.identity, Duration::from_secs(60))
    }
}

// ============ Storage nodes ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeBehavior {
    /// Serve the stored piece with a valid proof
    Honest,
    /// Refuse connections
    Offline,
    /// Never answer
    Hang,
    /// Reject the auditor's authorization
    RejectAuth,
    /// Flip a bit in the returned share
    Corrupt,
    /// Return an unparseable response
    Garbage,
}

pub struct FakeStorageNodes {
    pieces: HashMap<NodeId, Vec<u8>>,
    behaviors: Mutex<HashMap<NodeId, NodeBehavior>>,
    requests: Mutex<Vec<(NodeId, PieceRequest)>>,
}

impl FakeStorageNodes {
    pub fn new(pieces: HashMap<NodeId, Vec<u8>>) -> Arc<Self> {
        Arc::new(Self {
            pieces,
            behaviors: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn set(&self, node: &str, behavior: NodeBehavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(NodeId::new(node), behavior);
    }

    pub fn requests(&self) -> Vec<(NodeId, PieceRequest)> {
        self.requests.lock().unwrap().clone()
    }

    fn behavior(&self, node_id: &NodeId) -> NodeBehavior {
        self.behaviors
            .lock()
            .unwrap()
            .get(node_id)
            .copied()
            .unwrap_or(NodeBehavior::Honest)
    }

    fn serve(&self, node_id: &NodeId, request: &PieceRequest) -> std::result::Result<PieceResponse, FetchError> {
        let token = &request.authorization;
        if token.is_expired() || !token.verify().unwrap_or(false) {
            return Err(FetchError::AuthRejected("invalid token".to_string()));
        }

        let piece = self
            .pieces
            .get(node_id)
            .ok_or_else(|| FetchError::CorruptResponse("piece not found".to_string()))?;

        let start = request.offset as usize;
        let end = start + request.length as usize;
        if request.length == 0 || end > piece.len() {
            return Err(FetchError::CorruptResponse("range out of bounds".to_string()));
        }

        let tree = MerkleTree::from_piece(piece, request.length as usize)
            .map_err(|e| FetchError::CorruptResponse(e.to_string()))?;
        let proof = tree
            .generate_proof(start / request.length as usize)
            .map_err(|e| FetchError::CorruptResponse(e.to_string()))?;

        Ok(PieceResponse {
            data: piece[start..end].to_vec(),
            proof,
        })
    }
}

#[async_trait]
impl PieceTransport for FakeStorageNodes {
    async fn fetch_piece(
        &self,
        node_id: &NodeId,
        request: &PieceRequest,
    ) -> std::result::Result<PieceResponse, FetchError> {
        self.requests
            .lock()
            .unwrap()
            .push((node_id.clone(), request.clone()));

        match self.behavior(node_id) {
            NodeBehavior::Honest => self.serve(node_id, request),
            NodeBehavior::Offline => Err(FetchError::Offline("connection refused".to_string())),
            NodeBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(FetchError::Offline("hung".to_string()))
            }
            NodeBehavior::RejectAuth => Err(FetchError::AuthRejected("HTTP 403".to_string())),
            NodeBehavior::Corrupt => {
                let mut response = self.serve(node_id, request)?;
                response.data[0] ^= 0x80;
                Ok(response)
            }
            NodeBehavior::Garbage => Err(FetchError::CorruptResponse("malformed body".to_string())),
        }
    }
}

// ============ Statdb ============

pub struct ScriptedStatDb {
    healthy: bool,
    replies: Mutex<VecDeque<Result<BatchResult>>>,
    batches: Mutex<Vec<Vec<NodeUpdate>>>,
}

impl ScriptedStatDb {
    /// Replies are consumed in order; once exhausted every batch succeeds
    pub fn new(replies: Vec<Result<BatchResult>>) -> Arc<Self> {
        Arc::new(Self {
            healthy: true,
            replies: Mutex::new(replies.into()),
            batches: Mutex::new(Vec::new()),
        })
    }

    pub fn healthy() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn unhealthy() -> Arc<Self> {
        Arc::new(Self {
            healthy: false,
            replies: Mutex::new(VecDeque::new()),
            batches: Mutex::new(Vec::new()),
        })
    }

    pub fn round_trips(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub fn batches(&self) -> Vec<Vec<NodeUpdate>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatDb for ScriptedStatDb {
    async fn health_check(&self) -> Result<()> {
        if self.healthy {
            Ok(())
        } else {
            Err(AuditError::StatDbUnreachable("connection refused".to_string()))
        }
    }

    async fn update_batch(&self, updates: &[NodeUpdate]) -> Result<BatchResult> {
        self.batches.lock().unwrap().push(updates.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(BatchResult::default()))
    }
}

pub fn failed(ids: &[&str]) -> Result<BatchResult> {
    Ok(BatchResult {
        failed: ids.iter().map(|id| NodeId::new(*id)).collect(),
    })
}

pub fn unreachable() -> Result<BatchResult> {
    Err(AuditError::StatDbUnreachable("HTTP 503".to_string()))
}

pub fn collaborators(
    pointers: Arc<MemoryPointerDirectory>,
    nodes: Arc<FakeStorageNodes>,
    statdb: Arc<ScriptedStatDb>,
) -> Collaborators {
    Collaborators {
        pointers,
        transport: nodes,
        statdb,
    }
}
