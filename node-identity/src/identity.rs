//! Node identities
//!
//! A node id is the hex-encoded SHA3-256 digest of the node's Dilithium3
//! public key, so any peer can check that a public key belongs to the id it
//! claims without a separate certificate authority.

use crate::dilithium::Dilithium3Signer;
use crate::error::{IdentityError, Result};
use crate::traits::Signer;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::fmt;
use std::fs;
use std::path::Path;

/// Identifier of a node in the network
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the id owned by `public_key`
    pub fn from_public_key(public_key: &[u8]) -> Self {
        let digest = Sha3_256::digest(public_key);
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// On-disk format of a full identity
#[derive(Serialize, Deserialize)]
struct IdentityFile {
    node_id: NodeId,
    algorithm: String,
    public_key: String,
    secret_key: String,
}

/// Identity of the local node, able to sign
#[derive(Clone)]
pub struct FullIdentity {
    node_id: NodeId,
    signer: Dilithium3Signer,
}

impl FullIdentity {
    /// Generate a new random identity
    pub fn generate() -> Self {
        let signer = Dilithium3Signer::generate();
        let node_id = NodeId::from_public_key(signer.public_key());

        tracing::info!(node_id = %node_id, "Generated new node identity");

        Self { node_id, signer }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn public_key(&self) -> &[u8] {
        self.signer.public_key()
    }

    /// Public half of this identity
    pub fn peer(&self) -> PeerIdentity {
        PeerIdentity {
            node_id: self.node_id.clone(),
            public_key: self.signer.public_key().to_vec(),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.signer.sign(message)
    }

    /// Load an identity previously written by [`FullIdentity::save`]
    ///
    /// The stored node id must match the stored public key.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        let file: IdentityFile = serde_json::from_str(&raw)?;

        let public_key = hex::decode(&file.public_key)?;
        let secret_key = hex::decode(&file.secret_key)?;
        let signer = Dilithium3Signer::from_bytes(&public_key, &secret_key)?;

        let node_id = NodeId::from_public_key(&public_key);
        if node_id != file.node_id {
            return Err(IdentityError::InvalidKey(format!(
                "identity file claims node id {} but key belongs to {}",
                file.node_id, node_id
            )));
        }

        tracing::debug!(node_id = %node_id, path = %path.as_ref().display(), "Loaded node identity");

        Ok(Self { node_id, signer })
    }

    /// Persist the identity as JSON with hex-encoded keys
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = IdentityFile {
            node_id: self.node_id.clone(),
            algorithm: self.signer.algorithm_name().to_string(),
            public_key: hex::encode(self.signer.public_key()),
            secret_key: hex::encode(self.signer.secret_key()),
        };

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let contents = serde_json::to_vec_pretty(&file)?;

        // Holds the secret key: owner read/write only (600)
        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

            let mut out = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(path.as_ref())?;
            out.write_all(&contents)?;

            // mode() only applies when the file is created
            fs::set_permissions(path.as_ref(), fs::Permissions::from_mode(0o600))?;
        }

        #[cfg(not(unix))]
        fs::write(path.as_ref(), &contents)?;

        Ok(())
    }
}

impl fmt::Debug for FullIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FullIdentity")
            .field("node_id", &self.node_id)
            .finish_non_exhaustive()
    }
}

/// Public identity of a remote node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    pub node_id: NodeId,
    pub public_key: Vec<u8>,
}

impl PeerIdentity {
    /// Build a peer identity, checking the key matches the claimed id
    pub fn new(node_id: NodeId, public_key: Vec<u8>) -> Result<Self> {
        let derived = NodeId::from_public_key(&public_key);
        if derived != node_id {
            return Err(IdentityError::InvalidKey(format!(
                "public key does not belong to node {}",
                node_id
            )));
        }
        Ok(Self { node_id, public_key })
    }

    /// Check a detached signature made by this peer
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<bool> {
        Dilithium3Signer::from_public_key_only(&self.public_key)?.verify(message, signature)
    }
}
