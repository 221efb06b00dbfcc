//! Node identity and signing for audit nodes
//!
//! Every node in the storage network is known by a [`NodeId`] derived from its
//! Dilithium3 public key. The local node holds a [`FullIdentity`] and signs
//! outbound requests with it; remote nodes are represented by
//! [`PeerIdentity`], which can only verify.
//!
//! # Quick Start
//!
//! ```rust
//! use node_identity::FullIdentity;
//!
//! let identity = FullIdentity::generate();
//! let signature = identity.sign(b"authorization").unwrap();
//!
//! assert!(identity.peer().verify(b"authorization", &signature).unwrap());
//! ```

pub mod dilithium;
pub mod error;
pub mod identity;
pub mod traits;

// Re-export commonly used types
pub use dilithium::Dilithium3Signer;
pub use error::{IdentityError, Result};
pub use identity::{FullIdentity, NodeId, PeerIdentity};
pub use traits::Signer;
