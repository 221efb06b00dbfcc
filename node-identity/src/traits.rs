/// Unified interface for detached signatures
use crate::error::Result;

/// Signer trait
pub trait Signer {
    /// Sign message, returning a detached signature
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;

    /// Verify a detached signature
    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<bool>;

    /// Get public key
    fn public_key(&self) -> &[u8];

    /// Algorithm name
    fn algorithm_name(&self) -> &str;
}
