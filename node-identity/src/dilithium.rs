//! Dilithium3 detached signatures
//!
//! Audit nodes sign every outbound piece request and every authorization
//! token they hand to storage nodes. Dilithium3 (NIST FIPS 204, level 3)
//! keeps those credentials verifiable by any peer holding the public key.
//!
//! | Item | Size |
//! |------|------|
//! | Public key | 1,952 bytes |
//! | Secret key | 4,000 bytes |
//! | Signature | 3,293 bytes |

use crate::error::{IdentityError, Result};
use crate::traits::Signer;
use pqcrypto_dilithium::dilithium3;
use pqcrypto_traits::sign::{DetachedSignature, PublicKey, SecretKey};

/// Dilithium3 signer
///
/// # Example
///
/// ```rust
/// use node_identity::dilithium::Dilithium3Signer;
/// use node_identity::traits::Signer;
///
/// let signer = Dilithium3Signer::generate();
///
/// let message = b"piece_id=0xabcd offset=4096 length=1024";
/// let signature = signer.sign(message).unwrap();
///
/// assert!(signer.verify(message, &signature).unwrap());
/// ```
#[derive(Clone)]
pub struct Dilithium3Signer {
    public_key: Vec<u8>,
    secret_key: Vec<u8>,
}

impl Dilithium3Signer {
    /// Generate a fresh keypair
    pub fn generate() -> Self {
        let (pk, sk) = dilithium3::keypair();

        tracing::debug!(
            pk_len = pk.as_bytes().len(),
            sk_len = sk.as_bytes().len(),
            "Generated Dilithium3 keypair"
        );

        Self {
            public_key: pk.as_bytes().to_vec(),
            secret_key: sk.as_bytes().to_vec(),
        }
    }

    /// Restore keypair from bytes
    ///
    /// # Errors
    /// - Returns `InvalidKey` if either key has the wrong length
    pub fn from_bytes(public_key: &[u8], secret_key: &[u8]) -> Result<Self> {
        check_public_key(public_key)?;

        if secret_key.len() != dilithium3::secret_key_bytes() {
            return Err(IdentityError::InvalidKey(format!(
                "secret key length: expected {} bytes, got {}",
                dilithium3::secret_key_bytes(),
                secret_key.len()
            )));
        }

        Ok(Self {
            public_key: public_key.to_vec(),
            secret_key: secret_key.to_vec(),
        })
    }

    /// Create a verification-only signer from a peer's public key
    ///
    /// `sign()` on the returned value fails with `SigningError`.
    pub fn from_public_key_only(public_key: &[u8]) -> Result<Self> {
        check_public_key(public_key)?;

        Ok(Self {
            public_key: public_key.to_vec(),
            secret_key: Vec::new(),
        })
    }

    /// Get secret key bytes (for persistence)
    pub fn secret_key(&self) -> &[u8] {
        &self.secret_key
    }

    /// Whether this signer can produce signatures
    pub fn can_sign(&self) -> bool {
        !self.secret_key.is_empty()
    }
}

fn check_public_key(public_key: &[u8]) -> Result<()> {
    if public_key.len() != dilithium3::public_key_bytes() {
        return Err(IdentityError::InvalidKey(format!(
            "public key length: expected {} bytes, got {}",
            dilithium3::public_key_bytes(),
            public_key.len()
        )));
    }

    dilithium3::PublicKey::from_bytes(public_key)
        .map_err(|e| IdentityError::InvalidKey(format!("malformed public key: {:?}", e)))?;

    Ok(())
}

impl Signer for Dilithium3Signer {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        if self.secret_key.is_empty() {
            return Err(IdentityError::SigningError(
                "verification-only signer has no secret key".to_string(),
            ));
        }

        let sk = dilithium3::SecretKey::from_bytes(&self.secret_key)
            .map_err(|e| IdentityError::SigningError(format!("Failed to parse secret key: {:?}", e)))?;

        let signature = dilithium3::detached_sign(message, &sk);
        Ok(signature.as_bytes().to_vec())
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<bool> {
        let pk = dilithium3::PublicKey::from_bytes(&self.public_key).map_err(|e| {
            IdentityError::VerificationError(format!("Failed to parse public key: {:?}", e))
        })?;

        // A signature of the wrong size can never be valid; treat as a plain mismatch.
        let signature = match dilithium3::DetachedSignature::from_bytes(signature) {
            Ok(sig) => sig,
            Err(_) => return Ok(false),
        };

        match dilithium3::verify_detached_signature(&signature, message, &pk) {
            Ok(()) => Ok(true),
            Err(_) => {
                tracing::debug!(msg_len = message.len(), "Dilithium3 signature rejected");
                Ok(false)
            }
        }
    }

    fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    fn algorithm_name(&self) -> &str {
        "Dilithium3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let signer = Dilithium3Signer::generate();

        assert_eq!(signer.public_key().len(), dilithium3::public_key_bytes());
        assert_eq!(signer.secret_key().len(), dilithium3::secret_key_bytes());
        assert!(signer.can_sign());
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = Dilithium3Signer::generate();

        let message = b"piece fetch: offset=0 length=256";
        let signature = signer.sign(message).unwrap();

        assert!(signer.verify(message, &signature).unwrap());
        assert!(!signer.verify(b"piece fetch: offset=256 length=256", &signature).unwrap());
    }

    #[test]
    fn test_truncated_signature_is_rejected() {
        let signer = Dilithium3Signer::generate();
        let signature = signer.sign(b"msg").unwrap();

        assert!(!signer.verify(b"msg", &signature[..10]).unwrap());
    }

    #[test]
    fn test_verification_only_signer_cannot_sign() {
        let signer = Dilithium3Signer::generate();
        let verifier = Dilithium3Signer::from_public_key_only(signer.public_key()).unwrap();

        assert!(!verifier.can_sign());
        assert!(matches!(
            verifier.sign(b"msg"),
            Err(IdentityError::SigningError(_))
        ));

        let signature = signer.sign(b"msg").unwrap();
        assert!(verifier.verify(b"msg", &signature).unwrap());
    }

    #[test]
    fn test_from_bytes_rejects_wrong_lengths() {
        assert!(Dilithium3Signer::from_bytes(&[0u8; 10], &[0u8; 10]).is_err());
        assert!(Dilithium3Signer::from_public_key_only(&[0u8; 32]).is_err());
    }
}
