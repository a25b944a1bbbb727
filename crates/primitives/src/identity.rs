use core::ops::Deref;

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

/// An ed25519 private key, also the node's long-lived identity.
#[derive(Copy, Clone, Serialize, Deserialize)]
pub struct PrivateKey([u8; 32]);

/// An ed25519 public key, derived from a [`PrivateKey`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct PublicKey([u8; 32]);

impl core::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PublicKey({})", self)
    }
}

impl core::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl PrivateKey {
    #[cfg(feature = "rand")]
    #[must_use]
    pub fn random(csprng: &mut impl rand::RngCore) -> Self {
        let signing_key = SigningKey::generate(csprng);
        Self(signing_key.to_bytes())
    }

    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        let signing_key = SigningKey::from_bytes(&self.0);
        PublicKey(signing_key.verifying_key().to_bytes())
    }

    #[must_use]
    pub fn sign(&self, payload: &[u8]) -> [u8; 64] {
        let signing_key = SigningKey::from_bytes(&self.0);
        signing_key.sign(payload).to_bytes()
    }
}

impl Deref for PrivateKey {
    type Target = [u8; 32];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; 32]> for PrivateKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl PublicKey {
    #[must_use]
    pub fn verify(&self, payload: &[u8], signature: &[u8; 64]) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let signature = ed25519_dalek::Signature::from_bytes(signature);
        verifying_key.verify(payload, &signature).is_ok()
    }
}

impl Deref for PublicKey {
    type Target = [u8; 32];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; 32]> for PublicKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}
