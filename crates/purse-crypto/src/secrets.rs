//! Zeroizing newtypes for secret key material.
//!
//! All secret types redact their contents in `Debug`, compare in constant
//! time and wipe memory on drop. [`CoinSecret`] is not `Clone`; a coin's private key has exactly
//! one owner.

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crockford;
use crate::error::CryptoError;

macro_rules! secret_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Zeroize, ZeroizeOnDrop)]
        pub struct $name([u8; $len]);

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.0.ct_eq(&other.0).into()
            }
        }

        impl Eq for $name {}

        impl $name {
            pub const LEN: usize = $len;

            pub fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
                let arr: [u8; $len] = bytes
                    .try_into()
                    .map_err(|_| CryptoError::InvalidLength { expected: $len, got: bytes.len() })?;
                Ok(Self(arr))
            }

            /// Fresh key material from the OS RNG.
            pub fn random() -> Self {
                let mut bytes = [0u8; $len];
                rand::rngs::OsRng.fill_bytes(&mut bytes);
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_crockford(&self) -> String {
                crockford::encode(&self.0)
            }

            pub fn from_crockford(text: &str) -> Result<Self, CryptoError> {
                crockford::decode_array::<$len>(text).map(Self)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&"[REDACTED]").finish()
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_str(&self.to_crockford())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let text = String::deserialize(d)?;
                Self::from_crockford(&text).map_err(serde::de::Error::custom)
            }
        }
    };
}

secret_bytes!(
    /// One share of a policy key, held in escrow by a single provider.
    KeyShare,
    32
);
secret_bytes!(
    /// Key protecting a policy's copy of the master key.
    PolicyKey,
    64
);
secret_bytes!(
    /// Key seed used to encrypt a truth at its provider.
    TruthKey,
    64
);
secret_bytes!(
    /// Blinding factor applied to a planchet before withdrawal or refresh.
    BlindingKey,
    32
);
secret_bytes!(
    /// Random key that encrypts the core secret once per recovery document.
    MasterKey,
    64
);
secret_bytes!(
    /// Seed of a refresh session. Every child planchet and transfer secret
    /// of the session derives from it.
    SessionSeed,
    64
);

/// Private key of a single coin.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct CoinSecret {
    bytes: [u8; 32],
}

impl PartialEq for CoinSecret {
    fn eq(&self, other: &Self) -> bool {
        self.bytes.ct_eq(&other.bytes).into()
    }
}

impl Eq for CoinSecret {}

impl CoinSecret {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Ed25519 public key for this secret.
    pub fn public_key(&self) -> [u8; 32] {
        ed25519_dalek::SigningKey::from_bytes(&self.bytes)
            .verifying_key()
            .to_bytes()
    }

    /// Sign `msg` with the coin key.
    pub fn sign(&self, msg: &[u8]) -> [u8; 64] {
        use ed25519_dalek::Signer;
        ed25519_dalek::SigningKey::from_bytes(&self.bytes)
            .sign(msg)
            .to_bytes()
    }
}

impl Serialize for CoinSecret {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&crockford::encode(&self.bytes))
    }
}

impl<'de> Deserialize<'de> for CoinSecret {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let text = String::deserialize(d)?;
        crockford::decode_array::<32>(&text)
            .map(Self::from_bytes)
            .map_err(serde::de::Error::custom)
    }
}

impl fmt::Debug for CoinSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoinSecret")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
