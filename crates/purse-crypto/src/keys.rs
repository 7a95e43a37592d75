//! Identity keys and coin planchet derivation.
//!
//! A user identifier is an Argon2id stretch of the user's canonicalized
//! identity attributes, salted per provider. The account key pair used to
//! sign policy uploads is derived from it with the KDF. Coin key material
//! is derived from a wallet seed and a coin index so that a crashed
//! withdrawal or refresh can be replayed to the same coins.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::canonical::canonical_json;
use crate::crockford;
use crate::error::CryptoError;
use crate::kdf::{kdf_array, stretch};
use crate::secrets::{BlindingKey, CoinSecret};

const ACCOUNT_KEY_INFO: &[u8] = b"ver";
const WITHDRAW_INFO: &[u8] = b"taler-withdrawal-coin-derivation";
const REFRESH_INFO: &[u8] = b"taler-coin-derivation";
const TRANSFER_INFO: &[u8] = b"taler-transfer-pub-derivation";

/// 64-byte identifier of a user at one provider.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserIdentifier([u8; 64]);

impl UserIdentifier {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Display for UserIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crockford::encode(&self.0))
    }
}

impl fmt::Debug for UserIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserIdentifier({self})")
    }
}

impl FromStr for UserIdentifier {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crockford::decode_array::<64>(s).map(Self)
    }
}

impl Serialize for UserIdentifier {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UserIdentifier {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let text = String::deserialize(d)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Derive the user identifier for `id_attributes` at a provider with
/// the given (decoded) server salt.
pub fn user_identifier_derive(id_attributes: &Value, server_salt: &[u8]) -> Result<UserIdentifier, CryptoError> {
    let canon = canonical_json(id_attributes);
    stretch(canon.as_bytes(), server_salt).map(UserIdentifier)
}

/// Ed25519 key pair that authenticates a user's uploads to a provider.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccountKeyPair {
    priv_key: [u8; 32],
    #[zeroize(skip)]
    pub_key: [u8; 32],
}

impl AccountKeyPair {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let pub_key = SigningKey::from_bytes(&seed).verifying_key().to_bytes();
        Self { priv_key: seed, pub_key }
    }

    pub fn private_bytes(&self) -> &[u8; 32] {
        &self.priv_key
    }

    pub fn public_bytes(&self) -> &[u8; 32] {
        &self.pub_key
    }

    pub fn public_crockford(&self) -> String {
        crockford::encode(&self.pub_key)
    }

    pub fn sign(&self, msg: &[u8]) -> [u8; 64] {
        SigningKey::from_bytes(&self.priv_key).sign(msg).to_bytes()
    }
}

impl fmt::Debug for AccountKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountKeyPair")
            .field("pub", &self.public_crockford())
            .field("priv", &"[REDACTED]")
            .finish()
    }
}

/// Check an Ed25519 signature made by an account or coin key.
pub fn verify_signature(pub_key: &[u8; 32], msg: &[u8], sig: &[u8; 64]) -> Result<(), CryptoError> {
    let vk = VerifyingKey::from_bytes(pub_key).map_err(|_| CryptoError::CryptographicMismatch)?;
    vk.verify(msg, &Signature::from_bytes(sig))
        .map_err(|_| CryptoError::CryptographicMismatch)
}

/// Derive the account key pair belonging to `user_id`.
pub fn account_keypair_derive(user_id: &UserIdentifier) -> Result<AccountKeyPair, CryptoError> {
    let seed: [u8; 32] = kdf_array(user_id.as_bytes(), &[], ACCOUNT_KEY_INFO)?;
    Ok(AccountKeyPair::from_seed(seed))
}

/// Secrets behind one planchet: the future coin's key pair and the
/// blinding factor that hides it from the signer.
#[derive(Debug)]
pub struct PlanchetSecrets {
    pub coin_priv: CoinSecret,
    pub coin_pub: [u8; 32],
    pub blinding_key: BlindingKey,
}

impl PlanchetSecrets {
    fn from_okm(okm: [u8; 64]) -> Self {
        let mut priv_bytes = [0u8; 32];
        let mut bks = [0u8; 32];
        priv_bytes.copy_from_slice(&okm[..32]);
        bks.copy_from_slice(&okm[32..]);
        let coin_priv = CoinSecret::from_bytes(priv_bytes);
        priv_bytes.zeroize();
        let coin_pub = coin_priv.public_key();
        Self { coin_priv, coin_pub, blinding_key: BlindingKey::from_bytes(bks) }
    }
}

/// Planchet number `index` of a withdrawal seeded by `seed`.
pub fn derive_withdraw_planchet(seed: &[u8], index: u32) -> Result<PlanchetSecrets, CryptoError> {
    kdf_array::<64>(seed, &index.to_be_bytes(), WITHDRAW_INFO).map(PlanchetSecrets::from_okm)
}

/// Planchet number `index` of a refresh session seeded by `session_seed`.
pub fn derive_refresh_planchet(session_seed: &[u8], index: u32) -> Result<PlanchetSecrets, CryptoError> {
    kdf_array::<64>(session_seed, &index.to_be_bytes(), REFRESH_INFO).map(PlanchetSecrets::from_okm)
}

/// Transfer secret for cut-and-choose branch `index` of a refresh session.
pub fn derive_transfer_secret(session_seed: &[u8], index: u32) -> Result<[u8; 32], CryptoError> {
    kdf_array(session_seed, &index.to_be_bytes(), TRANSFER_INFO)
}
