//! Coin records, lifecycle states and identifiers.

use std::fmt;
use std::str::FromStr;

use purse_crypto::{crockford, BlindingKey, CoinSecret, CryptoError, PlanchetSecrets, SessionSeed};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::LifecycleError;

macro_rules! public_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&crockford::encode(&self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = CryptoError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                crockford::decode_array::<32>(s).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let text = String::deserialize(d)?;
                text.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

public_id!(
    /// BLAKE3 hash of a denomination's public key.
    DenominationId
);
public_id!(
    /// Ed25519 public key of a coin.
    CoinPub
);
public_id!(
    /// Identifier of a refresh session.
    SessionId
);

/// Lifecycle state of a coin.
///
/// `Derived -> Withdrawn -> Spent`. `Spent` is terminal; a melted coin is
/// `Spent` and its children start over at `Derived`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoinState {
    /// Key material exists, no provider signature yet.
    Derived,
    /// Signed by the provider and available for spending.
    Withdrawn,
    /// Spent or melted.
    Spent,
}

impl CoinState {
    /// Validate a transition to `to`.
    pub fn transition(self, to: CoinState) -> Result<CoinState, LifecycleError> {
        match (self, to) {
            (CoinState::Derived, CoinState::Withdrawn) | (CoinState::Withdrawn, CoinState::Spent) => Ok(to),
            (from, to) => Err(LifecycleError::InvalidTransition { from, to }),
        }
    }
}

impl fmt::Display for CoinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CoinState::Derived => "derived",
            CoinState::Withdrawn => "withdrawn",
            CoinState::Spent => "spent",
        };
        f.write_str(s)
    }
}

/// Where a coin's key material came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoinSource {
    Withdraw { index: u32 },
    Refresh { session_id: SessionId, index: u32 },
}

/// One coin, including its private key.
///
/// Not `Clone`: the private key has exactly one owner. Read paths get a
/// [`CoinSummary`] instead.
#[derive(Debug, Serialize, Deserialize)]
pub struct CoinRecord {
    pub coin_pub: CoinPub,
    coin_priv: CoinSecret,
    pub blinding_key: BlindingKey,
    pub denom_id: DenominationId,
    pub state: CoinState,
    pub source: CoinSource,
    /// Unblinded provider signature, present once withdrawn.
    #[serde(default, with = "opt_crockford")]
    pub denom_sig: Option<Vec<u8>>,
}

impl CoinRecord {
    /// A fresh coin in state `Derived`.
    pub fn derived(planchet: PlanchetSecrets, denom_id: DenominationId, source: CoinSource) -> Self {
        let PlanchetSecrets { coin_priv, coin_pub, blinding_key } = planchet;
        Self {
            coin_pub: CoinPub(coin_pub),
            coin_priv,
            blinding_key,
            denom_id,
            state: CoinState::Derived,
            source,
            denom_sig: None,
        }
    }

    pub fn secret(&self) -> &CoinSecret {
        &self.coin_priv
    }

    /// Move to `to`, rejecting anything but the forward transitions.
    pub fn transition(&mut self, to: CoinState) -> Result<(), LifecycleError> {
        self.state = self.state.transition(to)?;
        Ok(())
    }

    pub fn summary(&self) -> CoinSummary {
        CoinSummary {
            coin_pub: self.coin_pub,
            denom_id: self.denom_id,
            state: self.state,
            source: self.source,
        }
    }
}

/// Secret-free view of a coin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinSummary {
    pub coin_pub: CoinPub,
    pub denom_id: DenominationId,
    pub state: CoinState,
    pub source: CoinSource,
}

/// A recorded melt of one coin into fresh children.
///
/// The session seed is derived from the melted coin's key and the salt,
/// and is stored so that children can be re-derived after a crash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshSession {
    pub session_id: SessionId,
    pub source_coin: CoinPub,
    pub source_denom: DenominationId,
    #[serde(with = "crockford::serde_array")]
    pub salt: [u8; 32],
    pub session_seed: SessionSeed,
    pub kappa: u8,
    /// Hash over the transfer public keys of every cut-and-choose branch.
    #[serde(with = "crockford::serde_bytes")]
    pub commitment: Vec<u8>,
    /// Denomination of each child, in child index order.
    pub new_denoms: Vec<DenominationId>,
}

mod opt_crockford {
    use purse_crypto::crockford;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(bytes) => s.serialize_some(&crockford::encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let text: Option<String> = Option::deserialize(d)?;
        text.map(|t| crockford::decode(&t).map_err(serde::de::Error::custom))
            .transpose()
    }
}
