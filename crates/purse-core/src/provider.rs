//! Request and response payloads exchanged with a coin provider.
//!
//! Only the shapes live here. Transport is the caller's business; see
//! [`ProviderApi`](crate::traits::ProviderApi).

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::denomination::{Denomination, DenominationSystem};
use crate::error::DenominationError;
use crate::types::{CoinPub, DenominationId};
use purse_crypto::crockford;

/// A provider's published key set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderKeys {
    pub base_url: String,
    pub currency: String,
    pub denominations: Vec<Denomination>,
}

impl ProviderKeys {
    /// Validate the published denominations as a canonical system.
    pub fn system(&self) -> Result<DenominationSystem, DenominationError> {
        let system = DenominationSystem::new(self.denominations.clone())?;
        if system.currency() != self.currency {
            return Err(DenominationError::InvalidDenominationSystem(format!(
                "keys announce {} but denominations are in {}",
                self.currency,
                system.currency()
            )));
        }
        Ok(system)
    }
}

/// Ask the provider to sign one blinded planchet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub denom_id: DenominationId,
    #[serde(with = "crockford::serde_bytes")]
    pub coin_ev: Vec<u8>,
}

/// The provider's signature over a blinded planchet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindSignature {
    #[serde(with = "crockford::serde_bytes")]
    pub blind_sig: Vec<u8>,
}

/// Melt a coin into a refresh session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeltRequest {
    pub coin_pub: CoinPub,
    pub denom_id: DenominationId,
    #[serde(with = "crockford::serde_bytes")]
    pub denom_sig: Vec<u8>,
    #[serde(with = "crockford::serde_bytes")]
    pub session_commitment: Vec<u8>,
    /// Coin signature over the commitment.
    #[serde(with = "crockford::serde_bytes")]
    pub coin_sig: Vec<u8>,
    pub value_with_fee: Amount,
}

/// Which cut-and-choose branch the provider keeps secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeltResponse {
    pub noreveal_index: u8,
}
