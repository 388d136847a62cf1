//! Deterministic in-process beacon for tests.
//!
//! Holds its own BLS keypair and signs any round whose scheduled time has
//! already passed, so the full encrypt/unlock path runs without a network.

use ark_bls12_381::Fr;
use sha2::{Digest, Sha256};

use super::{BeaconError, ChainInfo, RandomnessBeacon, RoundFetch, RoundSignature};
use crate::crypto::{ibe, CipherError};

pub struct TestBeacon {
    sk: Fr,
    chain: ChainInfo,
}

impl TestBeacon {
    /// A 1-second-period chain whose genesis lies 60s in the past, so rounds
    /// around "now" already exist.
    pub fn new(seed: &[u8]) -> Self {
        let genesis = chrono::Utc::now().timestamp() - 60;
        Self::with_chain(seed, genesis, 1)
    }

    pub fn with_chain(seed: &[u8], genesis_time: i64, period_seconds: u64) -> Self {
        let (sk, public_key) = ibe::derive_keypair(seed).expect("test keypair derivation");

        let mut hasher = Sha256::new();
        hasher.update(b"tv-test-chain");
        hasher.update(seed);
        let hash = hex::encode(hasher.finalize());

        Self {
            sk,
            chain: ChainInfo {
                public_key,
                genesis_time,
                period_seconds,
                hash,
            },
        }
    }

    /// Sign a round unconditionally, regardless of its scheduled time. Lets
    /// codec tests mint "already published" rounds directly.
    pub fn sign_round(&self, round: u64) -> Result<Vec<u8>, CipherError> {
        ibe::sign_round(&self.sk, round)
    }
}

impl RandomnessBeacon for TestBeacon {
    fn chain_info(&self) -> &ChainInfo {
        &self.chain
    }

    async fn fetch_round(&self, round: u64) -> Result<RoundFetch, BeaconError> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        if self.chain.time_for_round(round) > now_ms {
            return Ok(RoundFetch::NotYetProduced);
        }

        let signature = self
            .sign_round(round)
            .map_err(|e| BeaconError::InvalidResponse(e.to_string()))?;

        Ok(RoundFetch::Produced(RoundSignature { round, signature }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn produces_past_rounds_and_withholds_future_ones() {
        let beacon = TestBeacon::new(b"beacon-tests");
        let now_ms = chrono::Utc::now().timestamp_millis();

        let current = beacon.chain_info().round_for_time(now_ms);
        assert!(matches!(
            beacon.fetch_round(current.saturating_sub(5)).await.unwrap(),
            RoundFetch::Produced(_)
        ));
        assert!(matches!(
            beacon.fetch_round(current + 3_600).await.unwrap(),
            RoundFetch::NotYetProduced
        ));
    }

    #[tokio::test]
    async fn signatures_verify_against_chain_key() {
        let beacon = TestBeacon::new(b"beacon-tests");
        let sig = beacon.sign_round(9).unwrap();

        assert!(
            ibe::verify_round_signature(&beacon.chain_info().public_key, 9, &sig).unwrap()
        );
    }
}
