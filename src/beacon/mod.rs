//! Randomness beacon adapter.
//!
//! The beacon is the time oracle: round numbers map to wall-clock instants
//! through the chain parameters, and a round's published BLS signature is the
//! decryption key material for anything encrypted to that round.

pub mod http;
pub mod testing;

pub use http::HttpBeaconClient;

use thiserror::Error;

/// Cached chain parameters. `round_for_time` / `time_for_round` are pure
/// functions of these; no network call is needed once they are known.
#[derive(Debug, Clone)]
pub struct ChainInfo {
    /// Compressed G2 public key of the chain.
    pub public_key: Vec<u8>,
    /// Unix seconds of round 1.
    pub genesis_time: i64,
    pub period_seconds: u64,
    /// Hex chain hash identifying the beacon network.
    pub hash: String,
}

impl ChainInfo {
    /// Smallest round whose scheduled production time is at or after the
    /// given instant, so content encrypted to it is never decryptable early.
    /// Clamps to round 1 for anything at or before genesis.
    pub fn round_for_time(&self, unix_ms: i64) -> u64 {
        let genesis_ms = self.genesis_time * 1000;
        if unix_ms <= genesis_ms {
            return 1;
        }
        let period_ms = self.period_seconds * 1000;
        ((unix_ms - genesis_ms) as u64).div_ceil(period_ms) + 1
    }

    /// Scheduled production instant of a round, in ms epoch. An estimate:
    /// the beacon may lag its schedule, which is why decryptability is only
    /// ever confirmed by actually fetching the round.
    pub fn time_for_round(&self, round: u64) -> i64 {
        self.genesis_time * 1000 + (round.saturating_sub(1) * self.period_seconds * 1000) as i64
    }
}

/// A round value fetched from the beacon.
#[derive(Debug, Clone)]
pub struct RoundSignature {
    pub round: u64,
    pub signature: Vec<u8>,
}

/// Outcome of asking for a round: either it has been produced or it simply
/// does not exist yet. The latter is a normal answer, not an error.
#[derive(Debug, Clone)]
pub enum RoundFetch {
    Produced(RoundSignature),
    NotYetProduced,
}

#[derive(Debug, Error)]
pub enum BeaconError {
    /// Transient: network failure, timeout, upstream 5xx. Callers must not
    /// mutate any stored state on this.
    #[error("beacon unreachable: {0}")]
    Unreachable(String),

    /// The beacon answered but the payload is unusable (bad encoding or a
    /// signature that does not verify against the chain key).
    #[error("invalid beacon response: {0}")]
    InvalidResponse(String),
}

/// The oracle contract the lifecycle manager consumes.
#[allow(async_fn_in_trait)]
pub trait RandomnessBeacon: Send + Sync + 'static {
    fn chain_info(&self) -> &ChainInfo;

    /// Fetch one round's signature. `NotYetProduced` is a distinguishable,
    /// non-fatal outcome; errors are reserved for the beacon being broken or
    /// unreachable.
    async fn fetch_round(&self, round: u64) -> Result<RoundFetch, BeaconError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> ChainInfo {
        ChainInfo {
            public_key: vec![],
            genesis_time: 1_000,
            period_seconds: 3,
            hash: "00".repeat(32),
        }
    }

    #[test]
    fn round_mapping_is_monotonic_and_clamped() {
        let chain = chain();

        assert_eq!(chain.round_for_time(0), 1);
        assert_eq!(chain.round_for_time(1_000_000), 1);
        assert_eq!(chain.round_for_time(1_000_000 + 1), 2);
        assert_eq!(chain.round_for_time(1_000_000 + 2_999), 2);
        assert_eq!(chain.round_for_time(1_000_000 + 3_000), 2);
        assert_eq!(chain.round_for_time(1_000_000 + 3_001), 3);
        assert_eq!(chain.round_for_time(1_000_000 + 30_000), 11);
    }

    #[test]
    fn chosen_round_is_never_scheduled_before_the_target() {
        let chain = chain();

        for target in [
            1_000_001,
            1_000_000 + 2_999,
            1_000_000 + 3_000,
            1_000_000 + 3_001,
            1_000_000 + 86_399_999,
        ] {
            let round = chain.round_for_time(target);
            assert!(
                chain.time_for_round(round) >= target,
                "round {round} is scheduled at {} which precedes the target {target}",
                chain.time_for_round(round)
            );
        }
    }

    #[test]
    fn time_for_round_inverts_round_for_time() {
        let chain = chain();

        assert_eq!(chain.time_for_round(1), 1_000_000);
        assert_eq!(chain.time_for_round(11), 1_030_000);

        for round in [1u64, 2, 50, 1_000] {
            let t = chain.time_for_round(round);
            assert_eq!(chain.round_for_time(t), round);
        }
    }
}
