//! HTTP client for a drand-style beacon.
//!
//! Chain parameters are fetched once at construction and cached; round
//! lookups hit `GET /{chain_hash}/public/{round}` and verify the returned
//! signature against the chain key before handing it to the cipher.

use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{BeaconError, ChainInfo, RandomnessBeacon, RoundFetch, RoundSignature};
use crate::crypto::ibe;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct InfoResponse {
    public_key: String,
    period: u64,
    genesis_time: i64,
    hash: String,
}

#[derive(Debug, Deserialize)]
struct RoundResponse {
    round: u64,
    signature: String,
}

pub struct HttpBeaconClient {
    http: reqwest::Client,
    base_url: String,
    chain: ChainInfo,
}

impl HttpBeaconClient {
    /// Fetch and cache the chain info for `chain_hash`.
    pub async fn connect(base_url: &str, chain_hash: &str) -> Result<Self, BeaconError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BeaconError::Unreachable(format!("client init: {e}")))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        let url = format!("{base_url}/{chain_hash}/info");

        let info: InfoResponse = http
            .get(&url)
            .send()
            .await
            .map_err(|e| BeaconError::Unreachable(e.to_string()))?
            .error_for_status()
            .map_err(|e| BeaconError::Unreachable(e.to_string()))?
            .json()
            .await
            .map_err(|e| BeaconError::InvalidResponse(format!("chain info: {e}")))?;

        if info.hash != chain_hash {
            return Err(BeaconError::InvalidResponse(format!(
                "chain hash mismatch: expected {chain_hash}, got {}",
                info.hash
            )));
        }

        let public_key = hex::decode(&info.public_key)
            .map_err(|e| BeaconError::InvalidResponse(format!("public key hex: {e}")))?;

        debug!(
            chain = %info.hash,
            period = info.period,
            genesis = info.genesis_time,
            "connected to randomness beacon"
        );

        Ok(Self {
            http,
            base_url,
            chain: ChainInfo {
                public_key,
                genesis_time: info.genesis_time,
                period_seconds: info.period,
                hash: info.hash,
            },
        })
    }
}

impl RandomnessBeacon for HttpBeaconClient {
    fn chain_info(&self) -> &ChainInfo {
        &self.chain
    }

    async fn fetch_round(&self, round: u64) -> Result<RoundFetch, BeaconError> {
        let url = format!("{}/{}/public/{round}", self.base_url, self.chain.hash);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| BeaconError::Unreachable(e.to_string()))?;

        // drand answers 404 for rounds that have not been produced yet.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(RoundFetch::NotYetProduced);
        }

        let response = response
            .error_for_status()
            .map_err(|e| BeaconError::Unreachable(e.to_string()))?;

        let body: RoundResponse = response
            .json()
            .await
            .map_err(|e| BeaconError::InvalidResponse(format!("round payload: {e}")))?;

        if body.round != round {
            return Err(BeaconError::InvalidResponse(format!(
                "asked for round {round}, got {}",
                body.round
            )));
        }

        let signature = hex::decode(&body.signature)
            .map_err(|e| BeaconError::InvalidResponse(format!("signature hex: {e}")))?;

        let valid = ibe::verify_round_signature(&self.chain.public_key, round, &signature)
            .map_err(|e| BeaconError::InvalidResponse(format!("signature check: {e}")))?;
        if !valid {
            warn!(round, "beacon returned a signature that does not verify");
            return Err(BeaconError::InvalidResponse(format!(
                "round {round} signature does not verify against chain key"
            )));
        }

        Ok(RoundFetch::Produced(RoundSignature { round, signature }))
    }
}
