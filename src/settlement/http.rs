//! HTTP reward settlement with signed request bodies

use futures::future::{join_all, BoxFuture};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{error, info};

use crate::ws::protocol::{EligiblePlayer, RewardFailure, RewardReceipt};

use super::{RewardSettlement, SettlementReport};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 of the request body
pub const SIGNATURE_HEADER: &str = "X-Arena-Signature";

/// Settles each eligible player with its own POST to the configured endpoint
#[derive(Clone)]
pub struct HttpRewardSettlement {
    client: Client,
    url: String,
    secret: Option<String>,
}

/// Body of one settlement request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SettlementRequest<'a> {
    round_number: u64,
    player_id: &'a str,
    score: u32,
}

/// Expected success body
#[derive(Debug, Default, Deserialize)]
struct SettlementResponse {
    #[serde(default)]
    reference: Option<String>,
}

impl HttpRewardSettlement {
    pub fn new(url: String, secret: Option<String>) -> Self {
        Self {
            client: Client::new(),
            url,
            secret,
        }
    }

    async fn settle_one(
        &self,
        round: u64,
        player: &EligiblePlayer,
    ) -> Result<RewardReceipt, SettlementError> {
        let body = serde_json::to_vec(&SettlementRequest {
            round_number: round,
            player_id: &player.player_id,
            score: player.score,
        })
        .map_err(SettlementError::Encode)?;

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json");
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, sign_payload(secret, &body)?);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(SettlementError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SettlementError::Api {
                status: status.as_u16(),
                body,
            });
        }

        // An empty or non-JSON success body still counts as settled
        let parsed: SettlementResponse = response.json().await.unwrap_or_default();
        Ok(RewardReceipt {
            player_id: player.player_id.clone(),
            score: player.score,
            reference: parsed.reference,
        })
    }
}

impl RewardSettlement for HttpRewardSettlement {
    fn settle<'a>(
        &'a self,
        round: u64,
        players: &'a [EligiblePlayer],
    ) -> BoxFuture<'a, SettlementReport> {
        Box::pin(async move {
            let results = join_all(players.iter().map(|p| self.settle_one(round, p))).await;

            let mut report = SettlementReport::default();
            for (player, result) in players.iter().zip(results) {
                match result {
                    Ok(receipt) => {
                        info!(round, player_id = %player.player_id, "Reward settled");
                        report.successful.push(receipt);
                    }
                    Err(e) => {
                        error!(
                            round,
                            player_id = %player.player_id,
                            error = %e,
                            "Reward settlement failed"
                        );
                        report.failed.push(RewardFailure {
                            player_id: player.player_id.clone(),
                            score: player.score,
                            reason: e.to_string(),
                        });
                    }
                }
            }
            report
        })
    }
}

/// Hex HMAC-SHA256 of `payload` under `secret`
pub fn sign_payload(secret: &str, payload: &[u8]) -> Result<String, SettlementError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SettlementError::Signing)?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Settlement errors for a single player
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Settlement API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to encode request: {0}")]
    Encode(serde_json::Error),

    #[error("Invalid signing key")]
    Signing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_reference_vector() {
        assert_eq!(
            sign_payload("", b"").unwrap(),
            "b613679a0814d9ec772f95d778c35fc5ff1697c493715653c6c712144292c5ad"
        );
    }

    #[test]
    fn signature_depends_on_body() {
        let a = sign_payload("secret", br#"{"score":1}"#).unwrap();
        let b = sign_payload("secret", br#"{"score":2}"#).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn request_body_is_camel_case() {
        let body = serde_json::to_value(SettlementRequest {
            round_number: 3,
            player_id: "0xabc",
            score: 2,
        })
        .unwrap();
        assert_eq!(body["roundNumber"], 3);
        assert_eq!(body["playerId"], "0xabc");
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_per_player() {
        let settlement = HttpRewardSettlement::new("http://127.0.0.1:9/settle".into(), None);
        let players = vec![EligiblePlayer {
            player_id: "0xa".into(),
            name: "a".into(),
            score: 1,
        }];
        let report = settlement.settle(1, &players).await;
        assert!(report.successful.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].player_id, "0xa");
    }
}
