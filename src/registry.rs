use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::Value;

/// One supported-network record from the vendor's chain registry.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainRecord {
    pub caip_id: String,
    #[allow(dead_code)]
    pub network_name: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub chain_id: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    pub network_id: Option<String>,
    #[serde(default)]
    pub gsn_enabled: bool,
    #[serde(default)]
    pub sponsorship_enabled: bool,
}

/// The two policy flags the intent builder encodes into `policyInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainPolicy {
    pub gsn_enabled: bool,
    pub sponsorship_enabled: bool,
}

/// Resolves a CAIP-2 id against the registry response. A missing chain is a
/// hard error and must stop the intent flow before any encoding happens.
pub fn resolve_policy(chains: &[ChainRecord], caip2_id: &str) -> Result<ChainPolicy> {
    chains
        .iter()
        .find(|c| c.caip_id == caip2_id)
        .map(|c| ChainPolicy {
            gsn_enabled: c.gsn_enabled,
            sponsorship_enabled: c.sponsorship_enabled,
        })
        .ok_or_else(|| anyhow!("chain not supported: {caip2_id}"))
}

#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: String,
    auth_token: String,
    http: reqwest::Client,
}

impl RegistryClient {
    pub fn new(base_url: String, auth_token: String) -> Self {
        Self {
            base_url,
            auth_token,
            http: reqwest::Client::new(),
        }
    }

    /// Fetches the supported-network list.
    pub async fn supported_chains(&self) -> Result<Vec<ChainRecord>> {
        let url = format!("{}/api/oc/v1/supported/networks", self.base_url);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.auth_token)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;

        let status = resp.status();
        let body: Value = resp.json().await.context("failed to decode JSON")?;

        if !status.is_success() {
            return Err(anyhow!("HTTP {}: {}", status, body));
        }

        parse_networks(&body)
    }
}

fn parse_networks(body: &Value) -> Result<Vec<ChainRecord>> {
    let items = body
        .get("data")
        .and_then(|d| d.get("network"))
        .ok_or_else(|| anyhow!("missing data.network in registry response"))?;
    serde_json::from_value(items.clone()).context("malformed registry network record")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_body() -> Value {
        json!({
            "status": "success",
            "data": {
                "network": [
                    {
                        "caip_id": "eip155:137",
                        "network_name": "POLYGON",
                        "chain_id": "137",
                        "network_id": "ae506585-0ba7-32f3-8b92-120ddf940198",
                        "gsn_enabled": false,
                        "sponsorship_enabled": true
                    },
                    {
                        "caip_id": "eip155:8453",
                        "network_name": "BASE",
                        "chain_id": "8453"
                    }
                ]
            }
        })
    }

    #[test]
    fn parses_registry_response() {
        let chains = parse_networks(&sample_body()).unwrap();
        assert_eq!(chains.len(), 2);
        assert_eq!(chains[0].network_name, "POLYGON");
        assert!(chains[0].sponsorship_enabled);
        // Missing flags default to false.
        assert!(!chains[1].gsn_enabled);
        assert!(!chains[1].sponsorship_enabled);
    }

    #[test]
    fn rejects_unexpected_response_shape() {
        assert!(parse_networks(&json!({ "data": {} })).is_err());
    }

    #[test]
    fn resolves_known_chain_policy() {
        let chains = parse_networks(&sample_body()).unwrap();
        let policy = resolve_policy(&chains, "eip155:137").unwrap();
        assert_eq!(
            policy,
            ChainPolicy {
                gsn_enabled: false,
                sponsorship_enabled: true
            }
        );
    }

    #[test]
    fn unknown_chain_is_an_error() {
        let chains = parse_networks(&sample_body()).unwrap();
        let err = resolve_policy(&chains, "eip155:1").unwrap_err();
        assert_eq!(err.to_string(), "chain not supported: eip155:1");
    }
}
