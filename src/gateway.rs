use crate::encoding::{parse_u256_quantity, user_op_to_json};
use crate::types::{IntentType, UserOperation};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Client for the vendor's execution gateway: JSON-RPC `execute` for signed
/// operations, REST estimation, and order-status polling.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    rpc_url: String,
    rest_url: String,
    auth_token: String,
    http: reqwest::Client,
}

/// Bounded polling policy for order status. The reference flow polls
/// forever; we require an explicit attempt cap.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_attempts: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Order {
    pub status: String,
    pub detail: Value,
}

impl Order {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status.as_str(),
            "SUCCESSFUL" | "FAILED" | "BUNDLER_DISCARDED"
        )
    }
}

/// Estimation request wrapper: `{type, jobId, feePayerAddress?,
/// paymasterData, gasDetails, details}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimatePayload {
    pub r#type: String,
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_payer_address: Option<String>,
    pub paymaster_data: String,
    pub gas_details: GasDetails,
    pub details: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GasDetails {
    pub max_fee_per_gas: String,
    pub max_priority_fee_per_gas: String,
}

impl GatewayClient {
    pub fn new(rpc_url: String, rest_url: String, auth_token: String) -> Self {
        Self {
            rpc_url,
            rest_url,
            auth_token,
            http: reqwest::Client::new(),
        }
    }

    /// Submits a signed user operation; returns the gateway job id.
    pub async fn execute(&self, op: &UserOperation) -> Result<String> {
        let params = serde_json::json!([user_op_to_json(op)?]);
        let res = self.rpc("execute", params).await.context("execute failed")?;
        parse_job_id(&res)
    }

    /// Asks the gateway to estimate gas for an unsigned intent.
    pub async fn estimate(&self, payload: &EstimatePayload) -> Result<Value> {
        let url = format!("{}/api/oc/v1/estimate", self.rest_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.auth_token)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?;

        let status = resp.status();
        let body: Value = resp.json().await.context("failed to decode JSON")?;
        if !status.is_success() {
            return Err(anyhow!("HTTP {}: {}", status, body));
        }
        body.get("data")
            .cloned()
            .ok_or_else(|| anyhow!("missing data field in estimate response"))
    }

    /// Fetches the current order record for an intent.
    pub async fn order_status(&self, intent_id: &str, intent_type: IntentType) -> Result<Order> {
        let url = format!(
            "{}/api/oc/v1/orders?intent_id={}&intent_type={}",
            self.rest_url, intent_id, intent_type
        );
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
        parse_order(&body)
    }

    /// Polls the order endpoint until a terminal status or the attempt cap.
    pub async fn wait_for_order(
        &self,
        intent_id: &str,
        intent_type: IntentType,
        policy: PollPolicy,
    ) -> Result<Order> {
        for attempt in 1..=policy.max_attempts {
            match self.order_status(intent_id, intent_type).await {
                Ok(order) if order.is_terminal() => return Ok(order),
                Ok(order) => {
                    tracing::info!(status = %order.status, attempt, "order not terminal yet");
                }
                Err(e) => {
                    // Transient gateway errors are common; keep polling.
                    tracing::warn!(error = %e, attempt, "order status poll error");
                }
            }
            tokio::time::sleep(policy.interval).await;
        }
        Err(anyhow!(
            "order {intent_id} not terminal after {} attempts",
            policy.max_attempts
        ))
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        let req = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let resp = self
            .http
            .post(&self.rpc_url)
            .bearer_auth(&self.auth_token)
            .json(&req)
            .send()
            .await
            .with_context(|| format!("POST {} failed", self.rpc_url))?;

        let status = resp.status();
        let body: Value = resp.json().await.context("failed to decode JSON")?;

        if !status.is_success() {
            return Err(anyhow!("HTTP {}: {}", status, body));
        }

        if let Some(err) = body.get("error") {
            return Err(anyhow!("RPC error: {}", err));
        }

        body.get("result")
            .cloned()
            .ok_or_else(|| anyhow!("missing result field"))
    }
}

fn parse_job_id(res: &Value) -> Result<String> {
    // Some deployments return the job id directly as a JSON string, others
    // wrap it in an object. Accept both shapes.
    if let Some(s) = res.as_str() {
        return Ok(s.to_string());
    }
    if let Some(s) = res.get("jobId").and_then(|v| v.as_str()) {
        return Ok(s.to_string());
    }
    Err(anyhow!(
        "unexpected execute result shape (expected string or {{jobId: ...}}): {res}"
    ))
}

fn parse_order(body: &Value) -> Result<Order> {
    let item = body
        .get("data")
        .and_then(|d| d.get("items"))
        .and_then(|items| items.get(0))
        .ok_or_else(|| anyhow!("no order found in response"))?;

    let status = item
        .get("status")
        .and_then(|s| s.as_str())
        .ok_or_else(|| anyhow!("order record missing status"))?;

    Ok(Order {
        status: status.to_string(),
        detail: item.clone(),
    })
}

/// Applies the gas fields of a gateway estimate (`data.userOps`) onto a
/// partially built operation.
pub fn apply_gas_estimate(op: &mut UserOperation, estimate: &Value) -> Result<()> {
    let user_ops = estimate
        .get("userOps")
        .ok_or_else(|| anyhow!("estimate response missing userOps"))?;

    let field = |key: &str| -> Result<Option<ethers::types::U256>> {
        match user_ops.get(key).and_then(|v| v.as_str()) {
            Some(s) => Ok(Some(
                parse_u256_quantity(s).with_context(|| format!("bad quantity for {key}"))?,
            )),
            None => Ok(None),
        }
    };

    if let Some(v) = field("callGasLimit")? {
        op.call_gas_limit = Some(v);
    }
    if let Some(v) = field("verificationGasLimit")? {
        op.verification_gas_limit = Some(v);
    }
    if let Some(v) = field("preVerificationGas")? {
        op.pre_verification_gas = Some(v);
    }
    if let Some(v) = field("maxFeePerGas")? {
        op.max_fee_per_gas = Some(v);
    }
    if let Some(v) = field("maxPriorityFeePerGas")? {
        op.max_priority_fee_per_gas = Some(v);
    }
    if let Some(v) = field("paymasterVerificationGasLimit")? {
        op.paymaster_verification_gas_limit = Some(v);
    }
    if let Some(v) = field("paymasterPostOpGasLimit")? {
        op.paymaster_post_op_gas_limit = Some(v);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U256;
    use serde_json::json;

    const JOB_ID: &str = "b9e16100-446f-4050-84ed-a846d2bae528";

    #[test]
    fn parse_job_id_from_string() {
        assert_eq!(parse_job_id(&json!(JOB_ID)).unwrap(), JOB_ID);
    }

    #[test]
    fn parse_job_id_from_object() {
        assert_eq!(parse_job_id(&json!({ "jobId": JOB_ID })).unwrap(), JOB_ID);
    }

    #[test]
    fn parse_job_id_rejects_unknown_shape() {
        assert!(parse_job_id(&json!({ "foo": "bar" })).is_err());
    }

    #[test]
    fn parse_order_reads_first_item() {
        let body = json!({
            "status": "success",
            "data": {
                "items": [
                    { "status": "SUCCESSFUL", "intent_id": JOB_ID, "network_name": "POLYGON" }
                ]
            }
        });
        let order = parse_order(&body).unwrap();
        assert_eq!(order.status, "SUCCESSFUL");
        assert!(order.is_terminal());
        assert_eq!(order.detail["network_name"], "POLYGON");
    }

    #[test]
    fn parse_order_requires_an_item() {
        let body = json!({ "data": { "items": [] } });
        assert!(parse_order(&body).is_err());
    }

    #[test]
    fn terminal_statuses() {
        for status in ["SUCCESSFUL", "FAILED", "BUNDLER_DISCARDED"] {
            let order = Order {
                status: status.into(),
                detail: Value::Null,
            };
            assert!(order.is_terminal(), "{status} should be terminal");
        }
        let order = Order {
            status: "IN_PROGRESS".into(),
            detail: Value::Null,
        };
        assert!(!order.is_terminal());
    }

    #[test]
    fn estimate_payload_serializes_camel_case() {
        let payload = EstimatePayload {
            r#type: "TOKEN_TRANSFER".into(),
            job_id: JOB_ID.into(),
            fee_payer_address: None,
            paymaster_data: "0x".into(),
            gas_details: GasDetails {
                max_fee_per_gas: "0xba43b7400".into(),
                max_priority_fee_per_gas: "0xba43b7400".into(),
            },
            details: json!({ "caip2Id": "eip155:137" }),
        };
        let v = serde_json::to_value(&payload).unwrap();
        assert_eq!(v["type"], "TOKEN_TRANSFER");
        assert_eq!(v["jobId"], JOB_ID);
        assert_eq!(v["gasDetails"]["maxFeePerGas"], "0xba43b7400");
        assert!(v.get("feePayerAddress").is_none());
    }

    #[test]
    fn gas_estimate_applies_present_fields_only() {
        let mut op = UserOperation::default();
        op.max_fee_per_gas = Some(U256::from(1u64));
        let estimate = json!({
            "userOps": {
                "callGasLimit": "0x493e0",
                "verificationGasLimit": "0x30d40",
                "preVerificationGas": "0xc350"
            }
        });
        apply_gas_estimate(&mut op, &estimate).unwrap();
        assert_eq!(op.call_gas_limit, Some(U256::from(0x493e0u64)));
        assert_eq!(op.verification_gas_limit, Some(U256::from(0x30d40u64)));
        assert_eq!(op.pre_verification_gas, Some(U256::from(0xc350u64)));
        // Untouched fields keep their values.
        assert_eq!(op.max_fee_per_gas, Some(U256::from(1u64)));
    }

    #[test]
    fn gas_estimate_requires_user_ops_object() {
        let mut op = UserOperation::default();
        assert!(apply_gas_estimate(&mut op, &json!({})).is_err());
    }
}
