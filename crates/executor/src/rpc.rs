//! JSON-RPC clients for the ledger and rollup gateways.
//!
//! Both gateways speak the same small dialect over HTTP:
//!
//! | method               | params                                   | result                                  |
//! |----------------------|------------------------------------------|-----------------------------------------|
//! | `getScheduleAccounts`| `{program_id, page, page_size}`          | `{accounts: [{address, data}], has_more}` |
//! | `getScheduleAccount` | `{address}`                              | `{data}` or `null`                      |
//! | `sendInstruction`    | `{program_id, data, accounts}`           | `{signature}`                           |
//! | `getSignatureStatus` | `{signature}`                            | `{confirmed, err}` or `null`            |
//!
//! Addresses are base58, account and instruction data are base64.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use cadence_core::{Address, ScheduleRuntime};
use cadence_ipc::protocol::{RpcRequest, RpcResponse};
use cadence_settlement::instruction::{self, BuiltInstruction, ClaimPayment};
use cadence_settlement::ScheduleAccount;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::client::{ClaimRequest, ClaimResponse, LedgerClient, RollupClient, SubmitResult};
use crate::confirm::{wait_for_confirmation, ConfirmPolicy, SignatureStatus};
use crate::{ExecutorError, Result};

/// Schedule accounts requested per `getScheduleAccounts` page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct AccountPage {
    accounts: Vec<EncodedAccount>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct EncodedAccount {
    address: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct AccountData {
    data: String,
}

#[derive(Debug, Deserialize)]
struct SendResult {
    signature: String,
}

#[derive(Debug, Deserialize)]
struct StatusResult {
    #[serde(default)]
    confirmed: bool,
    #[serde(default)]
    err: Option<String>,
}

/// Minimal JSON-RPC 2.0 client over HTTP POST.
pub struct JsonRpcClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, url: url.into(), next_id: AtomicU64::new(1) })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call `method` and decode its result.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(method, Some(params), id);
        debug!(url = %self.url, method, id, "rpc call");

        let response: RpcResponse = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.id.is_some_and(|got| got != id) {
            return Err(ExecutorError::InvalidResponse(format!(
                "{}: response id {:?} does not match request id {}",
                method, response.id, id
            )));
        }

        let value = response
            .into_result()
            .map_err(|e| ExecutorError::Rpc { code: e.code, message: e.message })?;
        serde_json::from_value(value)
            .map_err(|e| ExecutorError::InvalidResponse(format!("{}: {}", method, e)))
    }

    pub async fn send_instruction(&self, ix: &BuiltInstruction) -> Result<String> {
        let sent: SendResult = self.call("sendInstruction", instruction_params(ix)).await?;
        Ok(sent.signature)
    }

    pub async fn signature_status(&self, signature: &str) -> Result<SignatureStatus> {
        let status: Option<StatusResult> =
            self.call("getSignatureStatus", json!({ "signature": signature })).await?;
        Ok(parse_status(status))
    }

    /// Send and wait for confirmation. A landed-but-failed transaction is an error.
    pub async fn submit_and_confirm(
        &self,
        ix: &BuiltInstruction,
        policy: &ConfirmPolicy,
    ) -> Result<SubmitResult> {
        let signature = self.send_instruction(ix).await?;
        info!(description = %ix.description, signature = %signature, "instruction sent");
        wait_for_confirmation(policy, &signature, || self.signature_status(&signature)).await?;
        Ok(SubmitResult { signature, confirmed: true })
    }

    /// Fetch one schedule account by address; `None` if the gateway does not hold it.
    pub async fn schedule_account(&self, address: &Address) -> Result<Option<ScheduleAccount>> {
        let encoded: Option<AccountData> = self
            .call("getScheduleAccount", json!({ "address": encode_address(address) }))
            .await?;
        encoded.map(|acc| decode_account_data(&acc.data)).transpose()
    }
}

fn instruction_params(ix: &BuiltInstruction) -> Value {
    let accounts: Vec<Value> = ix
        .accounts
        .iter()
        .map(|meta| {
            json!({
                "pubkey": encode_address(&meta.pubkey),
                "is_signer": meta.is_signer,
                "is_writable": meta.is_writable,
            })
        })
        .collect();
    json!({
        "program_id": encode_address(&ix.program_id),
        "data": BASE64.encode(&ix.data),
        "accounts": accounts,
    })
}

fn parse_status(status: Option<StatusResult>) -> SignatureStatus {
    match status {
        None => SignatureStatus::Pending,
        Some(StatusResult { err: Some(err), .. }) => SignatureStatus::Failed(err),
        Some(StatusResult { confirmed: true, .. }) => SignatureStatus::Confirmed,
        Some(_) => SignatureStatus::Pending,
    }
}

pub fn encode_address(address: &Address) -> String {
    bs58::encode(address).into_string()
}

pub fn decode_address(encoded: &str) -> Result<Address> {
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| ExecutorError::InvalidResponse(format!("bad address {}: {}", encoded, e)))?;
    Address::try_from(bytes.as_slice()).map_err(|_| {
        ExecutorError::InvalidResponse(format!("address {} is {} bytes", encoded, bytes.len()))
    })
}

fn decode_account_data(data: &str) -> Result<ScheduleAccount> {
    let raw = BASE64
        .decode(data)
        .map_err(|e| ExecutorError::InvalidResponse(format!("account data: {}", e)))?;
    Ok(ScheduleAccount::from_bytes(&raw)?)
}

/// Decode a page of schedule accounts, skipping entries that do not parse.
fn decode_page(accounts: &[EncodedAccount]) -> Vec<ScheduleRuntime> {
    accounts
        .iter()
        .filter_map(|acc| {
            let decoded = decode_address(&acc.address)
                .and_then(|address| Ok(decode_account_data(&acc.data)?.runtime(address)));
            match decoded {
                Ok(runtime) => Some(runtime),
                Err(e) => {
                    warn!(address = %acc.address, error = %e, "skipping undecodable schedule account");
                    None
                }
            }
        })
        .collect()
}

/// Ledger gateway client. Signs as `authority`.
pub struct RpcLedgerClient {
    rpc: JsonRpcClient,
    program_id: Address,
    authority: Address,
    confirm: ConfirmPolicy,
    page_size: u32,
}

impl RpcLedgerClient {
    pub fn new(rpc: JsonRpcClient, program_id: Address, authority: Address, confirm: ConfirmPolicy) -> Self {
        Self { rpc, program_id, authority, confirm, page_size: DEFAULT_PAGE_SIZE }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn fetch_schedules(&self) -> Result<Vec<ScheduleRuntime>> {
        let program = encode_address(&self.program_id);
        let mut schedules = Vec::new();
        let mut page = 0u32;
        loop {
            let batch: AccountPage = self
                .rpc
                .call(
                    "getScheduleAccounts",
                    json!({ "program_id": program, "page": page, "page_size": self.page_size }),
                )
                .await?;
            schedules.extend(decode_page(&batch.accounts));
            if !batch.has_more || batch.accounts.is_empty() {
                break;
            }
            page += 1;
        }
        debug!(count = schedules.len(), pages = page + 1, "fetched schedule accounts");
        Ok(schedules)
    }

    async fn delegate(&self, schedule: &ScheduleRuntime) -> Result<SubmitResult> {
        let ix = instruction::delegate_schedule(
            &self.program_id,
            &self.authority,
            &schedule.schedule,
            schedule.schedule_id,
        )?;
        self.rpc.submit_and_confirm(&ix, &self.confirm).await
    }

    async fn commit(&self, schedule: &ScheduleRuntime) -> Result<SubmitResult> {
        let ix = instruction::commit_schedule(&self.program_id, &self.authority, &schedule.schedule)?;
        self.rpc.submit_and_confirm(&ix, &self.confirm).await
    }
}

/// Rollup gateway client. Signs as `authority`.
pub struct RpcRollupClient {
    rpc: JsonRpcClient,
    program_id: Address,
    authority: Address,
    confirm: ConfirmPolicy,
}

impl RpcRollupClient {
    pub fn new(rpc: JsonRpcClient, program_id: Address, authority: Address, confirm: ConfirmPolicy) -> Self {
        Self { rpc, program_id, authority, confirm }
    }
}

#[async_trait]
impl RollupClient for RpcRollupClient {
    async fn paid_bitmap(&self, schedule: &Address) -> Result<Option<Vec<u8>>> {
        Ok(self.rpc.schedule_account(schedule).await?.map(|acc| acc.paid_bitmap))
    }

    async fn claim(&self, request: &ClaimRequest) -> Result<ClaimResponse> {
        let leaf_index = u16::try_from(request.leaf_index)
            .map_err(|_| ExecutorError::LeafIndexOutOfRange(request.leaf_index))?;
        let ix = instruction::claim_payment(
            &self.program_id,
            &self.authority,
            &request.schedule,
            &request.vault,
            &request.token_mint,
            ClaimPayment {
                schedule_id: request.schedule_id,
                recipient: request.recipient,
                amount: request.amount,
                leaf_index,
                proof: request.proof.clone(),
            },
        )?;

        let signature = self.rpc.send_instruction(&ix).await?;
        let rpc = &self.rpc;
        let confirmed =
            wait_for_confirmation(&self.confirm, &signature, || rpc.signature_status(&signature)).await;
        match confirmed {
            Ok(()) => Ok(ClaimResponse::Accepted(SubmitResult { signature, confirmed: true })),
            Err(ExecutorError::TransactionFailed { signature, reason }) => {
                Ok(ClaimResponse::Rejected { signature: Some(signature), reason })
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::ScheduleStatus;

    fn account(seed: u8) -> ScheduleAccount {
        ScheduleAccount {
            employer: [seed; 32],
            vault: [seed.wrapping_add(1); 32],
            schedule_id: [seed.wrapping_add(2); 32],
            status: ScheduleStatus::Active,
            interval_secs: 86_400,
            next_execution: 1_700_000_000,
            reserved_amount: 600_000,
            per_execution_amount: 600_000,
            merkle_root: [9u8; 32],
            total_recipients: 3,
            paid_count: 1,
            paid_bitmap: vec![0b0000_0010],
            last_executed_batch: 0,
            bump: 255,
        }
    }

    fn encoded(address: Address, acc: &ScheduleAccount) -> EncodedAccount {
        EncodedAccount {
            address: encode_address(&address),
            data: BASE64.encode(acc.to_bytes().unwrap()),
        }
    }

    #[test]
    fn test_address_round_trip_and_length_check() {
        let address = [42u8; 32];
        assert_eq!(decode_address(&encode_address(&address)).unwrap(), address);
        let short = bs58::encode([1u8; 16]).into_string();
        assert!(matches!(decode_address(&short), Err(ExecutorError::InvalidResponse(_))));
        assert!(decode_address("0OIl").is_err());
    }

    #[test]
    fn test_decode_page_skips_bad_entries() {
        let good = encoded([1u8; 32], &account(1));
        let bad_data = EncodedAccount { address: encode_address(&[2u8; 32]), data: "!!".into() };
        let bad_address = EncodedAccount { address: "nope".into(), data: good.data.clone() };

        let runtimes = decode_page(&[good, bad_data, bad_address]);
        assert_eq!(runtimes.len(), 1);
        assert_eq!(runtimes[0].schedule, [1u8; 32]);
        assert_eq!(runtimes[0].total_recipients, 3);
        assert!(runtimes[0].is_paid(1));
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status(None), SignatureStatus::Pending);
        assert_eq!(
            parse_status(Some(StatusResult { confirmed: false, err: None })),
            SignatureStatus::Pending
        );
        assert_eq!(
            parse_status(Some(StatusResult { confirmed: true, err: None })),
            SignatureStatus::Confirmed
        );
        assert_eq!(
            parse_status(Some(StatusResult { confirmed: true, err: Some("AlreadyPaid".into()) })),
            SignatureStatus::Failed("AlreadyPaid".into())
        );
    }

    #[test]
    fn test_status_result_wire_format() {
        let status: Option<StatusResult> = serde_json::from_value(Value::Null).unwrap();
        assert!(status.is_none());
        let status: Option<StatusResult> =
            serde_json::from_value(json!({ "confirmed": true, "err": null })).unwrap();
        assert_eq!(parse_status(status), SignatureStatus::Confirmed);
    }

    #[test]
    fn test_instruction_params() {
        let ix = instruction::commit_schedule(&[1u8; 32], &[2u8; 32], &[3u8; 32]).unwrap();
        let params = instruction_params(&ix);
        assert_eq!(params["program_id"], encode_address(&[1u8; 32]));
        assert_eq!(BASE64.decode(params["data"].as_str().unwrap()).unwrap(), ix.data);
        assert_eq!(params["accounts"].as_array().unwrap().len(), ix.accounts.len());
        assert_eq!(params["accounts"][0]["is_signer"], true);
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_transport_error() {
        let rpc = JsonRpcClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let result = rpc.signature_status("sig").await;
        assert!(matches!(result, Err(ExecutorError::Transport(_))));
    }
}
