//! Client for the Tendermint RPC endpoint of a Cosmos-style chain.
//!
//! Node status and blocks are fetched over JSON-RPC. Slashing parameters and
//! per-validator signing info are application-level queries, carried through
//! `abci_query` as protobuf request/response payloads of the
//! `cosmos.slashing.v1beta1` query service.

use std::future::Future;
use std::time::Duration;

use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

mod rpc;
mod slashing;

pub use rpc::{Block, Commit, CommitSig, Header, Status, SyncInfo};
pub use slashing::{SigningInfo, SlashingParams};

const RPC_TIMEOUT: Duration = Duration::from_secs(5);

const PATH_SLASHING_PARAMS: &str = "/cosmos.slashing.v1beta1.Query/Params";
const PATH_SIGNING_INFO: &str = "/cosmos.slashing.v1beta1.Query/SigningInfo";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid rpc endpoint '{0}'")]
    InvalidEndpoint(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("abci query {path} failed with code {code}: {log}")]
    Abci { path: &'static str, code: u32, log: String },
    #[error("failed to decode abci response payload")]
    Decode(#[from] prost::DecodeError),
    #[error("abci response value is not valid base64")]
    Base64(#[from] base64::DecodeError),
    #[error("missing field '{0}' in rpc response")]
    MissingField(&'static str),
}

impl Error {
    /// Whether retrying the same call can reasonably be expected to succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            // Transport failures and server-side RPC errors are worth a retry.
            Error::Http(_) => true,
            Error::Rpc { .. } => true,

            Error::InvalidEndpoint(_) => false,
            Error::Abci { .. } => false,
            Error::Decode(_) => false,
            Error::Base64(_) => false,
            Error::MissingField(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The chain operations the monitoring engine consumes. Implemented by
/// [`Client`]; test suites substitute their own implementations.
pub trait ChainClient: Send + Sync + 'static {
    fn status(&self) -> impl Future<Output = Result<Status>> + Send;
    fn block(&self, height: i64) -> impl Future<Output = Result<Block>> + Send;
    fn slashing_params(&self) -> impl Future<Output = Result<SlashingParams>> + Send;
    fn signing_info(&self, cons_address: &str) -> impl Future<Output = Result<SigningInfo>> + Send;
}

#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    rpc: url::Url,
    chain_id: String,
}

#[derive(Serialize)]
struct Request<'a, P: Serialize> {
    jsonrpc: &'static str,
    id: u32,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Deserialize)]
struct AbciResult {
    response: AbciResponse,
}

#[derive(Deserialize)]
struct AbciResponse {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    log: String,
    #[serde(default)]
    value: Option<String>,
}

impl Client {
    pub fn new(rpc: &str, chain_id: &str) -> Result<Client> {
        let rpc = url::Url::parse(rpc).map_err(|_| Error::InvalidEndpoint(rpc.to_string()))?;
        let http = reqwest::Client::builder().timeout(RPC_TIMEOUT).build()?;
        Ok(Client {
            http,
            rpc,
            chain_id: chain_id.to_string(),
        })
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    async fn call<P: Serialize, T: DeserializeOwned>(&self, method: &str, params: P) -> Result<T> {
        let request = Request {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };
        tracing::trace!(method, "chain rpc call");
        let response = self
            .http
            .post(self.rpc.clone())
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let envelope: Envelope<T> = response.json().await?;

        if let Some(error) = envelope.error {
            let message = match error.data {
                Some(data) if !data.is_empty() => format!("{}: {data}", error.message),
                _ => error.message,
            };
            return Err(Error::Rpc { code: error.code, message });
        }
        envelope.result.ok_or(Error::MissingField("result"))
    }

    async fn abci_query<Req, Resp>(&self, path: &'static str, request: Req) -> Result<Resp>
    where
        Req: prost::Message,
        Resp: prost::Message + Default,
    {
        let params = serde_json::json!({
            "path": path,
            "data": hex::encode(request.encode_to_vec()),
            "height": "0",
            "prove": false,
        });
        let result: AbciResult = self.call("abci_query", params).await?;

        let response = result.response;
        if response.code != 0 {
            return Err(Error::Abci {
                path,
                code: response.code,
                log: response.log,
            });
        }
        let value = response.value.unwrap_or_default();
        let bytes = base64::engine::general_purpose::STANDARD.decode(value.as_bytes())?;
        Ok(Resp::decode(bytes.as_slice())?)
    }

    pub async fn status(&self) -> Result<Status> {
        self.call("status", serde_json::json!({})).await
    }

    pub async fn block(&self, height: i64) -> Result<Block> {
        #[derive(Deserialize)]
        struct BlockResult {
            block: Block,
        }
        // Tendermint encodes heights as decimal strings on the wire.
        let params = serde_json::json!({ "height": height.to_string() });
        let result: BlockResult = self.call("block", params).await?;
        Ok(result.block)
    }

    pub async fn slashing_params(&self) -> Result<SlashingParams> {
        let response: slashing::wire::QueryParamsResponse = self
            .abci_query(PATH_SLASHING_PARAMS, slashing::wire::QueryParamsRequest {})
            .await?;
        response
            .params
            .map(SlashingParams::from)
            .ok_or(Error::MissingField("params"))
    }

    pub async fn signing_info(&self, cons_address: &str) -> Result<SigningInfo> {
        let request = slashing::wire::QuerySigningInfoRequest {
            cons_address: cons_address.to_string(),
        };
        let response: slashing::wire::QuerySigningInfoResponse =
            self.abci_query(PATH_SIGNING_INFO, request).await?;
        response
            .val_signing_info
            .map(SigningInfo::from)
            .ok_or(Error::MissingField("val_signing_info"))
    }
}

impl ChainClient for Client {
    async fn status(&self) -> Result<Status> {
        Client::status(self).await
    }

    async fn block(&self, height: i64) -> Result<Block> {
        Client::block(self, height).await
    }

    async fn slashing_params(&self) -> Result<SlashingParams> {
        Client::slashing_params(self).await
    }

    async fn signing_info(&self, cons_address: &str) -> Result<SigningInfo> {
        Client::signing_info(self, cons_address).await
    }
}
