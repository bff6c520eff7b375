//! `cosmos.slashing.v1beta1` query messages, hand-written against the
//! published protobuf definitions, plus the plain types handed to callers.

use chrono::{DateTime, Utc};

pub(crate) mod wire {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct QueryParamsRequest {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct QueryParamsResponse {
        #[prost(message, optional, tag = "1")]
        pub params: Option<Params>,
    }

    /// Module parameters. Only the signed-blocks window is read; the
    /// remaining fields are skipped during decoding.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Params {
        #[prost(int64, tag = "1")]
        pub signed_blocks_window: i64,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct QuerySigningInfoRequest {
        #[prost(string, tag = "1")]
        pub cons_address: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct QuerySigningInfoResponse {
        #[prost(message, optional, tag = "1")]
        pub val_signing_info: Option<ValidatorSigningInfo>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ValidatorSigningInfo {
        #[prost(string, tag = "1")]
        pub address: String,
        #[prost(int64, tag = "2")]
        pub start_height: i64,
        #[prost(int64, tag = "3")]
        pub index_offset: i64,
        #[prost(message, optional, tag = "4")]
        pub jailed_until: Option<::prost_types::Timestamp>,
        #[prost(bool, tag = "5")]
        pub tombstoned: bool,
        #[prost(int64, tag = "6")]
        pub missed_blocks_counter: i64,
    }
}

/// Chain slashing parameters relevant to uptime accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlashingParams {
    pub signed_blocks_window: i64,
}

impl From<wire::Params> for SlashingParams {
    fn from(params: wire::Params) -> SlashingParams {
        SlashingParams {
            signed_blocks_window: params.signed_blocks_window,
        }
    }
}

/// Signing state of one validator within the current slashing window.
#[derive(Debug, Clone, PartialEq)]
pub struct SigningInfo {
    pub address: String,
    pub jailed_until: Option<DateTime<Utc>>,
    pub tombstoned: bool,
    pub missed_blocks_counter: i64,
}

impl From<wire::ValidatorSigningInfo> for SigningInfo {
    fn from(info: wire::ValidatorSigningInfo) -> SigningInfo {
        let jailed_until = info
            .jailed_until
            .and_then(|ts| DateTime::from_timestamp(ts.seconds, ts.nanos.max(0) as u32))
            // The SDK encodes "not jailed" as the unix epoch.
            .filter(|ts| ts.timestamp() > 0);
        SigningInfo {
            address: info.address,
            jailed_until,
            tombstoned: info.tombstoned,
            missed_blocks_counter: info.missed_blocks_counter,
        }
    }
}
