//! Serde shapes for the JSON-RPC results the client consumes. Only the fields
//! the monitoring engine reads are modeled; the rest of the response is
//! ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Result of the `status` RPC.
#[derive(Debug, Clone, Deserialize)]
pub struct Status {
    pub sync_info: SyncInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncInfo {
    #[serde(deserialize_with = "string_i64")]
    pub latest_block_height: i64,
    pub latest_block_time: DateTime<Utc>,
    pub catching_up: bool,
}

/// The `block` payload of the `block` RPC result.
#[derive(Debug, Clone, Deserialize)]
pub struct Block {
    pub header: Header,
    /// Commit for the previous block. Absent on the genesis block.
    pub last_commit: Option<Commit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    #[serde(deserialize_with = "string_i64")]
    pub height: i64,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Commit {
    #[serde(default)]
    pub signatures: Vec<CommitSig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitSig {
    /// Hex-encoded consensus address, empty for absent votes.
    #[serde(default)]
    pub validator_address: String,
}

impl Block {
    /// Whether `raw_address` appears among the previous block's precommit
    /// signatures, i.e. the validator signed it.
    pub fn signed_by(&self, raw_address: &[u8]) -> bool {
        let expected = hex::encode_upper(raw_address);
        let Some(commit) = &self.last_commit else {
            return false;
        };
        commit.signatures.iter().any(|sig| {
            !sig.validator_address.is_empty()
                && sig.validator_address.eq_ignore_ascii_case(&expected)
        })
    }
}

// Tendermint encodes 64-bit integers as decimal strings in JSON.
fn string_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_status_result() {
        let raw = r#"{
            "node_info": {"network": "celestia"},
            "sync_info": {
                "latest_block_hash": "D7C8BB92205C1E2B3318F1A85BCE5CFFDDA5E183DA6E3214C8CBC66443C68C1E",
                "latest_block_height": "123456",
                "latest_block_time": "2024-03-01T12:30:45.123456789Z",
                "catching_up": false
            },
            "validator_info": {"voting_power": "0"}
        }"#;
        let status: Status = serde_json::from_str(raw).unwrap();
        assert_eq!(status.sync_info.latest_block_height, 123_456);
        assert!(!status.sync_info.catching_up);
        assert_eq!(
            status.sync_info.latest_block_time.timestamp(),
            chrono::DateTime::parse_from_rfc3339("2024-03-01T12:30:45Z")
                .unwrap()
                .timestamp()
        );
    }

    #[test]
    fn parses_block_and_checks_signatures() {
        let raw = r#"{
            "header": {
                "chain_id": "celestia",
                "height": "100",
                "time": "2024-03-01T12:30:40Z"
            },
            "data": {"txs": []},
            "last_commit": {
                "height": "99",
                "signatures": [
                    {"block_id_flag": 2, "validator_address": "0A0B0C0D", "signature": "aaaa"},
                    {"block_id_flag": 1, "validator_address": ""},
                    {"block_id_flag": 2, "validator_address": "FFEE0011", "signature": "bbbb"}
                ]
            }
        }"#;
        let block: Block = serde_json::from_str(raw).unwrap();
        assert_eq!(block.header.height, 100);
        assert!(block.signed_by(&[0x0a, 0x0b, 0x0c, 0x0d]));
        assert!(block.signed_by(&[0xff, 0xee, 0x00, 0x11]));
        assert!(!block.signed_by(&[0x01, 0x02, 0x03, 0x04]));
        // Absent votes carry an empty address and never match.
        assert!(!block.signed_by(&[]));
    }

    #[test]
    fn genesis_block_has_no_commit() {
        let raw = r#"{
            "header": {"height": "1", "time": "2023-10-31T14:00:00Z"},
            "last_commit": null
        }"#;
        let block: Block = serde_json::from_str(raw).unwrap();
        assert!(!block.signed_by(&[0x0a]));
    }
}
