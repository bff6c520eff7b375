//! Bech32 consensus-address handling.

use anyhow::{bail, Context};

/// Decode a bech32 consensus address into its raw bytes, the form in which
/// validators appear in block commit signatures.
pub fn decode_consensus_address(address: &str) -> anyhow::Result<Vec<u8>> {
    let (_hrp, raw) = bech32::decode(address)
        .with_context(|| format!("invalid bech32 address '{address}'"))?;
    Ok(raw)
}

/// Validate an address against the chain's configured prefix, returning its
/// raw bytes. The error strings are user-facing.
pub fn validate_address(address: &str, expected_prefix: &str) -> anyhow::Result<Vec<u8>> {
    let Ok((hrp, raw)) = bech32::decode(address) else {
        bail!("invalid address, should look like `{expected_prefix}1...`");
    };
    if !hrp.as_str().eq_ignore_ascii_case(expected_prefix) {
        bail!("invalid address, should start with `{expected_prefix}1`");
    }
    Ok(raw)
}

#[cfg(test)]
pub(crate) fn encode_consensus_address(prefix: &str, raw: &[u8]) -> String {
    let hrp = bech32::Hrp::parse(prefix).unwrap();
    bech32::encode::<bech32::Bech32>(hrp, raw).unwrap()
}
