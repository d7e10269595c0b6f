//! Cash-link parsing: `https://cash.getcode.com/c#/e=<hex entropy>`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const CASH_LINK_PATH: &str = "/c";
const ENTROPY_KEY: &str = "e";
const ENTROPY_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum DeepLinkError {
    #[error("not a valid URL: {0}")]
    InvalidUrl(String),
    #[error("unsupported link {host}{path}")]
    Unsupported { host: String, path: String },
    #[error("link carries no entropy")]
    MissingEntropy,
    #[error("link entropy is malformed")]
    MalformedEntropy,
}

/// A parsed cash link. The entropy is the opaque key material for the gift
/// card; nothing here interprets it.
#[derive(Clone, PartialEq, Eq)]
pub struct CashLink {
    entropy: Vec<u8>,
}

impl CashLink {
    #[must_use]
    pub fn entropy(&self) -> &[u8] {
        &self.entropy
    }

    /// Identity used to process a link once, without retaining the entropy.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        blake3::hash(&self.entropy).to_hex()[..16].to_string()
    }
}

impl std::fmt::Debug for CashLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CashLink")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

impl Drop for CashLink {
    fn drop(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.entropy);
    }
}

pub fn parse_cash_link(uri: &str, expected_host: &str) -> Result<CashLink, DeepLinkError> {
    let url = Url::parse(uri.trim()).map_err(|e| DeepLinkError::InvalidUrl(e.to_string()))?;
    let host = url.host_str().unwrap_or_default();
    let path = url.path().trim_end_matches('/');
    if !host.eq_ignore_ascii_case(expected_host) || path != CASH_LINK_PATH {
        return Err(DeepLinkError::Unsupported {
            host: host.to_string(),
            path: url.path().to_string(),
        });
    }

    let fragment = url.fragment().ok_or(DeepLinkError::MissingEntropy)?;
    let encoded = fragment
        .trim_start_matches('/')
        .split('&')
        .find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == ENTROPY_KEY).then_some(value)
        })
        .filter(|value| !value.is_empty())
        .ok_or(DeepLinkError::MissingEntropy)?;

    let entropy = hex::decode(encoded).map_err(|_| DeepLinkError::MalformedEntropy)?;
    if entropy.len() != ENTROPY_LEN {
        return Err(DeepLinkError::MalformedEntropy);
    }
    Ok(CashLink { entropy })
}
