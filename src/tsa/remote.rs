//! RFC 3161 client for a real timestamp authority over HTTP.

use std::time::Duration;

use super::rfc3161;
use super::TimestampAuthority;
use crate::error::{SealError, SealResult};

const REQUEST_CONTENT_TYPE: &str = "application/timestamp-query";
const TIMEOUT: Duration = Duration::from_secs(30);

pub struct RemoteTsa {
    url: String,
    client: reqwest::blocking::Client,
}

impl RemoteTsa {
    pub fn new(url: impl Into<String>) -> SealResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(TIMEOUT)
            .build()
            .map_err(|e| SealError::timestamp_failed(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

impl TimestampAuthority for RemoteTsa {
    fn timestamp(&self, data: &[u8]) -> SealResult<Vec<u8>> {
        if data.is_empty() {
            return Err(SealError::validation("cannot timestamp empty data"));
        }
        let digest = crate::digest::sha256(data);

        let mut nonce: [u8; 8] = rand::random();
        // keep the nonce a positive integer without leading zeros
        nonce[0] |= 0x01;
        let request = rfc3161::build_request(&digest, Some(&nonce));

        tracing::debug!(url = %self.url, "requesting remote timestamp");
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, REQUEST_CONTENT_TYPE)
            .body(request)
            .send()
            .map_err(|e| SealError::timestamp_failed(format!("TSA request failed: {e}")))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(SealError::timestamp_failed(format!(
                "TSA returned HTTP {status}"
            )));
        }
        let body = response
            .bytes()
            .map_err(|e| SealError::timestamp_failed(format!("cannot read TSA response: {e}")))?;
        rfc3161::parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_input_before_any_network_io() {
        let tsa = RemoteTsa::new("http://127.0.0.1:1/unused").unwrap();
        assert!(matches!(
            tsa.timestamp(&[]),
            Err(SealError::Validation { .. })
        ));
    }

    #[test]
    fn unreachable_server_maps_to_timestamp_failed() {
        // Port 1 on loopback refuses immediately; no timeout wait.
        let tsa = RemoteTsa::new("http://127.0.0.1:1/stamp").unwrap();
        assert!(matches!(
            tsa.timestamp(&[7u8; 32]),
            Err(SealError::TimestampFailed { .. })
        ));
    }
}
