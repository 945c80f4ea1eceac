use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    client_secret: ClientSecret,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: String,
}

/// Fetch a short-lived access credential.
///
/// One opaque call; the value is used for exactly one connect attempt and is
/// never persisted. No automatic retry: failure surfaces to the caller.
pub async fn fetch_credential(client: &reqwest::Client, token_url: &str) -> Result<String> {
    let response = client
        .get(token_url)
        .send()
        .await
        .map_err(|e| Error::Connect(format!("credential fetch: {e}")))?;

    if !response.status().is_success() {
        return Err(Error::Connect(format!(
            "credential fetch returned {}",
            response.status()
        )));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| Error::Connect(format!("credential parse: {e}")))?;

    Ok(token.client_secret.value)
}

/// Perform the single offer/answer negotiation with the remote endpoint.
///
/// Sends the local session description, returns the remote one. Any
/// non-success response fails the connect attempt; there is no retry.
pub async fn negotiate(
    client: &reqwest::Client,
    base_url: &str,
    model: &str,
    credential: &str,
    local_description: &str,
) -> Result<String> {
    let url = format!("{base_url}?model={model}");

    let response = client
        .post(&url)
        .bearer_auth(credential)
        .header("Content-Type", "application/sdp")
        .body(local_description.to_string())
        .send()
        .await
        .map_err(|e| Error::Negotiation(e.to_string()))?;

    if !response.status().is_success() {
        return Err(Error::Negotiation(format!(
            "endpoint returned {}",
            response.status()
        )));
    }

    let answer = response
        .text()
        .await
        .map_err(|e| Error::Negotiation(e.to_string()))?;

    debug!(bytes = answer.len(), "received remote session description");
    Ok(answer)
}

/// Local session description offered during negotiation (mono voice media)
pub fn local_description(sample_rate: u32) -> String {
    format!(
        "v=0\r\n\
         o=- 0 0 IN IP4 127.0.0.1\r\n\
         s=viva-session\r\n\
         t=0 0\r\n\
         m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
         c=IN IP4 0.0.0.0\r\n\
         a=rtpmap:111 opus/48000/2\r\n\
         a=fmtp:111 maxplaybackrate={sample_rate};stereo=0\r\n\
         a=sendrecv\r\n"
    )
}
