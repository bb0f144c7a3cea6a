use serde::de::DeserializeOwned;
use streaming::SourceError;
use url::Url;

pub const USER_AGENT: &str = concat!("locapedia/", env!("CARGO_PKG_VERSION"));

fn transport(err: reqwest::Error) -> SourceError {
    if err.is_timeout() {
        SourceError::Timeout
    } else {
        SourceError::Transport(err.to_string())
    }
}

/// GETs `url` and decodes the JSON body.
pub async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: Url,
) -> Result<T, SourceError> {
    let resp = client.get(url).send().await.map_err(transport)?;
    if !resp.status().is_success() {
        return Err(SourceError::Transport(format!("HTTP error: {}", resp.status())));
    }
    let bytes = resp.bytes().await.map_err(transport)?;
    decode(&bytes)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SourceError> {
    serde_json::from_slice(bytes).map_err(|e| SourceError::Decode(e.to_string()))
}
