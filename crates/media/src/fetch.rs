//! Byte and header retrieval for media URLs
//!
//! `data:` URLs are answered locally; everything else goes over HTTP.

use std::io::Read;

use base64::Engine;

use crate::MediaError;

/// Largest body the HTTP fetcher will buffer (256 MB)
pub const MAX_BODY_BYTES: u64 = 256 * 1024 * 1024;

/// Network access needed by the loader: full GETs and metadata-only probes.
pub trait Fetcher: Send + Sync {
    /// Fetch the full body of `url`
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, MediaError>;

    /// Issue a metadata-only request and return the declared `Content-Type`
    fn head_content_type(&self, url: &str) -> Result<Option<String>, MediaError>;
}

/// A decoded `data:` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

/// Parse `data:[<mime>][;base64],<payload>`
///
/// Non-base64 payloads are returned as their raw bytes.
pub fn parse_data_url(url: &str) -> Option<DataUrl> {
    let rest = url.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;

    let (meta, is_base64) = match meta.strip_suffix(";base64") {
        Some(meta) => (meta, true),
        None => (meta, false),
    };
    let mime = meta
        .split(';')
        .next()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string);

    let bytes = if is_base64 {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .ok()?
    } else {
        payload.as_bytes().to_vec()
    };

    Some(DataUrl { mime, bytes })
}

/// [`Fetcher`] backed by a blocking `ureq` agent
pub struct HttpFetcher {
    agent: ureq::Agent,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::with_agent(ureq::agent())
    }

    pub fn with_agent(agent: ureq::Agent) -> Self {
        Self {
            agent,
            user_agent: format!("artwork-loader/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for HttpFetcher {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, MediaError> {
        if url.starts_with("data:") {
            return parse_data_url(url)
                .map(|data| data.bytes)
                .ok_or_else(|| MediaError::fetch(url, "malformed data url"));
        }

        let resp = self
            .agent
            .get(url)
            .set("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| MediaError::fetch(url, e))?;

        let bytes = read_body(url, resp.into_reader(), MAX_BODY_BYTES)?;
        log::debug!("fetched {} bytes from {url}", bytes.len());
        Ok(bytes)
    }

    fn head_content_type(&self, url: &str) -> Result<Option<String>, MediaError> {
        if url.starts_with("data:") {
            return Ok(parse_data_url(url).and_then(|data| data.mime));
        }

        let resp = self
            .agent
            .head(url)
            .set("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| MediaError::fetch(url, e))?;

        Ok(resp
            .header("Content-Type")
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .map(str::to_string))
    }
}

/// Read a whole body, failing instead of truncating past `limit` bytes
fn read_body(url: &str, reader: impl Read, limit: u64) -> Result<Vec<u8>, MediaError> {
    let mut bytes = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|e| MediaError::fetch(url, e))?;
    if bytes.len() as u64 > limit {
        return Err(MediaError::fetch(url, format!("body exceeds {limit} bytes")));
    }
    Ok(bytes)
}
