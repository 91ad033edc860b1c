//! Source URL resolution and proxying
//!
//! Turns what a display instance was given (a direct URL, a proxied URL or an
//! indirect reference such as a page that embeds an image) into the concrete
//! URL the fetcher should hit.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::content_type::guess_content_type;
use crate::MediaError;

/// Rewrites URLs on CORS-restricted origins to go through a proxy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorsProxy {
    host: Option<String>,
    exempt_domains: Vec<String>,
}

impl CorsProxy {
    /// Create a proxy transform
    ///
    /// * `host` - Proxy server host, `None` disables proxying
    /// * `exempt_domains` - Hosts that are fetched directly
    pub fn new(host: Option<String>, exempt_domains: Vec<String>) -> Self {
        Self {
            host: host.filter(|h| !h.is_empty()),
            exempt_domains,
        }
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Check if `hostname` is fetched without the proxy
    pub fn is_exempt_domain(&self, hostname: &str) -> bool {
        self.exempt_domains
            .iter()
            .any(|domain| domain.eq_ignore_ascii_case(hostname))
    }

    /// Map `url` to the address the fetcher should use
    ///
    /// Only http(s) URLs are proxied; exempt hosts and URLs already on the
    /// proxy are returned unchanged.
    pub fn proxied_url_for(&self, url: &str) -> String {
        let Some(proxy) = self.host.as_deref() else {
            return url.to_string();
        };
        if !(url.starts_with("http:") || url.starts_with("https:")) {
            return url.to_string();
        }

        match url::Url::parse(url) {
            Ok(parsed) => {
                let host = parsed.host_str().unwrap_or_default();
                if host.eq_ignore_ascii_case(proxy) || self.is_exempt_domain(host) {
                    return url.to_string();
                }
            }
            Err(_) => return url.to_string(),
        }

        format!("https://{proxy}/{url}")
    }
}

/// Quality requested from the resolution service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveQuality {
    High,
    Low,
    #[serde(rename = "high_360")]
    High360,
    #[serde(rename = "low_360")]
    Low360,
}

impl ResolveQuality {
    /// Default quality for flat or 360° content on this client
    pub fn default_for(is_360: bool, low_quality: bool) -> Self {
        match (is_360, low_quality) {
            (false, false) => Self::High,
            (false, true) => Self::Low,
            (true, false) => Self::High360,
            (true, true) => Self::Low360,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Low => "low",
            Self::High360 => "high_360",
            Self::Low360 => "low_360",
        }
    }
}

/// Metadata the resolution service may attach to a result
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResolvedMeta {
    #[serde(default)]
    pub expected_content_type: Option<String>,
}

/// Answer from the resolution service
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResolvedMedia {
    pub origin: String,
    #[serde(default)]
    pub origin_audio: Option<String>,
    #[serde(default)]
    pub meta: Option<ResolvedMeta>,
}

/// External service that canonicalizes indirect media references
pub trait MediaResolver: Send + Sync {
    fn resolve(
        &self,
        url: &str,
        quality: ResolveQuality,
        version: u32,
    ) -> Result<ResolvedMedia, MediaError>;
}

#[derive(Serialize)]
struct ResolveBody<'a> {
    media: ResolveBodyMedia<'a>,
    version: u32,
}

#[derive(Serialize)]
struct ResolveBodyMedia<'a> {
    url: &'a str,
    quality: ResolveQuality,
}

/// [`MediaResolver`] that POSTs to a media resolution endpoint
pub struct HttpMediaResolver {
    endpoint: String,
    agent: ureq::Agent,
}

impl HttpMediaResolver {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            agent: ureq::agent(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl MediaResolver for HttpMediaResolver {
    fn resolve(
        &self,
        url: &str,
        quality: ResolveQuality,
        version: u32,
    ) -> Result<ResolvedMedia, MediaError> {
        let body = serde_json::to_string(&ResolveBody {
            media: ResolveBodyMedia { url, quality },
            version,
        })
        .map_err(|e| MediaError::resolution(url, e))?;

        let resp = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json")
            .send_string(&body)
            .map_err(|e| MediaError::resolution(url, e))?;

        let text = resp
            .into_string()
            .map_err(|e| MediaError::resolution(url, e))?;

        serde_json::from_str::<ResolvedMedia>(&text).map_err(|e| MediaError::resolution(url, e))
    }
}

/// What a display instance asks to show
#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest<'a> {
    pub src: &'a str,
    pub version: u32,
    /// Whether to consult the resolution service
    pub resolve: bool,
    /// Projection tag such as `flat` or `360-equirectangular`
    pub projection: Option<&'a str>,
}

/// Concrete addresses for a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    /// Fetchable address after canonicalization and proxying
    pub resolved_url: String,
    /// Canonical address before proxying
    pub canonical_url: String,
    pub audio_url: Option<String>,
    pub content_type_hint: Option<String>,
}

impl ResolvedSource {
    fn passthrough(src: &str) -> Self {
        Self {
            resolved_url: src.to_string(),
            canonical_url: src.to_string(),
            audio_url: None,
            content_type_hint: None,
        }
    }
}

/// Resolves source references to fetchable URLs
pub struct UrlResolver {
    proxy: CorsProxy,
    service: Option<Arc<dyn MediaResolver>>,
    internal_schemes: Vec<String>,
    page_protocol: String,
    low_quality: bool,
}

impl UrlResolver {
    pub fn new(proxy: CorsProxy, service: Option<Arc<dyn MediaResolver>>) -> Self {
        Self {
            proxy,
            service,
            internal_schemes: vec!["hubs:".to_string()],
            page_protocol: "https:".to_string(),
            low_quality: false,
        }
    }

    /// Set the schemes that pass through unresolved (e.g. `hubs:`)
    pub fn with_internal_schemes(mut self, schemes: Vec<String>) -> Self {
        self.internal_schemes = schemes;
        self
    }

    /// Set the protocol prefixed to protocol-relative results (e.g. `https:`)
    pub fn with_page_protocol(mut self, protocol: impl Into<String>) -> Self {
        let mut protocol = protocol.into();
        if !protocol.ends_with(':') {
            protocol.push(':');
        }
        self.page_protocol = protocol;
        self
    }

    /// Request the low-quality renditions from the resolution service
    pub fn with_low_quality(mut self, low_quality: bool) -> Self {
        self.low_quality = low_quality;
        self
    }

    pub fn proxy(&self) -> &CorsProxy {
        &self.proxy
    }

    /// Resolve `request` into a fetchable URL
    ///
    /// Resolution service failures propagate; nothing is retried here.
    pub fn resolve(&self, request: &ResolveRequest<'_>) -> Result<ResolvedSource, MediaError> {
        let src = request.src;
        if src.starts_with("data:") || self.is_internal(src) {
            return Ok(ResolvedSource::passthrough(src));
        }

        let parsed = url::Url::parse(src).map_err(|_| MediaError::InvalidUrl(src.to_string()))?;

        // Model assets on exempt hosts stay local so development setups keep working
        let is_local_model_asset = parsed
            .host_str()
            .is_some_and(|host| self.proxy.is_exempt_domain(host))
            && guess_content_type(src).is_some_and(|ct| ct.starts_with("model/gltf"));
        if is_local_model_asset {
            return Ok(ResolvedSource::passthrough(src));
        }

        let mut canonical_url = src.to_string();
        let mut audio_url = None;
        let mut content_type_hint = None;

        if request.resolve {
            let service = self
                .service
                .as_ref()
                .ok_or_else(|| MediaError::resolution(src, "no resolution service configured"))?;

            let is_360 = request.projection.is_some_and(|p| p.starts_with("360"));
            let quality = ResolveQuality::default_for(is_360, self.low_quality);
            let media = service.resolve(src, quality, request.version)?;

            canonical_url = self.absolutize(&media.origin);
            audio_url = media.origin_audio.as_deref().map(|a| self.absolutize(a));
            content_type_hint = media
                .meta
                .and_then(|meta| meta.expected_content_type)
                .filter(|ct| !ct.is_empty());
        }

        Ok(ResolvedSource {
            resolved_url: self.proxy.proxied_url_for(&canonical_url),
            canonical_url,
            audio_url,
            content_type_hint,
        })
    }

    fn is_internal(&self, src: &str) -> bool {
        self.internal_schemes
            .iter()
            .any(|scheme| src.starts_with(scheme.as_str()))
    }

    fn absolutize(&self, url: &str) -> String {
        if url.starts_with("//") {
            format!("{}{url}", self.page_protocol)
        } else {
            url.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingService {
        calls: Mutex<Vec<(String, ResolveQuality, u32)>>,
        answer: Option<ResolvedMedia>,
    }

    impl MediaResolver for RecordingService {
        fn resolve(
            &self,
            url: &str,
            quality: ResolveQuality,
            version: u32,
        ) -> Result<ResolvedMedia, MediaError> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), quality, version));
            self.answer
                .clone()
                .ok_or_else(|| MediaError::resolution(url, "service unavailable"))
        }
    }

    fn proxy() -> CorsProxy {
        CorsProxy::new(
            Some("cors.example.net".to_string()),
            vec!["assets.local".to_string()],
        )
    }

    fn request(src: &str) -> ResolveRequest<'_> {
        ResolveRequest {
            src,
            version: 1,
            resolve: true,
            projection: None,
        }
    }

    #[test]
    fn test_proxied_url_for() {
        let proxy = proxy();
        assert_eq!(
            proxy.proxied_url_for("https://images.example.com/a.png"),
            "https://cors.example.net/https://images.example.com/a.png"
        );
        assert_eq!(
            proxy.proxied_url_for("https://assets.local/a.png"),
            "https://assets.local/a.png"
        );
        assert_eq!(
            proxy.proxied_url_for("https://cors.example.net/https://x.com/a.png"),
            "https://cors.example.net/https://x.com/a.png"
        );
        assert_eq!(proxy.proxied_url_for("data:image/png;base64,AA"), "data:image/png;base64,AA");
        assert_eq!(
            CorsProxy::default().proxied_url_for("https://x.com/a.png"),
            "https://x.com/a.png"
        );
    }

    #[test]
    fn test_quality_hint() {
        assert_eq!(ResolveQuality::default_for(false, false).as_str(), "high");
        assert_eq!(ResolveQuality::default_for(false, true).as_str(), "low");
        assert_eq!(ResolveQuality::default_for(true, false).as_str(), "high_360");
        assert_eq!(ResolveQuality::default_for(true, true).as_str(), "low_360");
        assert_eq!(
            serde_json::to_string(&ResolveQuality::High360).unwrap(),
            "\"high_360\""
        );
    }

    #[test]
    fn test_data_and_internal_sources_pass_through() {
        let service = Arc::new(RecordingService::default());
        let resolver = UrlResolver::new(proxy(), Some(service.clone()));

        let data = resolver.resolve(&request("data:image/png;base64,AA")).unwrap();
        assert_eq!(data.resolved_url, "data:image/png;base64,AA");

        let internal = resolver.resolve(&request("hubs://clients/1/video")).unwrap();
        assert_eq!(internal.resolved_url, "hubs://clients/1/video");

        assert!(service.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_local_model_asset_skips_resolution_and_proxy() {
        let service = Arc::new(RecordingService::default());
        let resolver = UrlResolver::new(proxy(), Some(service.clone()));

        let resolved = resolver
            .resolve(&request("https://assets.local/scene.glb"))
            .unwrap();
        assert_eq!(resolved.resolved_url, "https://assets.local/scene.glb");
        assert!(service.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_resolution_normalizes_protocol_relative_urls() {
        let service = Arc::new(RecordingService {
            answer: Some(ResolvedMedia {
                origin: "//cdn.example.com/full.gif".to_string(),
                origin_audio: Some("//cdn.example.com/full.mp3".to_string()),
                meta: Some(ResolvedMeta {
                    expected_content_type: Some("image/gif".to_string()),
                }),
            }),
            ..Default::default()
        });
        let resolver =
            UrlResolver::new(proxy(), Some(service.clone())).with_page_protocol("http");

        let resolved = resolver
            .resolve(&ResolveRequest {
                src: "https://gallery.example.com/post/7",
                version: 3,
                resolve: true,
                projection: Some("360-equirectangular"),
            })
            .unwrap();

        assert_eq!(resolved.canonical_url, "http://cdn.example.com/full.gif");
        assert_eq!(
            resolved.resolved_url,
            "https://cors.example.net/http://cdn.example.com/full.gif"
        );
        assert_eq!(resolved.audio_url.as_deref(), Some("http://cdn.example.com/full.mp3"));
        assert_eq!(resolved.content_type_hint.as_deref(), Some("image/gif"));

        let calls = service.calls.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            &[(
                "https://gallery.example.com/post/7".to_string(),
                ResolveQuality::High360,
                3
            )]
        );
    }

    #[test]
    fn test_unresolved_source_is_still_proxied() {
        let resolver = UrlResolver::new(proxy(), None);
        let resolved = resolver
            .resolve(&ResolveRequest {
                resolve: false,
                ..request("https://images.example.com/a.png")
            })
            .unwrap();

        assert_eq!(resolved.canonical_url, "https://images.example.com/a.png");
        assert_eq!(
            resolved.resolved_url,
            "https://cors.example.net/https://images.example.com/a.png"
        );
        assert_eq!(resolved.content_type_hint, None);
    }

    #[test]
    fn test_service_errors_propagate() {
        let resolver = UrlResolver::new(proxy(), Some(Arc::new(RecordingService::default())));
        let err = resolver
            .resolve(&request("https://gallery.example.com/post/7"))
            .unwrap_err();
        assert!(matches!(err, MediaError::Resolution { .. }));
    }

    #[test]
    fn test_invalid_source_url() {
        let resolver = UrlResolver::new(proxy(), None);
        assert_eq!(
            resolver.resolve(&request("not a url")),
            Err(MediaError::InvalidUrl("not a url".to_string()))
        );
    }

    #[test]
    fn test_resolved_media_deserializes_sparse_payload() {
        let media: ResolvedMedia =
            serde_json::from_str(r#"{"origin":"https://x.com/a.png"}"#).unwrap();
        assert_eq!(media.origin, "https://x.com/a.png");
        assert_eq!(media.origin_audio, None);
        assert_eq!(media.meta, None);
    }
}
