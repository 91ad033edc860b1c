//! Content type negotiation
//!
//! Order of precedence: an explicit hint, then a guess from the URL, then a
//! metadata-only network probe. The probe is the expensive fallback and is
//! never issued when either of the first two answers.

use std::sync::Arc;

use crate::fetch::Fetcher;
use crate::MediaError;

const KNOWN_EXTENSIONS: &[(&str, &str)] = &[
    ("gltf", "model/gltf"),
    ("glb", "model/gltf-binary"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("pdf", "application/pdf"),
    ("mp4", "video/mp4"),
    ("mp3", "audio/mpeg"),
    ("basis", "image/basis"),
    ("m3u8", "application/vnd.apple.mpegurl"),
    ("mpd", "application/dash+xml"),
];

/// Content type of live video streams shared over the internal scheme
pub const INTERNAL_VIDEO_CONTENT_TYPE: &str = "video/vnd.hubs-webrtc";

/// Guess a content type from the URL alone, without touching the network
pub fn guess_content_type(url: &str) -> Option<String> {
    if url.is_empty() {
        return None;
    }
    if url.starts_with("hubs://") && url.ends_with("/video") {
        return Some(INTERNAL_VIDEO_CONTENT_TYPE.to_string());
    }
    if let Some(rest) = url.strip_prefix("data:") {
        let end = rest.find([';', ','])?;
        let mime = rest[..end].trim();
        return (!mime.is_empty()).then(|| mime.to_string());
    }

    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    let file_name = path.rsplit('/').next()?;
    let (_, extension) = file_name.rsplit_once('.')?;
    let extension = extension.to_ascii_lowercase();

    KNOWN_EXTENSIONS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| mime.to_string())
}

/// Resolves the content type of a media URL
pub struct ContentTypeResolver {
    fetcher: Arc<dyn Fetcher>,
}

impl ContentTypeResolver {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Determine the content type of `url`
    pub fn resolve_type(&self, url: &str, hint: Option<&str>) -> Result<String, MediaError> {
        self.resolve_type_with_probe(url, url, hint)
    }

    /// Like [`ContentTypeResolver::resolve_type`], but guess from `guess_url`
    /// and probe `probe_url`
    ///
    /// The guess works best on the canonical URL while the probe has to go to
    /// the proxied one.
    pub fn resolve_type_with_probe(
        &self,
        guess_url: &str,
        probe_url: &str,
        hint: Option<&str>,
    ) -> Result<String, MediaError> {
        if let Some(hint) = hint.map(str::trim).filter(|h| !h.is_empty()) {
            return Ok(hint.to_string());
        }
        if let Some(guess) = guess_content_type(guess_url) {
            return Ok(guess);
        }

        log::debug!("probing content type of {probe_url}");
        self.fetcher
            .head_content_type(probe_url)?
            .ok_or_else(|| MediaError::ContentTypeUnknown(probe_url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ProbeCounter {
        probes: AtomicUsize,
        answer: Option<String>,
    }

    impl ProbeCounter {
        fn new(answer: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                probes: AtomicUsize::new(0),
                answer: answer.map(str::to_string),
            })
        }
    }

    impl Fetcher for ProbeCounter {
        fn get_bytes(&self, url: &str) -> Result<Vec<u8>, MediaError> {
            Err(MediaError::fetch(url, "not under test"))
        }

        fn head_content_type(&self, _url: &str) -> Result<Option<String>, MediaError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.clone())
        }
    }

    #[test]
    fn test_guess_by_extension() {
        assert_eq!(
            guess_content_type("https://example.com/art/cat.GIF").as_deref(),
            Some("image/gif")
        );
        assert_eq!(
            guess_content_type("https://example.com/a.jpg?size=large#top").as_deref(),
            Some("image/jpeg")
        );
        assert_eq!(
            guess_content_type("https://example.com/scene.glb").as_deref(),
            Some("model/gltf-binary")
        );
        assert_eq!(
            guess_content_type("/relative/texture.basis").as_deref(),
            Some("image/basis")
        );
    }

    #[test]
    fn test_guess_without_extension() {
        assert_eq!(guess_content_type("https://example.com/media/12345"), None);
        assert_eq!(guess_content_type("https://example.com/"), None);
        assert_eq!(guess_content_type("https://example.com/a.unknown"), None);
        assert_eq!(guess_content_type(""), None);
    }

    #[test]
    fn test_guess_data_and_internal_urls() {
        assert_eq!(
            guess_content_type("data:image/png;base64,AAAA").as_deref(),
            Some("image/png")
        );
        assert_eq!(
            guess_content_type("hubs://clients/abc/video").as_deref(),
            Some(INTERNAL_VIDEO_CONTENT_TYPE)
        );
    }

    #[test]
    fn test_hint_wins_without_probe() {
        let fetcher = ProbeCounter::new(Some("image/png"));
        let resolver = ContentTypeResolver::new(fetcher.clone());

        let ct = resolver
            .resolve_type("https://example.com/a.gif", Some("image/webp"))
            .unwrap();
        assert_eq!(ct, "image/webp");
        assert_eq!(fetcher.probes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_gif_extension_needs_no_probe() {
        let fetcher = ProbeCounter::new(Some("image/png"));
        let resolver = ContentTypeResolver::new(fetcher.clone());

        let ct = resolver.resolve_type("https://example.com/a.gif", None).unwrap();
        assert_eq!(ct, "image/gif");
        assert_eq!(fetcher.probes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unknown_extension_probes_once() {
        let fetcher = ProbeCounter::new(Some("image/gif"));
        let resolver = ContentTypeResolver::new(fetcher.clone());

        let ct = resolver
            .resolve_type("https://example.com/media/42", Some(""))
            .unwrap();
        assert_eq!(ct, "image/gif");
        assert_eq!(fetcher.probes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_probe_without_header_is_unknown() {
        let fetcher = ProbeCounter::new(None);
        let resolver = ContentTypeResolver::new(fetcher.clone());

        assert_eq!(
            resolver.resolve_type("https://example.com/media/42", None),
            Err(MediaError::ContentTypeUnknown(
                "https://example.com/media/42".to_string()
            ))
        );
    }
}
