//! HLS playlists and segments of the sound library.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use super::ResourceClient;
use crate::error::{ReceiverError, ReceiverResult};
use crate::player::audio::SegmentPolicy;

/// Used when a playlist entry carries no `#EXTINF` duration.
const FALLBACK_SEGMENT_DURATION: Duration = Duration::from_secs(10);

/// One media segment listed in a playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRef {
    pub uri: String,
    pub duration: Duration,
}

/// Parsed media playlist.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Playlist {
    pub segments: Vec<SegmentRef>,
}

impl Playlist {
    /// Parses the subset of M3U8 the library uses: `#EXTINF:<seconds>,`
    /// followed by a segment URI. Other tags are ignored.
    pub fn parse(text: &str) -> ReceiverResult<Self> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        if lines.next() != Some("#EXTM3U") {
            return Err(ReceiverError::protocol("playlist is missing #EXTM3U header"));
        }

        let mut segments = Vec::new();
        let mut pending: Option<Duration> = None;
        for line in lines {
            if let Some(info) = line.strip_prefix("#EXTINF:") {
                let secs = info.split(',').next().unwrap_or_default();
                pending = secs
                    .parse::<f64>()
                    .ok()
                    .filter(|s| s.is_finite() && *s >= 0.0)
                    .map(Duration::from_secs_f64);
            } else if !line.starts_with('#') {
                segments.push(SegmentRef {
                    uri: line.to_string(),
                    duration: pending.take().unwrap_or(FALLBACK_SEGMENT_DURATION),
                });
            }
        }

        if segments.is_empty() {
            return Err(ReceiverError::protocol("playlist lists no segments"));
        }
        Ok(Self { segments })
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn total_duration(&self) -> Duration {
        self.segments.iter().map(|s| s.duration).sum()
    }
}

/// Resolves library paths for a sound and fetches them.
pub struct SegmentSource {
    client: Arc<ResourceClient>,
}

impl SegmentSource {
    pub fn new(client: Arc<ResourceClient>) -> Self {
        Self { client }
    }

    /// Directory holding the playlist and segments for `sound_id` under
    /// `policy`. Without premium entitlement only the free rendition is used.
    pub fn directory(sound_id: &str, policy: &SegmentPolicy) -> String {
        if policy.premium_enabled {
            format!("library/segments/{}/{}", sound_id, policy.bitrate)
        } else {
            format!("library/segments/{}/{}/free", sound_id, policy.bitrate)
        }
    }

    pub fn playlist_path(sound_id: &str, policy: &SegmentPolicy) -> String {
        format!("{}/index.m3u8", Self::directory(sound_id, policy))
    }

    pub fn segment_path(sound_id: &str, policy: &SegmentPolicy, segment: &SegmentRef) -> String {
        match segment.uri.strip_prefix('/') {
            Some(absolute) => absolute.to_string(),
            None => format!("{}/{}", Self::directory(sound_id, policy), segment.uri),
        }
    }

    pub async fn fetch_playlist(
        &self,
        sound_id: &str,
        policy: &SegmentPolicy,
    ) -> ReceiverResult<Playlist> {
        let path = Self::playlist_path(sound_id, policy);
        let text = self.client.fetch(&path).await?.into_text()?;
        let playlist = Playlist::parse(&text)?;
        log::debug!(
            "[CDN] Playlist for {} has {} segment(s), {:?}",
            sound_id,
            playlist.len(),
            playlist.total_duration()
        );
        Ok(playlist)
    }

    pub async fn fetch_segment(
        &self,
        sound_id: &str,
        policy: &SegmentPolicy,
        segment: &SegmentRef,
    ) -> ReceiverResult<Bytes> {
        let path = Self::segment_path(sound_id, policy, segment);
        self.client.fetch(&path).await?.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdn::test_support::{FakeCdn, ScriptedTokens};
    use reqwest::{Client, StatusCode};

    fn policy(premium_enabled: bool) -> SegmentPolicy {
        SegmentPolicy {
            bitrate: "128k".into(),
            premium_enabled,
        }
    }

    #[test]
    fn parses_durations_and_uris() {
        let playlist = Playlist::parse(
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXTINF:9.5,\nseg-0.ts\n#EXTINF:10,\nseg-1.ts\nseg-2.ts\n",
        )
        .unwrap();

        assert_eq!(
            playlist.segments,
            vec![
                SegmentRef {
                    uri: "seg-0.ts".into(),
                    duration: Duration::from_millis(9_500)
                },
                SegmentRef {
                    uri: "seg-1.ts".into(),
                    duration: Duration::from_secs(10)
                },
                SegmentRef {
                    uri: "seg-2.ts".into(),
                    duration: FALLBACK_SEGMENT_DURATION
                },
            ]
        );
    }

    #[test]
    fn rejects_non_playlists() {
        assert!(Playlist::parse("<html></html>").is_err());
        assert!(Playlist::parse("#EXTM3U\n#EXT-X-ENDLIST\n").is_err());
    }

    #[test]
    fn free_rendition_is_used_without_premium() {
        assert_eq!(
            SegmentSource::playlist_path("rain", &policy(false)),
            "library/segments/rain/128k/free/index.m3u8"
        );
        assert_eq!(
            SegmentSource::playlist_path("rain", &policy(true)),
            "library/segments/rain/128k/index.m3u8"
        );
    }

    #[test]
    fn absolute_segment_uris_are_rooted_at_the_cdn() {
        let segment = SegmentRef {
            uri: "/library/shared/seg.ts".into(),
            duration: Duration::from_secs(1),
        };
        assert_eq!(
            SegmentSource::segment_path("rain", &policy(true), &segment),
            "library/shared/seg.ts"
        );
    }

    #[tokio::test]
    async fn fetches_playlist_then_segment() {
        let cdn = FakeCdn::accepting(None);
        cdn.serve(
            "library/segments/rain/128k/free/index.m3u8",
            StatusCode::OK,
            "#EXTM3U\n#EXTINF:4,\ns0.ts\n",
        );
        cdn.serve("library/segments/rain/128k/free/s0.ts", StatusCode::OK, "audio");
        let base = cdn.start().await;

        let client = Arc::new(ResourceClient::new(
            Client::new(),
            base,
            ScriptedTokens::answering(None),
        ));
        let source = SegmentSource::new(client);

        let playlist = source.fetch_playlist("rain", &policy(false)).await.unwrap();
        assert_eq!(playlist.len(), 1);
        let bytes = source
            .fetch_segment("rain", &policy(false), &playlist.segments[0])
            .await
            .unwrap();
        assert_eq!(bytes, Bytes::from_static(b"audio"));
    }

    #[tokio::test]
    async fn missing_playlist_is_unavailable() {
        let cdn = FakeCdn::accepting(None);
        let base = cdn.start().await;
        let client = Arc::new(ResourceClient::new(
            Client::new(),
            base,
            ScriptedTokens::answering(None),
        ));

        let err = SegmentSource::new(client)
            .fetch_playlist("nope", &policy(true))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReceiverError::ResourceUnavailable { status: 404, .. }
        ));
    }
}
