use std::collections::VecDeque;

use anyhow::Result;
use tracing::info;

use crate::ingress::{self, PacketSource};
use crate::segmenter::Segmenter;

/// Media URIs already segmented, bounded so endless live playlists cannot
/// grow it without limit.
const MAX_MEDIA: usize = 10_101;

/// Walks an m3u8 input and feeds each new media URI through the segmenter,
/// so a playlist of mpegts media segments into one continuous stream.
#[derive(Debug, Default)]
pub struct PlaylistIngestor {
    media_list: VecDeque<String>,
}

impl PlaylistIngestor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-read the playlist forever, following new media as it appears;
    /// an #EXT-X-ENDLIST line ends the walk.
    pub fn run(&mut self, segmenter: &mut Segmenter, manifest: &str) -> Result<()> {
        let base_uri = manifest
            .rsplit_once('/')
            .map(|(base, _)| format!("{base}/"))
            .unwrap_or_default();
        loop {
            let text = ingress::fetch_text(manifest)?;
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line.contains("ENDLIST") {
                    return Ok(());
                }
                if line.starts_with('#') {
                    continue;
                }
                let media = resolve(&base_uri, line);
                self.ingest(segmenter, &media)?;
            }
        }
    }

    fn ingest(&mut self, segmenter: &mut Segmenter, media: &str) -> Result<()> {
        if self.media_list.iter().any(|seen| seen == media) {
            return Ok(());
        }
        self.media_list.push_back(media.to_string());
        while self.media_list.len() > MAX_MEDIA {
            self.media_list.pop_front();
        }
        info!("loading media {media}");
        let mut source = PacketSource::open(media)?;
        segmenter.consume(&mut source)
    }
}

/// Resolve a playlist line against the manifest's base URI.
fn resolve(base_uri: &str, line: &str) -> String {
    if line.contains("://") || line.starts_with('/') || base_uri.is_empty() {
        line.to_string()
    } else {
        format!("{base_uri}{line}")
    }
}
