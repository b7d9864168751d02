use std::path::Path;

use anyhow::{anyhow, ensure, Context, Result};
use tracing::warn;

use crate::hls::pane::Pane;

/// State recovered from an existing index.m3u8 on restart.
#[derive(Debug)]
pub struct ReloadedPlaylist {
    pub panes: Vec<Pane>,
    pub media_seq: u64,
    pub discontinuity_seq: u64,
    pub next_segnum: u64,
}

/// Parse an existing playlist back into panes, sequence numbers and the
/// next segment number, so segmenting can continue where a previous run
/// stopped. The last reloaded pane is marked with a discontinuity to make
/// the continuation boundary explicit.
pub fn reload(m3u8_path: &Path, output_dir: &Path) -> Result<ReloadedPlaylist> {
    let mut content = std::fs::read_to_string(m3u8_path)
        .with_context(|| format!("cannot read {}", m3u8_path.display()))?;
    // coerce to terminated form so a live playlist parses
    if !content.contains("#EXT-X-ENDLIST") {
        content.push_str("\n#EXT-X-ENDLIST\n");
    }
    let (_, playlist) = m3u8_rs::parse_media_playlist(content.as_bytes())
        .map_err(|e| anyhow!("failed to parse {}: {}", m3u8_path.display(), e))?;

    let mut panes = Vec::new();
    for segment in &playlist.segments {
        if segment.byte_range.is_some() {
            warn!("skipping byterange segment {} on reload", segment.uri);
            continue;
        }
        let Some(num) = segment
            .uri
            .strip_prefix("seg")
            .and_then(|s| s.strip_suffix(".ts"))
            .and_then(|s| s.parse::<u64>().ok())
        else {
            warn!("skipping unrecognized segment uri {} on reload", segment.uri);
            continue;
        };
        let mut pane = Pane::new(segment.uri.clone(), output_dir.join(&segment.uri), num);
        if segment.discontinuity {
            pane.add_tag("#EXT-X-DISCONTINUITY", None);
        }
        for tag in &segment.unknown_tags {
            if tag.tag == "X-X9K3-VERSION" {
                continue;
            }
            pane.add_tag(&format!("#EXT-{}", tag.tag), tag.rest.clone());
        }
        if let Some(pdt) = &segment.program_date_time {
            pane.add_tag(
                "#EXT-X-PROGRAM-DATE-TIME",
                Some(pdt.format("%Y-%m-%dT%H:%M:%S%.6f%:z").to_string()),
            );
        }
        pane.add_tag("#EXTINF", Some(format!("{:.6},", segment.duration)));
        panes.push(pane);
    }
    ensure!(
        !panes.is_empty(),
        "no reloadable segments in {}",
        m3u8_path.display()
    );
    panes
        .last_mut()
        .expect("non-empty")
        .add_tag("#EXT-X-DISCONTINUITY", None);
    let next_segnum = panes.iter().map(|p| p.num).max().expect("non-empty") + 1;

    Ok(ReloadedPlaylist {
        panes,
        media_seq: playlist.media_sequence,
        discontinuity_seq: playlist.discontinuity_sequence,
        next_segnum,
    })
}
