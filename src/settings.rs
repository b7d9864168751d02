use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;
use tracing::warn;

use crate::scte35::TagMethod;

/// Command line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "x9k3", version, about = "SCTE-35 aware MPEG-TS HLS segmenter")]
pub struct Args {
    /// Input source: a file path, http(s):// or udp:// URL, an m3u8
    /// playlist of mpegts media, or - for stdin
    #[arg(short, long, default_value = "-")]
    pub input: String,

    /// Directory for segments and index.m3u8, created if needed
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Sidecar file of SCTE-35 (pts,cue) pairs
    #[arg(short, long)]
    pub sidecar_file: Option<PathBuf>,

    /// Segment time in seconds
    #[arg(short = 't', long, default_value_t = 2.0)]
    pub time: f64,

    /// HLS cue tag dialect: x_cue, x_scte35, x_daterange or x_splicepoint
    #[arg(short = 'T', long, default_value = "x_cue")]
    pub hls_tag: String,

    /// Sliding window size for live output
    #[arg(short, long, default_value_t = 5)]
    pub window_size: usize,

    /// Live mode: sliding window plus wall clock throttling
    #[arg(short, long)]
    pub live: bool,

    /// Delete segments evicted from the window (enables --live)
    #[arg(short, long)]
    pub delete: bool,

    /// Loop the input indefinitely (enables --live and --delete)
    #[arg(short, long)]
    pub replay: bool,

    /// Add #EXT-X-PROGRAM-DATE-TIME tags (enables --live)
    #[arg(short, long)]
    pub program_date_time: bool,

    /// Suppress #EXT-X-DISCONTINUITY tags at splice points
    #[arg(short = 'n', long)]
    pub no_discontinuity: bool,

    /// Disable live throttling
    #[arg(short = 'N', long)]
    pub no_throttle: bool,

    /// Random access indicator iframe detection
    #[arg(short = 'S', long)]
    pub shulga: bool,

    /// Iframe only playlist
    #[arg(short = 'I', long)]
    pub iframe: bool,

    /// Byterange playlist (requires a local .ts input)
    #[arg(short = 'b', long)]
    pub byterange: bool,

    /// Resume an existing index.m3u8 in the output directory
    #[arg(short = 'c', long)]
    pub continue_m3u8: bool,

    /// Require break_timer >= break_duration before honoring a
    /// splice-insert CUE-IN
    #[arg(long)]
    pub gated_cue_in: bool,
}

/// Resolved runtime configuration, after flag implications are applied.
#[derive(Debug, Clone)]
pub struct Settings {
    pub input: String,
    pub output_dir: PathBuf,
    pub sidecar_file: Option<PathBuf>,
    pub seg_time: f64,
    pub tag_method: TagMethod,
    pub window_size: usize,
    pub live: bool,
    pub delete: bool,
    pub replay: bool,
    pub program_date_time: bool,
    pub no_discontinuity: bool,
    pub no_throttle: bool,
    pub shulga: bool,
    pub iframe: bool,
    pub byterange: bool,
    pub continue_m3u8: bool,
    pub gated_cue_in: bool,
}

impl Settings {
    pub fn from_args(args: Args) -> Result<Self> {
        let tag_method: TagMethod = args.hls_tag.parse().map_err(|e: String| anyhow!(e))?;
        // delete, replay and program-date-time only make sense live
        let live = args.live || args.delete || args.replay || args.program_date_time;
        let delete = args.delete || args.replay;
        let mut byterange = args.byterange;
        if byterange && !Self::local_ts_input(&args.input) {
            warn!("byterange hls requires a local .ts input, ignoring --byterange");
            byterange = false;
        }
        Ok(Self {
            input: args.input,
            output_dir: args.output_dir,
            sidecar_file: args.sidecar_file,
            seg_time: args.time,
            tag_method,
            window_size: args.window_size,
            live,
            delete,
            replay: args.replay,
            program_date_time: args.program_date_time,
            no_discontinuity: args.no_discontinuity,
            no_throttle: args.no_throttle,
            shulga: args.shulga,
            iframe: args.iframe,
            byterange,
            continue_m3u8: args.continue_m3u8,
            gated_cue_in: args.gated_cue_in,
        })
    }

    fn local_ts_input(input: &str) -> bool {
        input.ends_with(".ts") && !input.contains("://")
    }

    /// Full path of the output playlist.
    pub fn m3u8_path(&self) -> PathBuf {
        self.output_dir.join("index.m3u8")
    }

    /// The input is itself an HLS playlist to walk.
    pub fn playlist_input(&self) -> bool {
        self.input.contains(".m3u8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args::parse_from(["x9k3"])
    }

    #[test]
    fn replay_implies_live_and_delete() {
        let mut args = base_args();
        args.replay = true;
        let settings = Settings::from_args(args).unwrap();
        assert!(settings.live);
        assert!(settings.delete);
        assert!(settings.replay);
    }

    #[test]
    fn program_date_time_implies_live_only() {
        let mut args = base_args();
        args.program_date_time = true;
        let settings = Settings::from_args(args).unwrap();
        assert!(settings.live);
        assert!(!settings.delete);
    }

    #[test]
    fn byterange_needs_a_local_ts_input() {
        let mut args = base_args();
        args.byterange = true;
        args.input = "https://example.com/video.ts".to_string();
        let settings = Settings::from_args(args).unwrap();
        assert!(!settings.byterange);

        let mut args = base_args();
        args.byterange = true;
        args.input = "video.ts".to_string();
        let settings = Settings::from_args(args).unwrap();
        assert!(settings.byterange);
    }

    #[test]
    fn rejects_unknown_tag_dialects() {
        let mut args = base_args();
        args.hls_tag = "x_bogus".to_string();
        assert!(Settings::from_args(args).is_err());
    }
}
