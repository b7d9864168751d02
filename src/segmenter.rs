use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::error::X9Error;
use crate::hls::{reload, Pane, SlidingWindow};
use crate::ingress::PacketSource;
use crate::mpegts::{self, IframeDetector, TsDecoder, PACKET_SIZE};
use crate::scte35::{round6, Cue, CueState, SpliceState};
use crate::settings::Settings;
use crate::sidecar::Sidecar;
use crate::timer::Timer;

const DISCONTINUITY_TAG: &str = "#EXT-X-DISCONTINUITY";

/// The core loop: consumes TS packets, cuts segments at iframe and splice
/// boundaries, and keeps the playlist current.
pub struct Segmenter {
    settings: Settings,
    decoder: TsDecoder,
    iframer: IframeDetector,
    splice: SpliceState,
    sidecar: Sidecar,
    timer: Timer,
    window: SlidingWindow,
    segnum: u64,
    media_seq: u64,
    discontinuity_seq: u64,
    /// PTS window of the segment being accumulated, seconds.
    started: Option<f64>,
    next_start: Option<f64>,
    now: Option<f64>,
    /// The next pane opens a fresh timeline and carries a discontinuity.
    mark_discontinuity: bool,
    started_byte: u64,
    now_byte: u64,
    active_segment: Vec<u8>,
}

impl Segmenter {
    pub fn new(settings: Settings) -> Result<Self> {
        std::fs::create_dir_all(&settings.output_dir)
            .with_context(|| format!("cannot create {}", settings.output_dir.display()))?;
        let mut window = SlidingWindow::new(if settings.live {
            settings.window_size
        } else {
            usize::MAX
        });
        // byterange panes reference the input file, never delete it
        window.delete = settings.delete && !settings.byterange;
        let mut splice = SpliceState::new(settings.tag_method);
        splice.gated_cue_in = settings.gated_cue_in;
        let mut segmenter = Self {
            decoder: TsDecoder::new(),
            iframer: IframeDetector::new(),
            splice,
            sidecar: Sidecar::new(settings.sidecar_file.clone()),
            timer: Timer::new(),
            window,
            segnum: 0,
            media_seq: 0,
            discontinuity_seq: 0,
            started: None,
            next_start: None,
            now: None,
            mark_discontinuity: false,
            started_byte: 0,
            now_byte: 0,
            active_segment: Vec::new(),
            settings,
        };
        segmenter.apply_continue();
        Ok(segmenter)
    }

    /// Prime the window and counters from an existing index.m3u8.
    fn apply_continue(&mut self) {
        if !self.settings.continue_m3u8 {
            return;
        }
        if self.settings.iframe || self.settings.byterange {
            warn!("{}", X9Error::ContinueIncompatible);
            return;
        }
        let path = self.settings.m3u8_path();
        if !path.exists() {
            return;
        }
        match reload::reload(&path, &self.settings.output_dir) {
            Ok(reloaded) => {
                self.media_seq = reloaded.media_seq;
                self.discontinuity_seq = reloaded.discontinuity_seq;
                self.segnum = reloaded.next_segnum;
                for pane in reloaded.panes {
                    self.window.push(pane);
                }
                let evicted = self.window.trim();
                self.discontinuity_seq += count_discontinuities(&evicted);
                info!(
                    "continuing {} @ segment number {}",
                    path.display(),
                    self.segnum
                );
            }
            Err(e) => warn!("cannot continue {}: {}", path.display(), e),
        }
    }

    /// Run the input to completion: an m3u8 input is walked media by media,
    /// a packet input is consumed directly and looped when replaying.
    pub fn run(&mut self) -> Result<()> {
        self.timer.start();
        if self.settings.playlist_input() {
            let manifest = self.settings.input.clone();
            crate::playlist::PlaylistIngestor::new().run(self, &manifest)?;
        } else {
            loop {
                let mut source = PacketSource::open(&self.settings.input)?;
                match self.consume(&mut source) {
                    Ok(()) => {}
                    // a replay loop reopens the source at loop head
                    Err(e) if self.settings.replay => warn!("source failed, replaying: {e}"),
                    Err(e) => return Err(e),
                }
                if !self.settings.replay {
                    break;
                }
                info!("replaying {}", self.settings.input);
                self.restart();
            }
        }
        self.finish()
    }

    /// Feed every packet of one source through the per-packet parse.
    pub fn consume(&mut self, source: &mut PacketSource) -> Result<()> {
        while let Some(pkt) = source.next_packet()? {
            self.parse_packet(&pkt)?;
        }
        Ok(())
    }

    /// Reset the PTS window for a replay pass; the next pane opens a new
    /// timeline and carries a discontinuity.
    fn restart(&mut self) {
        self.started = None;
        self.next_start = None;
        self.now = None;
        self.splice.reset();
        self.mark_discontinuity = true;
        self.active_segment.clear();
        self.started_byte = 0;
        self.now_byte = 0;
    }

    fn parse_packet(&mut self, pkt: &[u8; PACKET_SIZE]) -> Result<()> {
        self.decoder.observe(pkt);
        self.now_byte += PACKET_SIZE as u64;
        let pid = mpegts::pid(pkt);
        if let Some(cue) = self.decoder.parse_scte35(pkt, pid) {
            self.observe_cue(cue, pid);
        }
        if let Some(pts) = self.decoder.pid_pts(pid) {
            self.now = Some(pts);
        }
        if self.started.is_none() {
            if let Some(now) = self.now {
                self.begin_window(now);
            }
        }
        if mpegts::pusi(pkt) && self.started.is_some() {
            if self.settings.shulga {
                if mpegts::random_access(pkt) {
                    self.check_splice_point()?;
                }
            } else if let Some(codec) = self.decoder.video_codec(pid) {
                if let Some(iframe_pts) = self.iframer.parse(pkt, codec) {
                    self.now = Some(iframe_pts);
                    if self.settings.iframe {
                        self.next_start = Some(iframe_pts);
                    }
                    self.sidecar.load(iframe_pts)?;
                    self.merge_sidecar(pid)?;
                    self.check_splice_point()?;
                }
            }
        }
        if !self.settings.byterange {
            self.active_segment.extend_from_slice(pkt);
        }
        Ok(())
    }

    /// Store a stream cue and queue it through the sidecar, so stream and
    /// operator cues follow the same merge.
    fn observe_cue(&mut self, cue: Cue, pid: u16) {
        let adjusted = self.adjusted_pts(&cue, pid);
        info!("scte35 cue @ {adjusted}");
        self.sidecar.insert(adjusted, cue.encode_base64());
        self.splice.observe(cue, adjusted);
    }

    /// Adjusted splice time: the cue's own pts_time, else the current PTS
    /// of its pid, plus pts_adjustment, wrapped at rollover.
    fn adjusted_pts(&self, cue: &Cue, pid: u16) -> f64 {
        let pts = cue
            .pts_time()
            .or_else(|| self.decoder.pid_pts(pid))
            .unwrap_or(0.0);
        round6((pts + cue.pts_adjustment_seconds()) % mpegts::rollover_seconds())
    }

    /// Consume sidecar cues whose insert PTS fell into the current window.
    fn merge_sidecar(&mut self, pid: u16) -> Result<()> {
        let (Some(started), Some(now)) = (self.started, self.now) else {
            return Ok(());
        };
        for (pts, line) in self.sidecar.take_due(started, now) {
            match Cue::decode_str(&line) {
                Ok(cue) => {
                    let adjusted = self.adjusted_pts(&cue, pid);
                    self.splice.observe(cue, adjusted);
                    self.check_splice_point()?;
                }
                Err(e) => warn!("dropping sidecar cue @ {pts}: {e}"),
            }
        }
        Ok(())
    }

    /// Set the segment window from `pts`. A window that would cross the
    /// 33 bit PTS rollover resets instead, so the wrap opens a new origin.
    fn begin_window(&mut self, pts: f64) {
        self.started = Some(pts);
        self.next_start = Some(pts + self.settings.seg_time);
        if pts + 2.0 * self.settings.seg_time > mpegts::rollover_seconds() {
            self.started = None;
            self.next_start = None;
        }
    }

    /// Truncate the segment window at a pending cue time, and finalize the
    /// segment once `now` reaches its end. Classification is gated on the
    /// cue time so the tag lands on the segment that starts there.
    fn check_splice_point(&mut self) -> Result<()> {
        let (Some(started), Some(now)) = (self.started, self.now) else {
            return Ok(());
        };
        let Some(mut next_start) = self.next_start else {
            return Ok(());
        };
        if let Some(cue_time) = self.splice.cue_time {
            if started < cue_time && cue_time < next_start {
                next_start = cue_time;
                self.next_start = Some(cue_time);
            }
        }
        if now >= next_start {
            self.write_segment()?;
            if self.splice.cue_time.is_some_and(|cue_time| now >= cue_time) {
                self.splice.classify();
            }
        }
        Ok(())
    }

    fn write_segment(&mut self) -> Result<()> {
        let (Some(started), Some(now)) = (self.started, self.now) else {
            return Ok(());
        };
        let mut seg_time = round6(now - started);
        if seg_time <= 0.0 {
            return Ok(());
        }

        let (uri, path) = if self.settings.byterange {
            (
                self.settings.input.clone(),
                PathBuf::from(&self.settings.input),
            )
        } else {
            let uri = format!("seg{}.ts", self.segnum);
            let path = self.settings.output_dir.join(&uri);
            (uri, path)
        };
        if !self.settings.byterange {
            std::fs::write(&path, &self.active_segment).map_err(|source| X9Error::WriteIo {
                path: path.clone(),
                source,
            })?;
            if seg_time > self.settings.seg_time + 2.0 {
                if let Some(probed) = mpegts::probe_duration(&path) {
                    info!("implausible duration {seg_time:.6} for {uri}, probed {probed:.6}");
                    seg_time = probed;
                }
            }
        }

        self.make_pane(&uri, &path, seg_time);
        let evicted = self.window.trim();
        self.discontinuity_seq += count_discontinuities(&evicted);
        self.write_playlist()?;
        info!("{uri}:  start: {started:.6}  end: {now:.6}  duration: {seg_time:.6}");

        self.splice.on_segment_written(seg_time);
        self.splice.tick();
        if self.settings.live && !self.settings.no_throttle {
            self.timer.throttle(seg_time);
        }
        self.begin_window(now);
        self.started_byte = self.now_byte;
        Ok(())
    }

    fn make_pane(&mut self, uri: &str, path: &Path, seg_time: f64) {
        let mut pane = Pane::new(uri, path, self.segnum);
        if self.mark_discontinuity {
            self.add_discontinuity(&mut pane);
            self.mark_discontinuity = false;
        }
        self.add_cue_tag(&mut pane);
        if self.settings.program_date_time {
            let iso = Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ");
            pane.add_tag("#EXT-X-PROGRAM-DATE-TIME", Some(iso.to_string()));
        }
        pane.add_tag("#EXTINF", Some(format!("{seg_time:.6},")));
        if self.settings.byterange {
            pane.add_tag(
                "#EXT-X-BYTERANGE",
                Some(format!(
                    "{}@{}",
                    self.now_byte - self.started_byte,
                    self.started_byte
                )),
            );
        }
        self.window.push(pane);
    }

    fn add_discontinuity(&self, pane: &mut Pane) {
        if !self.settings.no_discontinuity {
            pane.add_tag(DISCONTINUITY_TAG, None);
        }
    }

    /// Cue tag, auto CUE-IN expiry, and break entry/exit discontinuities.
    fn add_cue_tag(&mut self, pane: &mut Pane) {
        self.splice.expire_break();
        let Some(tag) = self.splice.render_tag() else {
            return;
        };
        if matches!(self.splice.state, CueState::Out | CueState::In) {
            self.add_discontinuity(pane);
        }
        info!("{tag}");
        match tag.split_once(':') {
            Some((key, value)) => pane.add_tag(key, Some(value.to_string())),
            None => pane.add_tag(&tag, None),
        }
    }

    /// Rewrite the playlist in full so readers always see a consistent
    /// snapshot.
    fn write_playlist(&mut self) -> Result<()> {
        if let Some(front) = self.window.front() {
            self.media_seq = front.num;
        }
        let path = self.settings.m3u8_path();
        let text = format!("{}{}", self.header(), self.window.render_all());
        std::fs::write(&path, text)
            .map_err(|source| X9Error::WriteIo { path, source })?;
        self.segnum += 1;
        self.active_segment.clear();
        Ok(())
    }

    fn header(&self) -> String {
        let mut lines = vec![
            "#EXTM3U".to_string(),
            "#EXT-X-VERSION:4".to_string(),
            format!(
                "#EXT-X-TARGETDURATION:{}",
                (self.settings.seg_time + 1.0).floor() as u64
            ),
            format!("#EXT-X-MEDIA-SEQUENCE:{}", self.media_seq),
            format!("#EXT-X-DISCONTINUITY-SEQUENCE:{}", self.discontinuity_seq),
            format!("#EXT-X-X9K3-VERSION:{}", env!("CARGO_PKG_VERSION")),
        ];
        if self.settings.iframe {
            lines.push("#EXT-X-I-FRAMES-ONLY".to_string());
        }
        lines.push(String::new());
        lines.join("\n")
    }

    /// Flush any pending segment bytes as a final segment and terminate
    /// the playlist when not live.
    pub fn finish(&mut self) -> Result<()> {
        let pending = !self.active_segment.is_empty()
            || (self.settings.byterange && self.now_byte > self.started_byte);
        if pending && self.now.is_some() {
            self.next_start = self.now;
            self.write_segment()?;
        }
        let path = self.settings.m3u8_path();
        if !self.settings.live && path.exists() {
            use std::io::Write;
            let mut playlist = std::fs::OpenOptions::new()
                .append(true)
                .open(&path)
                .map_err(|source| X9Error::WriteIo {
                    path: path.clone(),
                    source,
                })?;
            playlist
                .write_all(b"#EXT-X-ENDLIST\n")
                .map_err(|source| X9Error::WriteIo { path, source })?;
        }
        Ok(())
    }

    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }

    pub fn media_seq(&self) -> u64 {
        self.media_seq
    }

    pub fn discontinuity_seq(&self) -> u64 {
        self.discontinuity_seq
    }

    pub fn segnum(&self) -> u64 {
        self.segnum
    }
}

fn count_discontinuities(panes: &[Pane]) -> u64 {
    panes
        .iter()
        .filter(|pane| pane.has_tag(DISCONTINUITY_TAG))
        .count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scte35::{
        SegmentationDescriptor, SpliceCommand, SpliceDescriptor, SpliceInsert, TagMethod,
        TimeSignal,
    };
    use crate::testutil::{pat_packet, pes_packet, pmt_packet, scte35_packet};
    use tempfile::tempdir;

    const VIDEO_PID: u16 = 0x101;
    const SCTE35_PID: u16 = 0x102;

    fn settings(dir: &Path) -> Settings {
        Settings {
            input: "input.ts".to_string(),
            output_dir: dir.to_path_buf(),
            sidecar_file: None,
            seg_time: 2.0,
            tag_method: TagMethod::XCue,
            window_size: 5,
            live: false,
            delete: false,
            replay: false,
            program_date_time: false,
            no_discontinuity: false,
            no_throttle: true,
            shulga: false,
            iframe: false,
            byterange: false,
            continue_m3u8: false,
            gated_cue_in: false,
        }
    }

    fn ticks(seconds: f64) -> u64 {
        (seconds * 90_000.0).round() as u64 & (crate::scte35::ROLLOVER - 1)
    }

    /// 10 fps video with an iframe on every whole second.
    fn video_stream(start: f64, seconds: f64) -> Vec<[u8; PACKET_SIZE]> {
        let mut packets = vec![pat_packet(1, 0x100), pmt_packet(0x100, 1, VIDEO_PID, SCTE35_PID)];
        let frames = (seconds * 10.0).round() as u64;
        for n in 0..frames {
            let t = start + n as f64 / 10.0;
            packets.push(pes_packet(VIDEO_PID, ticks(t), n % 10 == 0));
        }
        packets
    }

    fn feed(segmenter: &mut Segmenter, packets: &[[u8; PACKET_SIZE]]) {
        for pkt in packets {
            segmenter.parse_packet(pkt).unwrap();
        }
    }

    fn splice_out_cue(pts: f64, duration: f64) -> Cue {
        Cue {
            pts_adjustment: 0,
            command: SpliceCommand::SpliceInsert(SpliceInsert {
                event_id: 1,
                out_of_network: true,
                pts_time: Some(pts),
                break_duration: Some(duration),
                auto_return: true,
                ..Default::default()
            }),
            descriptors: vec![],
        }
    }

    fn immediate_out_cue(duration: f64) -> Cue {
        Cue {
            pts_adjustment: 0,
            command: SpliceCommand::SpliceInsert(SpliceInsert {
                event_id: 2,
                out_of_network: true,
                splice_immediate: true,
                break_duration: Some(duration),
                auto_return: true,
                ..Default::default()
            }),
            descriptors: vec![],
        }
    }

    fn time_signal_cue(pts: f64, type_id: u8, duration: Option<f64>) -> Cue {
        Cue {
            pts_adjustment: 0,
            command: SpliceCommand::TimeSignal(TimeSignal {
                pts_time: Some(pts),
            }),
            descriptors: vec![SpliceDescriptor::Segmentation(SegmentationDescriptor {
                event_id: 9,
                segmentation_type_id: type_id,
                segmentation_duration: duration,
                ..Default::default()
            })],
        }
    }

    fn discontinuity_lines(playlist: &str) -> usize {
        playlist
            .lines()
            .filter(|line| *line == DISCONTINUITY_TAG)
            .count()
    }

    fn extinf_values(playlist: &str) -> Vec<f64> {
        playlist
            .lines()
            .filter_map(|l| l.strip_prefix("#EXTINF:"))
            .map(|v| v.trim_end_matches(',').parse().unwrap())
            .collect()
    }

    /// Lines of the pane that references `uri`, header excluded.
    fn pane_lines<'a>(playlist: &'a str, uri: &str) -> Vec<&'a str> {
        let mut pane = Vec::new();
        for line in playlist.lines() {
            if line.starts_with("#EXTM3U")
                || line.starts_with("#EXT-X-VERSION")
                || line.starts_with("#EXT-X-TARGETDURATION")
                || line.starts_with("#EXT-X-MEDIA-SEQUENCE")
                || line.starts_with("#EXT-X-DISCONTINUITY-SEQUENCE")
                || line.starts_with("#EXT-X-X9K3-VERSION")
                || line.starts_with("#EXT-X-I-FRAMES-ONLY")
            {
                continue;
            }
            if line.starts_with('#') {
                pane.push(line);
            } else {
                if line == uri {
                    return pane;
                }
                pane.clear();
            }
        }
        Vec::new()
    }

    #[test]
    fn plain_vod_cuts_on_cadence_and_ends_the_list() {
        let dir = tempdir().unwrap();
        let mut segmenter = Segmenter::new(settings(dir.path())).unwrap();
        feed(&mut segmenter, &video_stream(10.0, 10.0));
        segmenter.finish().unwrap();

        let playlist = std::fs::read_to_string(dir.path().join("index.m3u8")).unwrap();
        let durations = extinf_values(&playlist);
        assert_eq!(durations.len(), 5);
        for duration in durations {
            assert!((1.9..=2.1).contains(&duration), "duration {duration}");
        }
        for num in 0..5 {
            assert!(dir.path().join(format!("seg{num}.ts")).exists());
        }
        assert!(playlist.ends_with("#EXT-X-ENDLIST\n"));
        assert_eq!(discontinuity_lines(&playlist), 0);
        assert!(playlist.contains("#EXT-X-MEDIA-SEQUENCE:0"));
        assert!(playlist.contains("#EXT-X-TARGETDURATION:3"));
    }

    #[test]
    fn splice_insert_break_tags_out_cont_in() {
        let dir = tempdir().unwrap();
        let mut segmenter = Segmenter::new(settings(dir.path())).unwrap();

        let mut packets = video_stream(0.0, 16.0);
        // cue lands mid way through the first segment, splice point at 3.0
        packets.insert(17, scte35_packet(SCTE35_PID, &splice_out_cue(3.0, 6.0)));
        feed(&mut segmenter, &packets);
        segmenter.finish().unwrap();

        let playlist = std::fs::read_to_string(dir.path().join("index.m3u8")).unwrap();
        // the segment before the splice point ends exactly at 3.0
        let durations = extinf_values(&playlist);
        assert!((durations[1] - 1.0).abs() < 1e-6, "cut at the cue time");

        let out_pane = pane_lines(&playlist, "seg2.ts");
        assert!(out_pane.contains(&"#EXT-X-CUE-OUT:6.0"));
        assert!(out_pane.contains(&DISCONTINUITY_TAG));

        assert!(pane_lines(&playlist, "seg3.ts")
            .contains(&"#EXT-X-CUE-OUT-CONT:2.000000/6.0"));
        assert!(pane_lines(&playlist, "seg4.ts")
            .contains(&"#EXT-X-CUE-OUT-CONT:4.000000/6.0"));

        let in_pane = pane_lines(&playlist, "seg5.ts");
        assert!(in_pane.contains(&"#EXT-X-CUE-IN"));
        assert!(in_pane.contains(&DISCONTINUITY_TAG));

        // one break contributes exactly two discontinuities
        assert_eq!(discontinuity_lines(&playlist), 2);
    }

    #[test]
    fn no_discontinuity_suppresses_break_markers() {
        let dir = tempdir().unwrap();
        let mut cfg = settings(dir.path());
        cfg.no_discontinuity = true;
        let mut segmenter = Segmenter::new(cfg).unwrap();

        let mut packets = video_stream(0.0, 12.0);
        packets.insert(17, scte35_packet(SCTE35_PID, &splice_out_cue(3.0, 6.0)));
        feed(&mut segmenter, &packets);
        segmenter.finish().unwrap();

        let playlist = std::fs::read_to_string(dir.path().join("index.m3u8")).unwrap();
        assert!(playlist.contains("#EXT-X-CUE-OUT:6.0"));
        assert_eq!(discontinuity_lines(&playlist), 0);
    }

    #[test]
    fn time_signal_break_pairs_on_matching_type() {
        let dir = tempdir().unwrap();
        let mut segmenter = Segmenter::new(settings(dir.path())).unwrap();

        let mut packets = video_stream(0.0, 14.0);
        // 0x22 break start with a 4s duration, 0x23 closes it early at 6.0
        packets.insert(12, scte35_packet(SCTE35_PID, &time_signal_cue(3.0, 0x22, Some(4.0))));
        packets.insert(45, scte35_packet(SCTE35_PID, &time_signal_cue(6.0, 0x23, None)));
        feed(&mut segmenter, &packets);
        segmenter.finish().unwrap();

        let playlist = std::fs::read_to_string(dir.path().join("index.m3u8")).unwrap();
        assert!(pane_lines(&playlist, "seg2.ts").contains(&"#EXT-X-CUE-OUT:4.0"));
        let in_pane = pane_lines(&playlist, "seg4.ts");
        assert!(in_pane.contains(&"#EXT-X-CUE-IN"), "IN at the 0x23 cue time");
    }

    #[test]
    fn sidecar_pts_zero_applies_at_the_next_boundary() {
        let dir = tempdir().unwrap();
        let sidecar_path = dir.path().join("sidecar.txt");
        std::fs::write(
            &sidecar_path,
            format!("0,{}\n", immediate_out_cue(4.0).encode_base64()),
        )
        .unwrap();
        let mut cfg = settings(dir.path());
        cfg.sidecar_file = Some(sidecar_path.clone());
        let mut segmenter = Segmenter::new(cfg).unwrap();

        feed(&mut segmenter, &video_stream(0.0, 10.0));
        segmenter.finish().unwrap();

        let playlist = std::fs::read_to_string(dir.path().join("index.m3u8")).unwrap();
        let out_pane = pane_lines(&playlist, "seg1.ts");
        assert!(out_pane.contains(&"#EXT-X-CUE-OUT:4.0"));
        assert!(out_pane.contains(&DISCONTINUITY_TAG));
        // append-and-forget: the file is truncated after the reload
        assert_eq!(std::fs::read_to_string(&sidecar_path).unwrap(), "");
    }

    #[test]
    fn live_window_slides_deletes_and_advances_media_seq() {
        let dir = tempdir().unwrap();
        let mut cfg = settings(dir.path());
        cfg.live = true;
        cfg.delete = true;
        cfg.window_size = 3;
        let mut segmenter = Segmenter::new(cfg).unwrap();

        feed(&mut segmenter, &video_stream(0.0, 10.0));
        segmenter.finish().unwrap();

        assert_eq!(segmenter.window().len(), 3);
        let playlist = std::fs::read_to_string(dir.path().join("index.m3u8")).unwrap();
        assert_eq!(extinf_values(&playlist).len(), 3);
        // 5 segments total, the first two slid out and were deleted
        assert!(!dir.path().join("seg0.ts").exists());
        assert!(!dir.path().join("seg1.ts").exists());
        assert!(dir.path().join("seg4.ts").exists());
        assert_eq!(segmenter.media_seq(), 2);
        assert_eq!(segmenter.window().front().unwrap().num, 2);
        // live playlists never carry ENDLIST
        assert!(!playlist.contains("#EXT-X-ENDLIST"));
    }

    #[test]
    fn playlist_continuation_resumes_numbering() {
        let dir = tempdir().unwrap();

        let mut run_a = Segmenter::new(settings(dir.path())).unwrap();
        feed(&mut run_a, &video_stream(10.0, 10.0));
        run_a.finish().unwrap();
        assert_eq!(run_a.segnum(), 5);

        let mut cfg = settings(dir.path());
        cfg.continue_m3u8 = true;
        cfg.live = true;
        cfg.window_size = 3;
        let mut run_b = Segmenter::new(cfg).unwrap();
        assert_eq!(run_b.segnum(), 5);
        // the reloaded window keeps the newest panes, boundary marked
        assert!(run_b
            .window()
            .front()
            .map(|pane| pane.num >= 2)
            .unwrap_or(false));

        feed(&mut run_b, &video_stream(0.0, 4.0));

        let playlist = std::fs::read_to_string(dir.path().join("index.m3u8")).unwrap();
        assert!(playlist.contains("seg5.ts"));
        assert!(dir.path().join("seg5.ts").exists());
        // run A's final pane carries the continuation discontinuity
        assert!(pane_lines(&playlist, "seg4.ts").contains(&DISCONTINUITY_TAG));
        assert_eq!(run_b.media_seq(), run_b.window().front().unwrap().num);
    }

    #[test]
    fn refuses_continuation_for_iframe_playlists() {
        let dir = tempdir().unwrap();
        let mut run_a = Segmenter::new(settings(dir.path())).unwrap();
        feed(&mut run_a, &video_stream(0.0, 6.0));
        run_a.finish().unwrap();

        let mut cfg = settings(dir.path());
        cfg.continue_m3u8 = true;
        cfg.iframe = true;
        let run_b = Segmenter::new(cfg).unwrap();
        // proceeds without continuation
        assert_eq!(run_b.segnum(), 0);
        assert!(run_b.window().is_empty());
    }

    #[test]
    fn iframe_only_cuts_every_iframe() {
        let dir = tempdir().unwrap();
        let mut cfg = settings(dir.path());
        cfg.iframe = true;
        let mut segmenter = Segmenter::new(cfg).unwrap();

        feed(&mut segmenter, &video_stream(0.0, 6.0));
        segmenter.finish().unwrap();

        let playlist = std::fs::read_to_string(dir.path().join("index.m3u8")).unwrap();
        assert!(playlist.contains("#EXT-X-I-FRAMES-ONLY"));
        for duration in extinf_values(&playlist) {
            assert!((duration - 1.0).abs() < 0.11, "iframe cadence, got {duration}");
        }
    }

    #[test]
    fn byterange_references_the_input_instead_of_segment_files() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("input.ts");
        let packets = video_stream(0.0, 6.0);
        let mut bytes = Vec::new();
        for pkt in &packets {
            bytes.extend_from_slice(pkt);
        }
        std::fs::write(&input, &bytes).unwrap();

        let out_dir = dir.path().join("out");
        let mut cfg = settings(&out_dir);
        cfg.byterange = true;
        cfg.input = input.to_string_lossy().to_string();
        let mut segmenter = Segmenter::new(cfg.clone()).unwrap();
        segmenter.run().unwrap();

        let playlist = std::fs::read_to_string(out_dir.join("index.m3u8")).unwrap();
        assert!(playlist.contains("#EXT-X-BYTERANGE:"));
        assert!(!out_dir.join("seg0.ts").exists());
        assert!(playlist.contains(&cfg.input));

        // ranges start at 0 and stay contiguous over the input
        let ranges: Vec<(u64, u64)> = playlist
            .lines()
            .filter_map(|l| l.strip_prefix("#EXT-X-BYTERANGE:"))
            .map(|v| {
                let (len, offset) = v.split_once('@').unwrap();
                (len.parse().unwrap(), offset.parse().unwrap())
            })
            .collect();
        assert!(!ranges.is_empty());
        assert_eq!(ranges[0].1, 0);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].0 + pair[0].1, pair[1].1);
        }
    }

    #[test]
    fn shulga_mode_cuts_on_the_random_access_bit() {
        let dir = tempdir().unwrap();
        let mut cfg = settings(dir.path());
        cfg.shulga = true;
        let mut segmenter = Segmenter::new(cfg).unwrap();

        feed(&mut segmenter, &video_stream(0.0, 10.0));
        segmenter.finish().unwrap();

        let playlist = std::fs::read_to_string(dir.path().join("index.m3u8")).unwrap();
        assert_eq!(extinf_values(&playlist).len(), 5);
    }

    #[test]
    fn pts_rollover_resets_and_keeps_numbering_monotone() {
        let dir = tempdir().unwrap();
        let mut segmenter = Segmenter::new(settings(dir.path())).unwrap();

        let start = mpegts::rollover_seconds() - 6.5;
        feed(&mut segmenter, &video_stream(start, 12.0));
        segmenter.finish().unwrap();

        let playlist = std::fs::read_to_string(dir.path().join("index.m3u8")).unwrap();
        let uris: Vec<&str> = playlist
            .lines()
            .filter(|l| l.ends_with(".ts"))
            .collect();
        assert!(uris.len() >= 3, "segments on both sides of the wrap");
        let nums: Vec<u64> = uris
            .iter()
            .map(|u| {
                u.trim_start_matches("seg")
                    .trim_end_matches(".ts")
                    .parse()
                    .unwrap()
            })
            .collect();
        for pair in nums.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn reparsed_playlist_round_trips_sequences_and_order() {
        let dir = tempdir().unwrap();
        let mut cfg = settings(dir.path());
        cfg.live = true;
        cfg.window_size = 4;
        let mut segmenter = Segmenter::new(cfg).unwrap();

        let mut packets = video_stream(0.0, 14.0);
        packets.insert(17, scte35_packet(SCTE35_PID, &splice_out_cue(3.0, 4.0)));
        feed(&mut segmenter, &packets);

        let reloaded =
            reload::reload(&dir.path().join("index.m3u8"), dir.path()).unwrap();
        assert_eq!(reloaded.media_seq, segmenter.media_seq());
        assert_eq!(reloaded.discontinuity_seq, segmenter.discontinuity_seq());
        assert_eq!(reloaded.panes.len(), segmenter.window().len());
        assert_eq!(reloaded.next_segnum, segmenter.segnum());
    }
}
