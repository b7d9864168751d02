use std::str::FromStr;

use chrono::Utc;
use tracing::debug;

use crate::scte35::{Cue, SpliceCommand};

/// Segmentation type ids that open an ad break; the matching close id is
/// always `start + 1`.
const SEGMENTATION_STARTS: [u8; 7] = [0x22, 0x30, 0x32, 0x34, 0x36, 0x44, 0x46];

/// Cue progression across segment boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CueState {
    #[default]
    None,
    Out,
    Cont,
    In,
}

/// The HLS tag dialect used to surface cues in the playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagMethod {
    #[default]
    XCue,
    XScte35,
    XDaterange,
    XSplicepoint,
}

impl FromStr for TagMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x_cue" => Ok(TagMethod::XCue),
            "x_scte35" => Ok(TagMethod::XScte35),
            "x_daterange" => Ok(TagMethod::XDaterange),
            "x_splicepoint" => Ok(TagMethod::XSplicepoint),
            other => Err(format!(
                "hls tag must be x_cue, x_scte35, x_daterange or x_splicepoint, not {other}"
            )),
        }
    }
}

/// Tracks the current cue and its OUT / CONT / IN progression, and renders
/// the playlist tag for the selected dialect.
#[derive(Debug, Default)]
pub struct SpliceState {
    pub cue: Option<Cue>,
    pub state: CueState,
    /// Adjusted, rollover-wrapped PTS of the pending cue, seconds.
    pub cue_time: Option<f64>,
    pub tag_method: TagMethod,
    /// Seconds of segment time accumulated since the break opened.
    pub break_timer: Option<f64>,
    pub break_duration: Option<f64>,
    /// Close-out segmentation type id that resolves the open break.
    seg_type: Option<u8>,
    /// Require `break_timer >= break_duration` before honoring a
    /// splice-insert CUE-IN.
    pub gated_cue_in: bool,
    event_id: u32,
}

impl SpliceState {
    pub fn new(tag_method: TagMethod) -> Self {
        Self {
            tag_method,
            event_id: 1,
            ..Default::default()
        }
    }

    /// Store a cue and its adjusted splice time. No state transition yet;
    /// classification happens at the next segment boundary.
    pub fn observe(&mut self, cue: Cue, cue_time: f64) {
        self.cue = Some(cue);
        self.cue_time = Some(cue_time);
    }

    /// Promote the stored cue into OUT or IN. Called after the segment
    /// ending at the cue's splice point has been written, so the tag lands
    /// on the segment that starts there.
    pub fn classify(&mut self) {
        match self.state {
            CueState::None | CueState::In => {
                if self.classify_out() {
                    self.state = CueState::Out;
                    self.break_timer = Some(0.0);
                    // cut the break-return boundary exactly at break end
                    if let (Some(time), Some(duration)) = (self.cue_time, self.break_duration) {
                        self.cue_time = Some(time + duration);
                    }
                    debug!("cue out @ {:?}", self.cue_time);
                }
            }
            CueState::Out | CueState::Cont => {
                if self.classify_in() {
                    self.state = CueState::In;
                    debug!("cue in @ {:?}", self.cue_time);
                }
            }
        }
    }

    fn classify_out(&mut self) -> bool {
        let Some(cue) = &self.cue else { return false };
        match &cue.command {
            SpliceCommand::SpliceInsert(si) if si.out_of_network => {
                if si.break_duration.is_some() {
                    self.break_duration = si.break_duration;
                }
                true
            }
            SpliceCommand::TimeSignal(_) => {
                for descriptor in &cue.descriptors {
                    let Some(seg) = descriptor.as_segmentation() else {
                        continue;
                    };
                    if SEGMENTATION_STARTS.contains(&seg.segmentation_type_id) {
                        self.seg_type = Some(seg.segmentation_type_id + 1);
                        if seg.segmentation_duration.is_some() {
                            self.break_duration = seg.segmentation_duration;
                        }
                        return true;
                    }
                }
                false
            }
            _ => false,
        }
    }

    fn classify_in(&mut self) -> bool {
        let Some(cue) = &self.cue else { return false };
        match &cue.command {
            SpliceCommand::SpliceInsert(si) if !si.out_of_network => {
                if self.gated_cue_in {
                    match (self.break_timer, self.break_duration) {
                        (Some(timer), Some(duration)) if timer >= duration => true,
                        _ => false,
                    }
                } else {
                    true
                }
            }
            SpliceCommand::TimeSignal(_) => {
                for descriptor in &cue.descriptors {
                    let Some(seg) = descriptor.as_segmentation() else {
                        continue;
                    };
                    if self.seg_type == Some(seg.segmentation_type_id) {
                        self.seg_type = None;
                        return true;
                    }
                }
                false
            }
            _ => false,
        }
    }

    /// Account a finished segment against the open break.
    pub fn on_segment_written(&mut self, seg_time: f64) {
        if let Some(timer) = &mut self.break_timer {
            *timer += seg_time;
        }
    }

    /// Force IN once the accumulated break time covers the break duration.
    pub fn expire_break(&mut self) {
        if !matches!(self.state, CueState::Out | CueState::Cont) {
            return;
        }
        if let (Some(timer), Some(duration)) = (self.break_timer, self.break_duration) {
            if timer >= duration {
                self.break_timer = None;
                self.state = CueState::In;
            }
        }
    }

    /// Advance after a segment write: OUT continues, IN resolves.
    pub fn tick(&mut self) {
        match self.state {
            CueState::Out => self.state = CueState::Cont,
            CueState::In => {
                self.cue = None;
                self.cue_time = None;
                self.break_timer = None;
                self.state = CueState::None;
            }
            _ => {}
        }
    }

    /// Drop all cue state, for a fresh stream origin.
    pub fn reset(&mut self) {
        let tag_method = self.tag_method;
        let gated = self.gated_cue_in;
        let event_id = self.event_id;
        *self = Self::new(tag_method);
        self.gated_cue_in = gated;
        self.event_id = event_id;
    }

    /// The playlist tag for the current state in the selected dialect.
    pub fn render_tag(&mut self) -> Option<String> {
        self.cue.as_ref()?;
        match self.tag_method {
            TagMethod::XCue => self.x_cue(),
            TagMethod::XScte35 => self.x_scte35(),
            TagMethod::XDaterange => self.x_daterange(),
            TagMethod::XSplicepoint => self.x_splicepoint(),
        }
    }

    fn x_cue(&self) -> Option<String> {
        match self.state {
            CueState::Out => match self.break_duration {
                Some(duration) => Some(format!("#EXT-X-CUE-OUT:{}", fmt_duration(duration))),
                None => Some("#EXT-X-CUE-OUT".to_string()),
            },
            CueState::In => Some("#EXT-X-CUE-IN".to_string()),
            CueState::Cont => {
                let timer = self.break_timer.unwrap_or(0.0);
                let duration = self.break_duration.unwrap_or(0.0);
                Some(format!(
                    "#EXT-X-CUE-OUT-CONT:{timer:.6}/{}",
                    fmt_duration(duration)
                ))
            }
            CueState::None => None,
        }
    }

    fn x_scte35(&self) -> Option<String> {
        let base = format!("#EXT-X-SCTE35:CUE=\"{}\"", self.cue.as_ref()?.encode_base64());
        match self.state {
            CueState::Out => Some(format!("{base},CUE-OUT=YES")),
            CueState::In => Some(format!("{base},CUE-IN=YES")),
            CueState::Cont => Some(format!("{base},CUE-OUT=CONT")),
            CueState::None => None,
        }
    }

    fn x_daterange(&mut self) -> Option<String> {
        let iso = Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ");
        let base = format!("#EXT-X-DATERANGE:ID=\"{}\"", self.event_id);
        let hexed = self.cue.as_ref()?.encode_hex();
        match self.state {
            CueState::Out => {
                let duration = self
                    .break_duration
                    .map(|d| format!(",PLANNED-DURATION={}", fmt_duration(d)))
                    .unwrap_or_default();
                Some(format!(
                    "{base},START-DATE=\"{iso}\"{duration},SCTE35-OUT={hexed}"
                ))
            }
            CueState::In => {
                self.event_id += 1;
                Some(format!("{base},END-DATE=\"{iso}\",SCTE35-IN={hexed}"))
            }
            _ => None,
        }
    }

    fn x_splicepoint(&self) -> Option<String> {
        match self.state {
            CueState::Out | CueState::In => Some(format!(
                "#EXT-X-SPLICEPOINT-SCTE35:{}",
                self.cue.as_ref()?.encode_base64()
            )),
            _ => None,
        }
    }
}

/// Format a duration the way the tags carry it: at least one decimal place,
/// no trailing zero padding beyond that.
fn fmt_duration(duration: f64) -> String {
    if duration == duration.trunc() {
        format!("{duration:.1}")
    } else {
        format!("{duration}")
    }
}
