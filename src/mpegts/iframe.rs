use crate::mpegts::{self, VideoCodec};
use crate::scte35::{as_seconds, round6};

/// Detects random access points in video PES packets and reports their PTS.
///
/// The stream-agnostic alternative (shulga mode) keys off the adaptation
/// field random access indicator instead; see [`mpegts::random_access`].
#[derive(Debug, Default)]
pub struct IframeDetector;

impl IframeDetector {
    pub fn new() -> Self {
        Self
    }

    /// PTS, in seconds, of the access unit starting in this packet when it
    /// begins an iframe; None otherwise.
    pub fn parse(&self, pkt: &[u8], codec: VideoCodec) -> Option<f64> {
        if !mpegts::pusi(pkt) {
            return None;
        }
        let payload = mpegts::payload(pkt)?;
        let pts = mpegts::pes_pts(payload)?;
        let es = payload.get(9 + payload[8] as usize..)?;
        if Self::is_random_access(es, codec) {
            Some(round6(as_seconds(pts)))
        } else {
            None
        }
    }

    fn is_random_access(es: &[u8], codec: VideoCodec) -> bool {
        let mut i = 0;
        while i + 3 < es.len() {
            if es[i] != 0 || es[i + 1] != 0 || es[i + 2] != 1 {
                i += 1;
                continue;
            }
            let unit = es[i + 3];
            match codec {
                VideoCodec::H264 => match unit & 0x1F {
                    5 => return true,
                    // the first coded slice decides the access unit
                    1..=4 => return false,
                    _ => {}
                },
                VideoCodec::H265 => {
                    let unit_type = (unit >> 1) & 0x3F;
                    if (16..=21).contains(&unit_type) {
                        return true;
                    }
                    if unit_type <= 9 {
                        return false;
                    }
                }
                VideoCodec::Mpeg2 => match unit {
                    // sequence header always fronts a random access point
                    0xB3 => return true,
                    0x00 => {
                        return es
                            .get(i + 5)
                            .map(|b| (b >> 3) & 0x07 == 1)
                            .unwrap_or(false);
                    }
                    _ => {}
                },
            }
            i += 4;
        }
        false
    }
}
