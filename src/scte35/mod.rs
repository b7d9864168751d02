use crc::Crc;
use data_encoding::BASE64;

use crate::error::X9Error;

pub mod state;

pub use state::{CueState, SpliceState, TagMethod};

/// MPEG-2 CRC-32 used by splice info sections.
const CRC32_MPEG2: Crc<u32> = Crc::<u32>::new(&crc::CRC_32_MPEG_2);

/// SCTE-35 registration identifier "CUES".
const SEGMENTATION_IDENTIFIER: u32 = 0x4355_4553;

/// 33-bit PTS rollover in 90kHz ticks.
pub const ROLLOVER: u64 = 1 << 33;

/// Convert 90kHz ticks to seconds.
pub fn as_seconds(ticks: u64) -> f64 {
    ticks as f64 / 90_000.0
}

fn as_ticks(seconds: f64) -> u64 {
    (seconds * 90_000.0).round() as u64 & (ROLLOVER - 1)
}

/// Round to the 6 decimal places carried by playlist tags and sidecar lines.
pub fn round6(seconds: f64) -> f64 {
    (seconds * 1_000_000.0).round() / 1_000_000.0
}

/// A decoded SCTE-35 splice information section.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    /// 33-bit PTS adjustment in 90kHz ticks.
    pub pts_adjustment: u64,
    pub command: SpliceCommand,
    pub descriptors: Vec<SpliceDescriptor>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpliceCommand {
    SpliceNull,
    SpliceInsert(SpliceInsert),
    TimeSignal(TimeSignal),
}

/// Splice insert command (type 5).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpliceInsert {
    pub event_id: u32,
    pub cancel: bool,
    pub out_of_network: bool,
    pub splice_immediate: bool,
    /// Seconds; absent for splice-immediate cues.
    pub pts_time: Option<f64>,
    /// Seconds.
    pub break_duration: Option<f64>,
    pub auto_return: bool,
    pub unique_program_id: u16,
    pub avail_num: u8,
    pub avails_expected: u8,
}

/// Time signal command (type 6).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeSignal {
    /// Seconds; absent when no time is specified.
    pub pts_time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpliceDescriptor {
    Segmentation(SegmentationDescriptor),
    /// Any other descriptor, carried through encode verbatim.
    Other { tag: u8, data: Vec<u8> },
}

impl SpliceDescriptor {
    pub fn tag(&self) -> u8 {
        match self {
            SpliceDescriptor::Segmentation(_) => 2,
            SpliceDescriptor::Other { tag, .. } => *tag,
        }
    }

    pub fn as_segmentation(&self) -> Option<&SegmentationDescriptor> {
        match self {
            SpliceDescriptor::Segmentation(seg) => Some(seg),
            SpliceDescriptor::Other { .. } => None,
        }
    }
}

/// Segmentation descriptor (tag 2).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SegmentationDescriptor {
    pub event_id: u32,
    pub segmentation_type_id: u8,
    /// Seconds.
    pub segmentation_duration: Option<f64>,
    pub upid_type: u8,
    pub upid: Vec<u8>,
    pub segment_num: u8,
    pub segments_expected: u8,
}

impl Cue {
    pub fn command_type(&self) -> u8 {
        match &self.command {
            SpliceCommand::SpliceNull => 0,
            SpliceCommand::SpliceInsert(_) => 5,
            SpliceCommand::TimeSignal(_) => 6,
        }
    }

    /// The command's own splice time, in seconds.
    pub fn pts_time(&self) -> Option<f64> {
        match &self.command {
            SpliceCommand::SpliceNull => None,
            SpliceCommand::SpliceInsert(si) => si.pts_time,
            SpliceCommand::TimeSignal(ts) => ts.pts_time,
        }
    }

    pub fn pts_adjustment_seconds(&self) -> f64 {
        as_seconds(self.pts_adjustment)
    }

    /// Decode a binary splice info section.
    pub fn decode(data: &[u8]) -> Result<Self, X9Error> {
        let mut r = Reader::new(data);
        let table_id = r.u8()?;
        if table_id != 0xFC {
            return Err(X9Error::CueDecode(format!("bad table id 0x{table_id:02x}")));
        }
        let section_length = (r.u16()? & 0x0FFF) as usize;
        let total = section_length + 3;
        if data.len() < total {
            return Err(X9Error::CueDecode("truncated splice info section".into()));
        }
        let section = &data[..total];
        let stored_crc = u32::from_be_bytes(section[total - 4..].try_into().unwrap());
        let computed = CRC32_MPEG2.checksum(&section[..total - 4]);
        if stored_crc != computed {
            return Err(X9Error::CueDecode(format!(
                "crc mismatch: stored 0x{stored_crc:08x} computed 0x{computed:08x}"
            )));
        }

        let _protocol_version = r.u8()?;
        let enc_byte = r.u8()?;
        if enc_byte & 0x80 != 0 {
            return Err(X9Error::CueDecode("encrypted cues are not supported".into()));
        }
        let pts_adjustment = ((enc_byte & 0x01) as u64) << 32 | r.u32()? as u64;
        let _cw_index = r.u8()?;
        let _tier_and_length = (r.u8()?, r.u16()?);
        let command_type = r.u8()?;
        let command = match command_type {
            0 => SpliceCommand::SpliceNull,
            5 => SpliceCommand::SpliceInsert(Self::decode_splice_insert(&mut r)?),
            6 => SpliceCommand::TimeSignal(TimeSignal {
                pts_time: r.splice_time()?.map(as_seconds),
            }),
            other => {
                return Err(X9Error::CueDecode(format!(
                    "unsupported splice command type {other}"
                )))
            }
        };

        let loop_length = r.u16()? as usize;
        let loop_end = r.pos + loop_length;
        if loop_end + 4 > total {
            return Err(X9Error::CueDecode("descriptor loop overruns section".into()));
        }
        let mut descriptors = Vec::new();
        while r.pos < loop_end {
            let tag = r.u8()?;
            let len = r.u8()? as usize;
            let body = r.take(len)?;
            descriptors.push(Self::decode_descriptor(tag, body)?);
        }
        Ok(Cue {
            pts_adjustment,
            command,
            descriptors,
        })
    }

    /// Decode a sidecar or tag form: base64, or hex with a `0x` prefix.
    pub fn decode_str(text: &str) -> Result<Self, X9Error> {
        let text = text.trim();
        let raw = if let Some(hexed) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            hex::decode(hexed).map_err(|e| X9Error::CueDecode(e.to_string()))?
        } else {
            BASE64
                .decode(text.as_bytes())
                .map_err(|e| X9Error::CueDecode(e.to_string()))?
        };
        Self::decode(&raw)
    }

    fn decode_splice_insert(r: &mut Reader) -> Result<SpliceInsert, X9Error> {
        let mut si = SpliceInsert {
            event_id: r.u32()?,
            ..Default::default()
        };
        si.cancel = r.u8()? & 0x80 != 0;
        if si.cancel {
            return Ok(si);
        }
        let flags = r.u8()?;
        si.out_of_network = flags & 0x80 != 0;
        let program_splice = flags & 0x40 != 0;
        let duration_flag = flags & 0x20 != 0;
        si.splice_immediate = flags & 0x10 != 0;
        if program_splice && !si.splice_immediate {
            si.pts_time = r.splice_time()?.map(as_seconds);
        }
        if !program_splice {
            let component_count = r.u8()?;
            for _ in 0..component_count {
                let _component_tag = r.u8()?;
                if !si.splice_immediate {
                    r.splice_time()?;
                }
            }
        }
        if duration_flag {
            let (auto_return, ticks) = r.break_duration()?;
            si.auto_return = auto_return;
            si.break_duration = Some(as_seconds(ticks));
        }
        si.unique_program_id = r.u16()?;
        si.avail_num = r.u8()?;
        si.avails_expected = r.u8()?;
        Ok(si)
    }

    fn decode_descriptor(tag: u8, body: &[u8]) -> Result<SpliceDescriptor, X9Error> {
        if tag != 2 || body.len() < 4 {
            return Ok(SpliceDescriptor::Other {
                tag,
                data: body.to_vec(),
            });
        }
        let mut r = Reader::new(body);
        if r.u32()? != SEGMENTATION_IDENTIFIER {
            return Ok(SpliceDescriptor::Other {
                tag,
                data: body.to_vec(),
            });
        }
        let mut seg = SegmentationDescriptor {
            event_id: r.u32()?,
            ..Default::default()
        };
        let cancel = r.u8()? & 0x80 != 0;
        if cancel {
            return Ok(SpliceDescriptor::Segmentation(seg));
        }
        let flags = r.u8()?;
        let program_segmentation = flags & 0x80 != 0;
        let duration_flag = flags & 0x40 != 0;
        if !program_segmentation {
            let component_count = r.u8()? as usize;
            r.take(component_count * 6)?;
        }
        if duration_flag {
            let ticks = (r.u8()? as u64) << 32 | r.u32()? as u64;
            seg.segmentation_duration = Some(as_seconds(ticks));
        }
        seg.upid_type = r.u8()?;
        let upid_length = r.u8()? as usize;
        seg.upid = r.take(upid_length)?.to_vec();
        seg.segmentation_type_id = r.u8()?;
        seg.segment_num = r.u8()?;
        seg.segments_expected = r.u8()?;
        Ok(SpliceDescriptor::Segmentation(seg))
    }

    /// Encode back into a binary splice info section.
    pub fn encode(&self) -> Vec<u8> {
        let command_bytes = self.encode_command();
        let mut descriptor_bytes = Vec::new();
        for descriptor in &self.descriptors {
            let body = Self::encode_descriptor(descriptor);
            descriptor_bytes.push(descriptor.tag());
            descriptor_bytes.push(body.len() as u8);
            descriptor_bytes.extend_from_slice(&body);
        }

        let mut body = Vec::new();
        body.push(0); // protocol_version
        body.push(((self.pts_adjustment >> 32) & 1) as u8);
        body.extend_from_slice(&(self.pts_adjustment as u32).to_be_bytes());
        body.push(0xFF); // cw_index
        body.push(0xFF); // tier
        body.push(0xF0 | ((command_bytes.len() >> 8) as u8 & 0x0F));
        body.push(command_bytes.len() as u8);
        body.push(self.command_type());
        body.extend_from_slice(&command_bytes);
        body.extend_from_slice(&(descriptor_bytes.len() as u16).to_be_bytes());
        body.extend_from_slice(&descriptor_bytes);

        let section_length = body.len() + 4;
        let mut section = Vec::with_capacity(section_length + 3);
        section.push(0xFC);
        section.push(0x30 | ((section_length >> 8) as u8 & 0x0F));
        section.push(section_length as u8);
        section.extend_from_slice(&body);
        let crc = CRC32_MPEG2.checksum(&section);
        section.extend_from_slice(&crc.to_be_bytes());
        section
    }

    pub fn encode_base64(&self) -> String {
        BASE64.encode(&self.encode())
    }

    pub fn encode_hex(&self) -> String {
        format!("0x{}", hex::encode(self.encode()))
    }

    fn encode_command(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match &self.command {
            SpliceCommand::SpliceNull => {}
            SpliceCommand::SpliceInsert(si) => {
                out.extend_from_slice(&si.event_id.to_be_bytes());
                out.push(if si.cancel { 0xFF } else { 0x7F });
                if si.cancel {
                    return out;
                }
                let mut flags = 0x4Fu8; // program_splice + reserved
                if si.out_of_network {
                    flags |= 0x80;
                }
                if si.break_duration.is_some() {
                    flags |= 0x20;
                }
                if si.splice_immediate {
                    flags |= 0x10;
                }
                out.push(flags);
                if !si.splice_immediate {
                    encode_splice_time(&mut out, si.pts_time);
                }
                if let Some(duration) = si.break_duration {
                    let ticks = as_ticks(duration);
                    let mut first = 0x7E | ((ticks >> 32) & 1) as u8;
                    if si.auto_return {
                        first |= 0x80;
                    }
                    out.push(first);
                    out.extend_from_slice(&(ticks as u32).to_be_bytes());
                }
                out.extend_from_slice(&si.unique_program_id.to_be_bytes());
                out.push(si.avail_num);
                out.push(si.avails_expected);
            }
            SpliceCommand::TimeSignal(ts) => {
                encode_splice_time(&mut out, ts.pts_time);
            }
        }
        out
    }

    fn encode_descriptor(descriptor: &SpliceDescriptor) -> Vec<u8> {
        match descriptor {
            SpliceDescriptor::Other { data, .. } => data.clone(),
            SpliceDescriptor::Segmentation(seg) => {
                let mut out = Vec::new();
                out.extend_from_slice(&SEGMENTATION_IDENTIFIER.to_be_bytes());
                out.extend_from_slice(&seg.event_id.to_be_bytes());
                out.push(0x7F); // not cancelled
                let mut flags = 0xFF; // program segmentation, delivery not restricted
                if seg.segmentation_duration.is_none() {
                    flags &= !0x40u8;
                }
                out.push(flags);
                if let Some(duration) = seg.segmentation_duration {
                    let ticks = (duration * 90_000.0).round() as u64;
                    out.push((ticks >> 32) as u8);
                    out.extend_from_slice(&(ticks as u32).to_be_bytes());
                }
                out.push(seg.upid_type);
                out.push(seg.upid.len() as u8);
                out.extend_from_slice(&seg.upid);
                out.push(seg.segmentation_type_id);
                out.push(seg.segment_num);
                out.push(seg.segments_expected);
                out
            }
        }
    }
}

fn encode_splice_time(out: &mut Vec<u8>, pts_time: Option<f64>) {
    match pts_time {
        Some(seconds) => {
            let ticks = as_ticks(seconds);
            out.push(0xFE | ((ticks >> 32) & 1) as u8);
            out.extend_from_slice(&(ticks as u32).to_be_bytes());
        }
        None => out.push(0x7F),
    }
}

/// Byte cursor over a splice info section.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], X9Error> {
        if self.pos + n > self.data.len() {
            return Err(X9Error::CueDecode("truncated splice info section".into()));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, X9Error> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, X9Error> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32, X9Error> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    /// splice_time(): 33-bit PTS in ticks when the time_specified flag is set.
    fn splice_time(&mut self) -> Result<Option<u64>, X9Error> {
        let first = self.u8()?;
        if first & 0x80 == 0 {
            return Ok(None);
        }
        let ticks = ((first & 0x01) as u64) << 32 | self.u32()? as u64;
        Ok(Some(ticks))
    }

    /// break_duration(): (auto_return, 33-bit duration ticks).
    fn break_duration(&mut self) -> Result<(bool, u64), X9Error> {
        let first = self.u8()?;
        let ticks = ((first & 0x01) as u64) << 32 | self.u32()? as u64;
        Ok((first & 0x80 != 0, ticks))
    }
}
