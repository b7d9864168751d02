use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::X9Error;
use crate::mpegts::{PACKET_SIZE, SYNC_BYTE};

/// Transport neutral reader yielding fixed 188 byte TS packets from a local
/// file, stdin, an http(s) URL or a udp/multicast address.
pub struct PacketSource {
    reader: Box<dyn Read + Send>,
    /// Bytes read ahead while syncing, served before the reader.
    pending: Vec<u8>,
    desc: String,
    resyncing: bool,
}

impl PacketSource {
    /// Open an input and scan to the first stable sync position: a 0x47
    /// that begins three consecutive 188 byte aligned slots.
    pub fn open(input: &str) -> Result<Self> {
        let reader: Box<dyn Read + Send> = if input.is_empty() || input == "-" {
            Box::new(std::io::stdin())
        } else if input.contains("://") {
            let url: Url = input
                .parse()
                .with_context(|| format!("bad input url {input}"))?;
            match url.scheme() {
                "http" | "https" => {
                    let response = reqwest::blocking::get(input)
                        .and_then(|r| r.error_for_status())
                        .with_context(|| format!("http open failed for {input}"))?;
                    Box::new(response)
                }
                "udp" => Box::new(UdpReader::open(&url)?),
                scheme => bail!("unsupported input scheme {scheme}"),
            }
        } else {
            let file = std::fs::File::open(input)
                .map_err(X9Error::SourceIo)
                .with_context(|| format!("cannot open {input}"))?;
            Box::new(file)
        };
        let mut source = Self {
            reader,
            pending: Vec::new(),
            desc: input.to_string(),
            resyncing: false,
        };
        source.sync()?;
        Ok(source)
    }

    fn sync(&mut self) -> Result<()> {
        let mut probe = vec![0u8; PACKET_SIZE * 4 - 1];
        let got = self.fill(&mut probe)?;
        probe.truncate(got);
        if got == 0 {
            return Ok(());
        }
        let offset = (0..probe.len())
            .find(|&i| {
                probe[i] == SYNC_BYTE
                    && (i + PACKET_SIZE >= probe.len() || probe[i + PACKET_SIZE] == SYNC_BYTE)
                    && (i + 2 * PACKET_SIZE >= probe.len()
                        || probe[i + 2 * PACKET_SIZE] == SYNC_BYTE)
            })
            .ok_or(X9Error::BadPacket)
            .with_context(|| format!("no mpegts sync in {}", self.desc))?;
        if offset > 0 {
            debug!("skipped {offset} bytes syncing to {}", self.desc);
        }
        self.pending = probe[offset..].to_vec();
        Ok(())
    }

    /// The next packet, or None at end of input. A short tail ends the
    /// batch; sync loss is skipped to the next 0x47 and logged once per
    /// contiguous skip.
    pub fn next_packet(&mut self) -> Result<Option<[u8; PACKET_SIZE]>> {
        loop {
            let mut pkt = [0u8; PACKET_SIZE];
            let got = self.fill(&mut pkt)?;
            if got == 0 {
                return Ok(None);
            }
            if got < PACKET_SIZE {
                debug!("dropping {got} trailing bytes from {}", self.desc);
                return Ok(None);
            }
            if pkt[0] == SYNC_BYTE {
                self.resyncing = false;
                return Ok(Some(pkt));
            }
            if !self.resyncing {
                warn!("lost mpegts sync in {}, resyncing", self.desc);
                self.resyncing = true;
            }
            if let Some(next) = pkt[1..].iter().position(|&b| b == SYNC_BYTE) {
                let mut rest = pkt[1 + next..].to_vec();
                rest.append(&mut self.pending);
                self.pending = rest;
            }
        }
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = self.pending.len().min(buf.len());
        if filled > 0 {
            buf[..filled].copy_from_slice(&self.pending[..filled]);
            self.pending.drain(..filled);
        }
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(X9Error::SourceIo(e))
                        .with_context(|| format!("read failed on {}", self.desc))
                }
            }
        }
        Ok(filled)
    }
}

/// Fetch the full text of a playlist input, local path or http(s) URL.
pub fn fetch_text(input: &str) -> Result<String> {
    if input.starts_with("http://") || input.starts_with("https://") {
        let text = reqwest::blocking::get(input)
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("http open failed for {input}"))?
            .text()
            .with_context(|| format!("http read failed for {input}"))?;
        Ok(text)
    } else {
        let text = std::fs::read_to_string(input)
            .map_err(X9Error::SourceIo)
            .with_context(|| format!("cannot read {input}"))?;
        Ok(text)
    }
}

/// Datagram to byte-stream adapter for udp and multicast inputs.
struct UdpReader {
    socket: UdpSocket,
    buffer: Vec<u8>,
    pos: usize,
}

impl UdpReader {
    fn open(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .context("udp input needs a host")?
            .trim_start_matches('@')
            .to_string();
        let port = url.port().context("udp input needs a port")?;
        let addr: IpAddr = host
            .parse()
            .with_context(|| format!("bad udp host {host}"))?;
        let socket = match addr {
            IpAddr::V4(group) if group.is_multicast() => {
                let socket = UdpSocket::bind(("0.0.0.0", port))?;
                socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
                socket
            }
            _ => UdpSocket::bind((host.as_str(), port))?,
        };
        info!("reading mpegts from udp://{host}:{port}");
        Ok(Self {
            socket,
            buffer: Vec::new(),
            pos: 0,
        })
    }
}

impl Read for UdpReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pos >= self.buffer.len() {
            let mut datagram = vec![0u8; 65_535];
            let got = self.socket.recv(&mut datagram)?;
            datagram.truncate(got);
            self.buffer = datagram;
            self.pos = 0;
        }
        let take = buf.len().min(self.buffer.len() - self.pos);
        buf[..take].copy_from_slice(&self.buffer[self.pos..self.pos + take]);
        self.pos += take;
        Ok(take)
    }
}
