use std::collections::VecDeque;
use std::path::PathBuf;

use anyhow::Result;
use tracing::{info, warn};

use crate::error::X9Error;
use crate::scte35::Cue;

/// Ordered, deduplicated queue of out-of-band cues: `(insert_pts, cue)`
/// pairs merged from an operator maintained file and from cues parsed out
/// of the stream itself.
#[derive(Debug, Default)]
pub struct Sidecar {
    path: Option<PathBuf>,
    entries: VecDeque<(f64, String)>,
    last_raw: String,
}

impl Sidecar {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            ..Default::default()
        }
    }

    /// Reload the sidecar file. Skipped when the bytes match the previous
    /// reload. An insert PTS of 0 means "now". The file is truncated after
    /// a clean reload (append-and-forget for the operator); a reload with
    /// any bad line keeps the file so it can be fixed.
    pub fn load(&mut self, now: f64) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("cannot read sidecar {}: {}", path.display(), e);
                return Ok(());
            }
        };
        if raw == self.last_raw {
            return Ok(());
        }
        let mut clean = true;
        for line in raw.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            match Self::parse_line(line, now) {
                Ok((pts, cue)) => {
                    info!("loading sidecar cue {pts},{cue}");
                    self.insert(pts, cue);
                }
                Err(e) => {
                    warn!("{e}");
                    clean = false;
                }
            }
        }
        self.last_raw = raw;
        if clean {
            if let Err(e) = std::fs::write(&path, "") {
                warn!("cannot truncate sidecar {}: {}", path.display(), e);
            }
        }
        Ok(())
    }

    fn parse_line(line: &str, now: f64) -> Result<(f64, String), X9Error> {
        let (pts, cue) = line
            .split_once(',')
            .ok_or_else(|| X9Error::SidecarParse(line.to_string()))?;
        let mut pts: f64 = pts
            .trim()
            .parse()
            .map_err(|_| X9Error::SidecarParse(line.to_string()))?;
        let cue = cue.trim();
        Cue::decode_str(cue).map_err(|_| X9Error::SidecarParse(line.to_string()))?;
        if pts == 0.0 {
            pts = now;
        }
        Ok((pts, cue.to_string()))
    }

    /// Queue a cue, keeping the set deduplicated and sorted by PTS.
    pub fn insert(&mut self, pts: f64, cue: String) {
        if self.entries.iter().any(|(p, c)| *p == pts && *c == cue) {
            return;
        }
        self.entries.push_back((pts, cue));
        self.entries
            .make_contiguous()
            .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    }

    /// Remove and return the cues whose insert PTS falls inside the current
    /// segment window.
    pub fn take_due(&mut self, started: f64, now: f64) -> Vec<(f64, String)> {
        let mut due = Vec::new();
        self.entries.retain(|(pts, cue)| {
            if started <= *pts && *pts <= now {
                due.push((*pts, cue.clone()));
                false
            } else {
                true
            }
        });
        due
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scte35::{SpliceCommand, SpliceInsert};
    use tempfile::tempdir;

    fn cue_b64(pts: f64) -> String {
        Cue {
            pts_adjustment: 0,
            command: SpliceCommand::SpliceInsert(SpliceInsert {
                event_id: 1,
                out_of_network: true,
                pts_time: Some(pts),
                break_duration: Some(6.0),
                auto_return: true,
                ..Default::default()
            }),
            descriptors: vec![],
        }
        .encode_base64()
    }

    #[test]
    fn loads_sorts_and_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sidecar.txt");
        let body = format!(
            "# queued by operator\n9.0,{}\n3.0,{}  # early\n\n",
            cue_b64(9.0),
            cue_b64(3.0)
        );
        std::fs::write(&path, &body).unwrap();

        let mut sidecar = Sidecar::new(Some(path.clone()));
        sidecar.load(1.0).unwrap();
        assert_eq!(sidecar.len(), 2);
        let due = sidecar.take_due(0.0, 5.0);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].0, 3.0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn pts_zero_means_now() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sidecar.txt");
        std::fs::write(&path, format!("0,{}\n", cue_b64(0.0))).unwrap();

        let mut sidecar = Sidecar::new(Some(path));
        sidecar.load(42.5).unwrap();
        let due = sidecar.take_due(42.0, 43.0);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].0, 42.5);
    }

    #[test]
    fn repeated_reloads_do_not_duplicate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sidecar.txt");
        let body = format!("7.0,{}\n", cue_b64(7.0));

        let mut sidecar = Sidecar::new(Some(path.clone()));
        for _ in 0..3 {
            std::fs::write(&path, &body).unwrap();
            sidecar.load(1.0).unwrap();
        }
        assert_eq!(sidecar.len(), 1);
    }

    #[test]
    fn bad_lines_are_skipped_and_the_file_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sidecar.txt");
        let body = format!("not a pts\n5.0,{}\n", cue_b64(5.0));
        std::fs::write(&path, &body).unwrap();

        let mut sidecar = Sidecar::new(Some(path.clone()));
        sidecar.load(1.0).unwrap();
        assert_eq!(sidecar.len(), 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), body);
    }

    #[test]
    fn hex_cues_parse() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sidecar.txt");
        let cue = Cue::decode_str(&cue_b64(2.0)).unwrap();
        std::fs::write(&path, format!("2.0,{}\n", cue.encode_hex())).unwrap();

        let mut sidecar = Sidecar::new(Some(path));
        sidecar.load(1.0).unwrap();
        assert_eq!(sidecar.len(), 1);
    }
}
