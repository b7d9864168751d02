use std::path::PathBuf;
use thiserror::Error;

/// Failure classes of the segmenter pipeline.
///
/// Recovery is local wherever a single record is defective; failures to
/// persist output are fatal because playlist consistency cannot be
/// guaranteed after a partial write.
#[derive(Debug, Error)]
pub enum X9Error {
    /// Input could not be opened or read. Fatal unless replay mode reopens
    /// the source at loop head.
    #[error("input source error: {0}")]
    SourceIo(#[from] std::io::Error),

    /// MPEG-TS sync loss that could not be recovered before end of input.
    #[error("lost MPEG-TS sync and hit end of input")]
    BadPacket,

    /// Malformed SCTE-35 payload. The cue is dropped, state unchanged.
    #[error("undecodable SCTE-35 cue: {0}")]
    CueDecode(String),

    /// Malformed sidecar line. The line is skipped and the file kept.
    #[error("bad sidecar line: {0}")]
    SidecarParse(String),

    /// Segment or playlist persistence failure.
    #[error("failed writing {}: {source}", path.display())]
    WriteIo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// continue-m3u8 combined with iframe-only or byterange output.
    #[error("cannot continue an index.m3u8 as iframe-only or byterange hls")]
    ContinueIncompatible,
}
