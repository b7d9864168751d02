pub mod error;
pub mod hls;
pub mod ingress;
pub mod mpegts;
pub mod playlist;
pub mod scte35;
pub mod segmenter;
pub mod settings;
pub mod sidecar;
#[cfg(test)]
pub mod testutil;
pub mod timer;
