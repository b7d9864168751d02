use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use x9k3::segmenter::Segmenter;
use x9k3::settings::{Args, Settings};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let settings = Settings::from_args(args)?;
    info!(
        "segmenting {} into {}",
        settings.input,
        settings.output_dir.display()
    );

    let mut segmenter = Segmenter::new(settings)?;
    segmenter.run()
}
