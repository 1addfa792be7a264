//! Exposes the command line application.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use vitrine_assets::config::Config;
use vitrine_assets::logging;
use vitrine_assets::{AssetKind, AssetRequest, AssetService, DecodeOptions};

/// Vitrine commands.
#[derive(clap::Subcommand)]
enum Command {
    /// Load the given assets into the cache and report per-item results.
    Warm {
        /// Asset sources: local paths or http(s) URLs.
        #[arg(required = true, value_name = "SOURCE")]
        sources: Vec<String>,

        /// Generate mip chains for texture sources.
        #[arg(long)]
        mips: bool,
    },
}

/// Command line interface parser.
#[derive(Parser)]
#[command(bin_name = "vitrine", version)]
struct Cli {
    /// Path to your configuration file.
    #[arg(long = "config", short = 'c', global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Returns the path to the configuration file.
    fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

/// Runs the main application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::get(cli.config()).context("failed loading config")?;

    // SAFETY: we did not spawn any threads up to this point.
    unsafe { logging::init_logging(&config) };

    match cli.command {
        Command::Warm { sources, mips } => warm(config, sources, mips),
    }
}

fn warm(config: Config, sources: Vec<String>, mips: bool) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create the runtime")?;

    runtime.block_on(async move {
        let service = AssetService::new(&config);
        let failed = warm_sources(&service, &sources, mips).await;
        service.shutdown().await;

        if failed > 0 {
            anyhow::bail!("{failed} of {} assets failed to load", sources.len());
        }
        Ok(())
    })
}

/// Preloads every source and returns the number of failures.
async fn warm_sources(service: &AssetService, sources: &[String], mips: bool) -> usize {
    let requests: Vec<_> = sources
        .iter()
        .map(|source| request_for(source, mips))
        .collect();
    let results = service.preload(&requests).await;

    let mut failed = 0;
    for (request, result) in requests.iter().zip(results) {
        match result {
            Ok(handle) => {
                tracing::info!(source = %request.source, kind = %handle.kind(), "asset loaded")
            }
            Err(error) => {
                failed += 1;
                tracing::error!(source = %request.source, error = %error, "asset failed to load");
            }
        }
    }
    failed
}

fn request_for(source: &str, mips: bool) -> AssetRequest {
    match infer_kind(source) {
        AssetKind::Model => AssetRequest::model(source),
        AssetKind::Texture => AssetRequest::texture(
            source,
            DecodeOptions {
                generate_mips: mips,
                ..Default::default()
            },
        ),
    }
}

/// Guesses the asset kind from the source's file extension.
fn infer_kind(source: &str) -> AssetKind {
    let extension = source
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    match extension.as_str() {
        "glb" | "gltf" => AssetKind::Model,
        _ => AssetKind::Texture,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_kind() {
        assert_eq!(infer_kind("models/sofa.glb"), AssetKind::Model);
        assert_eq!(infer_kind("models/chair.GLTF"), AssetKind::Model);
        assert_eq!(infer_kind("materials/oak.png"), AssetKind::Texture);
        assert_eq!(infer_kind("no-extension"), AssetKind::Texture);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_warm_reports_failures_per_source() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("fabric.png");
        image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 0, 255, 255]))
            .save_with_format(&good, image::ImageFormat::Png)
            .unwrap();

        let sources = vec![
            good.to_string_lossy().into_owned(),
            dir.path().join("missing.png").to_string_lossy().into_owned(),
        ];

        let service = AssetService::new(&Config::default());
        let failed = warm_sources(&service, &sources, false).await;
        assert_eq!(failed, 1);
        assert_eq!(service.cache().stats().entries, 1);
        service.shutdown().await;
    }
}
