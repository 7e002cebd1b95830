#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::available_parallelism;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, info_span, Instrument};

use lux_runtime::run::{run, RunConfig};
use lux_trace::ppm::write_ppm;
use lux_trace::renderer::Renderer;
use lux_trace::scene::Scene;

#[derive(Debug, Parser)]
#[command(name = "lux")]
struct Args {
    /// Image width in pixels.
    #[arg(long, env = "LUX_WIDTH", default_value_t = 320)]
    width: u32,

    /// Image height in pixels.
    #[arg(long, env = "LUX_HEIGHT", default_value_t = 200)]
    height: u32,

    /// Monte-Carlo samples per subpixel (each pixel has 2x2 subpixels).
    #[arg(long, env = "LUX_SAMPLES", default_value_t = 200)]
    samples: u32,

    /// Number of cooperating workers. Defaults to the number of CPUs.
    #[arg(long, env = "LUX_WORKERS")]
    workers: Option<u32>,

    /// Run seed; the image is a pure function of the seed and dimensions.
    #[arg(long, env = "LUX_SEED", default_value_t = 0)]
    seed: u64,

    /// Output PPM path.
    #[arg(long, env = "LUX_OUTPUT", default_value = "image.ppm")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    lux_observe::logging::init_tracing();

    let args = Args::parse();
    let workers = match args.workers {
        Some(w) => w,
        None => available_parallelism()
            .context("cannot determine available parallelism; set LUX_WORKERS")?
            .get() as u32,
    };

    let span = info_span!(
        "lux",
        width = args.width,
        height = args.height,
        samples = args.samples,
        workers,
        seed = args.seed
    );
    async move {
        info!("starting render");

        let renderer = Renderer::new(
            Scene::cornell(),
            args.width,
            args.height,
            args.samples,
            args.seed,
        );
        let items = renderer.item_count();
        let output = run(RunConfig { items, workers }, Arc::new(renderer)).await?;
        output.metrics.emit_snapshot();

        let file = File::create(&args.output)
            .with_context(|| format!("cannot create {}", args.output.display()))?;
        let mut writer = BufWriter::new(file);
        write_ppm(&mut writer, args.width, args.height, &output.image)
            .with_context(|| format!("cannot write {}", args.output.display()))?;

        info!(path = %args.output.display(), "image written");
        Ok(())
    }
    .instrument(span)
    .await
}
