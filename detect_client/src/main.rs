use anyhow::Context;
use clap::Parser;
use detect_client::{log_detections, save_outcome, DetectClient};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Sends an image to a YOLO detection server and saves what comes back.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server endpoint
    #[arg(long, default_value = "http://127.0.0.1:50054", value_name = "URL")]
    address: String,

    /// Image to run detection on
    #[arg(long, value_name = "FILE")]
    image: PathBuf,

    /// Where the annotated image and the JSON export are written
    #[arg(long, default_value = "client", value_name = "DIR")]
    output_dir: PathBuf,

    #[arg(long, default_value_t = 100, value_name = "MB")]
    max_message_size_mb: usize,

    #[arg(long, default_value_t = 10)]
    max_retries: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json().with_level(true))
        .init();

    let args = Args::parse();

    let mut client = DetectClient::connect(
        args.address.clone(),
        args.max_retries,
        args.max_message_size_mb * 1024 * 1024,
    )
    .await
    .with_context(|| format!("could not reach {}", args.address))?;

    let outcome = client
        .detect_file(&args.image)
        .await
        .with_context(|| format!("detection failed for {:?}", args.image))?;
    log_detections(&outcome.result);

    let stem = args
        .image
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let (image_path, json_path) = save_outcome(&outcome, &args.output_dir, stem)?;
    tracing::info!("Saved {:?} and {:?}", image_path, json_path);

    Ok(())
}
