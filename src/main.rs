use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use imdl_rs::{model, web, Config, Device, Predictor};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_target(false)
        .init();

    tracing::info!("Starting Image Manipulation Detection API...");

    let device = Device::select(config.device, config.device_id);
    tracing::info!("Using device: {}", device);

    let predictor = Arc::new(Predictor::new(device));
    let (classifier, segmenter) =
        model::load_models(&config, device).context("Failed to load models")?;
    predictor.install(Arc::new(classifier), Arc::new(segmenter))?;

    if config.check {
        println!("device: {}", device);
        println!("classifier: {}", config.classifier_model.display());
        println!("segmenter: {}", config.segmenter_model.display());
        println!("input size: {}x{}", config.image_size, config.image_size);
        println!("models loaded: {}", predictor.is_loaded());
        return Ok(());
    }

    web::serve(config, predictor).await?;

    Ok(())
}
