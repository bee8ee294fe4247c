mod aggregate;
mod api;
mod chart;
mod dashboard;
mod dataset;
mod filter;
mod settings;
mod web;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::{
    dashboard::DatasetState,
    dataset::Dataset,
    settings::{Args, Settings},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let settings =
        Settings::from_file(args.config.as_deref()).context("Problem while loading settings")?;

    let loaded = Dataset::load(&settings.dataset.path, settings.dataset.score_range());
    match &loaded {
        Ok(dataset) => info!(
            "Loaded {} patient records from {}",
            dataset.len(),
            settings.dataset.path.display()
        ),
        Err(e) => error!("Problem while loading dataset. {e}"),
    }

    let schema = api::schema(
        DatasetState::from(loaded),
        settings.dashboard.aggregate_options(),
    );
    web::serve(schema, settings.web.address, args.cert.zip(args.key)).await;
    Ok(())
}
