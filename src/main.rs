//! Serve thumbnails of images

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use clap::Parser;

mod codec; // Image codec
mod config; // Process-wide configuration
mod format; // Image types
mod pipeline; // Decide, then decode/crop/scale/encode
mod primitive; // Primitives + essential dependencies
mod source; // Where input bytes come from
mod view; // Routing and the thumbnail view

#[cfg(test)]
mod codecpanic; // Codec that panics past the header
#[cfg(test)]
mod fixture; // Test images

use crate::{
    config::{ConfigOverrides, ViewConfig},
    primitive::anyhow::{self, Context},
    source::RealPath,
    view::AppState,
};

/// Serve thumbnails of the images under a directory, or of uploaded images.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// Directory served under /thumb/ (default: current directory)
    root: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "THUMBVIEW_BIND", default_value = "0.0.0.0:3000")]
    bind: SocketAddr,

    /// JSON config file
    #[arg(long, env = "THUMBVIEW_CONFIG")]
    config: Option<PathBuf>,

    /// Config file section to read
    #[arg(long, env = "THUMBVIEW_COMPONENT", default_value = config::COMPONENT)]
    component: String,

    #[command(flatten)]
    overrides: ConfigOverrides,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set up logging
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let config = ViewConfig::load(cli.config.as_deref(), &cli.component, &cli.overrides)?;
    tracing::info!("Configuration: {config:?}");

    let root = match cli.root {
        Some(root) => root,
        None => {
            tracing::info!("No root directory specified. Using current directory.");
            std::env::current_dir().context("current directory")?
        }
    };
    let root = RealPath::root(&root).await?;
    tracing::info!("Serving at {root:?}");

    let app = view::router(AppState {
        config: Arc::new(config),
        root,
    });

    tracing::info!("Listening on {}", cli.bind);
    axum::Server::try_bind(&cli.bind)
        .with_context(|| format!("binding {}", cli.bind))?
        .serve(app.into_make_service())
        .await
        .context("server")?;
    Ok(())
}
