use anyhow::Context;
use docjobs::{
    api,
    config::Config,
    embedding::build_embedding_client,
    index::{MarkdownLoader, VectorIndexer},
    jobs::{Collaborators, JobService, JobSettings},
    logging,
    preprocess::CommandPreprocessor,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();
    let config = Config::load().context("Failed to load configuration")?;

    let embedder = build_embedding_client(&config).context("Failed to build embedding client")?;
    let indexer = VectorIndexer::new(&config, embedder).context("Failed to build indexer")?;
    indexer
        .ensure_ready()
        .await
        .context("Failed to prepare vector collection")?;

    let collaborators = Collaborators {
        preprocessor: Arc::new(CommandPreprocessor::new(
            config.preprocessor_command.clone(),
            config.preprocessor_timeout,
        )),
        loader: Arc::new(MarkdownLoader),
        indexer: Arc::new(indexer),
    };
    let service = JobService::new(JobSettings::from(&config), collaborators);
    let app = api::create_router(Arc::new(service));

    let (listener, port) = bind_listener(config.server_port)
        .await
        .context("Failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

async fn bind_listener(server_port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}
