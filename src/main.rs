use ai_tutor::{
    api::{self, AppState},
    config,
    embedding::EmbeddingProviders,
    extract::PdfExtractor,
    gemini::GeminiTransport,
    generation::GeminiGenerationClient,
    logging,
    processing::{TutorService, TutorSettings},
    queue::{QueueGateway, RedisListStore},
};
use anyhow::Context;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::init_config().context("Failed to load configuration")?;
    logging::init_tracing(config.debug);
    tracing::debug!(
        redis = %config.redis_url(),
        queue = %config.queue_name,
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        generation_model = %config.generation_model,
        "Loaded configuration"
    );

    let transport = GeminiTransport::new(&config.gemini_base_url, &config.google_api_key)
        .context("Failed to build Gemini client")?;
    let embeddings = EmbeddingProviders::from_config(config, &transport);
    let generator = Arc::new(GeminiGenerationClient::new(
        transport,
        &config.generation_model,
        Some(config.generation_temperature),
    ));
    let tutor = TutorService::new(TutorSettings::from_config(config), embeddings, generator)
        .context("Failed to configure tutor service")?;
    let store = RedisListStore::from_config(config).context("Failed to configure Redis")?;

    let state = AppState {
        tutor: Arc::new(tutor),
        extractor: Arc::new(PdfExtractor::new()),
        queue: QueueGateway::new(Arc::new(store), config.queue_name.clone()),
        port: config.server_port,
    };
    let app = api::create_router(state, config.upload_limit_bytes);

    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.server_port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.server_port))?;
    tracing::info!("Listening on http://0.0.0.0:{}", config.server_port);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
