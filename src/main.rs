use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use verbatim_adapters::groq::GroqAdapter;
use verbatim_adapters::openai::OpenAiAdapter;
use verbatim_adapters::pyannote::PyannoteAdapter;
use verbatim_adapters::voxtral::VoxtralAdapter;
use verbatim_adapters::ModelRegistry;
use verbatim_audio::Transcoder;
use verbatim_events::{JobBroadcaster, WebhookDispatcher};
use verbatim_llm::ChatClient;
use verbatim_pipeline::{JobProcessor, ModelDefaults, PipelineConfig, ProcessingPipeline};
use verbatim_server::{AppState, ServerConfig, StaticTokenVerifier};
use verbatim_settings::Settings;
use verbatim_store::{Database, ExecutionRepo, JobRepo};
use verbatim_stream::{ChunkProcessor, QuickJobStore, SessionFinalizer};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    verbatim_telemetry::init_logging();
    let settings = Settings::from_env();

    for dir in [&settings.upload_dir, &settings.output_dir, &settings.temp_dir] {
        if let Err(e) = std::fs::create_dir_all(dir) {
            error!(dir = %dir.display(), error = %e, "failed to create data directory");
            return std::process::ExitCode::FAILURE;
        }
    }

    let db = match Database::open(&settings.database_path) {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "failed to open database");
            return std::process::ExitCode::FAILURE;
        }
    };
    let jobs = JobRepo::new(db.clone());
    let executions = ExecutionRepo::new(db);

    let mut registry = ModelRegistry::new();
    registry.register_transcription(Arc::new(GroqAdapter::new(settings.groq_api_key.clone())));
    registry.register_transcription(Arc::new(OpenAiAdapter::new(settings.openai_api_key.clone())));
    registry.register_transcription(Arc::new(VoxtralAdapter::new(settings.mistral_api_key.clone())));
    registry.register_diarization(Arc::new(PyannoteAdapter::new()));
    let registry = Arc::new(registry);

    let init_failures = registry.initialize_models().await;
    if !init_failures.is_empty() {
        warn!(count = init_failures.len(), "some models failed to initialize");
    }
    for (model, ready) in registry.model_status().await {
        info!(model = %model, ready, "model status");
    }

    let broadcaster = Arc::new(JobBroadcaster::new());
    let webhooks = Arc::new(WebhookDispatcher::new());
    let transcoder = Transcoder::default();

    let pipeline_config = PipelineConfig {
        output_dir: settings.output_dir.clone(),
        temp_dir: settings.temp_dir.clone(),
        defaults: ModelDefaults {
            transcription: settings.default_transcription_model.clone(),
            diarization: settings.default_diarization_model.clone(),
        },
    };
    let mut pipeline = ProcessingPipeline::new(
        Arc::clone(&registry),
        jobs.clone(),
        executions,
        Arc::clone(&broadcaster),
        webhooks,
        transcoder.clone(),
        pipeline_config,
    );
    if let Some(key) = settings.groq_api_key.clone() {
        pipeline = pipeline.with_llm(ChatClient::groq(key));
    }
    let pipeline = Arc::new(pipeline);
    let processor: Arc<dyn JobProcessor> = Arc::new(Arc::clone(&pipeline));

    let quick_store = match QuickJobStore::new(settings.upload_dir.join("quick_transcriptions")) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "failed to create quick transcription directory");
            return std::process::ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    let expiry_task = tokio::spawn(Arc::clone(&quick_store).run_expiry(
        settings.expiry_interval(),
        shutdown.clone(),
    ));

    let chunks = Arc::new(ChunkProcessor::new(
        Arc::clone(&quick_store),
        jobs.clone(),
        processor,
        settings.upload_dir.clone(),
    ));
    let finalizer = Arc::new(SessionFinalizer::new(
        settings.upload_dir.clone(),
        transcoder,
        jobs.clone(),
    ));

    let Some(stream_token) = settings.stream_token.clone() else {
        error!("VERBATIM_STREAM_TOKEN must be set to accept streaming connections");
        return std::process::ExitCode::FAILURE;
    };

    let state = AppState {
        upload_root: settings.upload_dir.clone(),
        jobs,
        verifier: Arc::new(StaticTokenVerifier::new(stream_token, "default")),
        chunks,
        finalizer,
    };

    let server = match verbatim_server::start(ServerConfig { port: settings.server_port }, state).await {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "failed to start server");
            return std::process::ExitCode::FAILURE;
        }
    };

    info!(port = server.port, "verbatim ready");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutting down");

    shutdown.cancel();
    server.shutdown();
    server.drain().await;
    let _ = expiry_task.await;

    std::process::ExitCode::SUCCESS
}
