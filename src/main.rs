use lexprobe::config::{Config, ProbeTask};
use lexprobe::lexicon::{ConceptNetClient, WordNet};
use lexprobe::logging::init_tracing;
use lexprobe::model::{MaskedLanguageModel, RemoteBackend};
use lexprobe::registry::ModelRegistry;
use lexprobe::report::ArtifactLayout;
use lexprobe::store::RedisStore;
use lexprobe::{ProbeRun, RunError};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let log_guard = init_tracing(&config.log_level, "lexprobe");

    if let Err(e) = run(&config).await {
        tracing::error!(error = %e, task = config.task.as_str(), "probe run failed");
        drop(log_guard);
        std::process::exit(1);
    }
}

async fn run(config: &Config) -> Result<(), RunError> {
    let registry = ModelRegistry::new(config.model_cache_dir.clone())?;
    let (tokenizer, model_config) = registry.load(&config.model_name).await?;
    if !tokenizer.has_mask_token() {
        tracing::warn!(model = %config.model_name, "tokenizer has no mask token, falling back to unk");
    }

    let store = RedisStore::connect(&config.redis_url).await?;
    if !store.is_connected().await {
        tracing::warn!("redis did not answer PING");
    }

    // the multiple-choice battery only needs the saved groups
    let wordnet = match config.task {
        ProbeTask::Preprocess | ProbeTask::SingleAnswer => WordNet::open(&config.wordnet_dir)?,
        ProbeTask::CategorySweep | ProbeTask::MultipleChoice => WordNet::default(),
    };
    let knowledge = ConceptNetClient::new(store.clone(), &config.conceptnet_endpoint);
    let backend = RemoteBackend::new(&config.backend_endpoint, &config.model_name);
    let model = MaskedLanguageModel::new(backend, tokenizer, &config.model_name, config.multi_choice)
        .with_vocab_size(model_config.vocab_size);

    ProbeRun {
        config,
        model: &model,
        store: &store,
        knowledge: &knowledge,
        wordnet: &wordnet,
        layout: ArtifactLayout::new(&config.artifact_root),
    }
    .run()
    .await
}
