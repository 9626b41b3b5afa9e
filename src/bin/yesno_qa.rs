use lexprobe::logging::init_tracing;
use lexprobe::model::RemoteBackend;
use lexprobe::qa::{evaluate_all, train_model, QaConfig, QaError};
use lexprobe::registry::ModelRegistry;
use lexprobe::report::ArtifactLayout;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = QaConfig::from_env();
    let log_guard = init_tracing(&config.log_level, "yesno-qa");

    if let Err(e) = run(&config).await {
        tracing::error!(error = %e, train = config.train, "yes/no qa run failed");
        drop(log_guard);
        std::process::exit(1);
    }
}

async fn run(config: &QaConfig) -> Result<(), QaError> {
    tracing::info!(?config, "starting yes/no qa run");
    let registry = ModelRegistry::new(config.model_cache_dir.clone())?;
    let (tokenizer, _) = registry.load(&config.model_name).await?;
    let backend = RemoteBackend::new(&config.backend_endpoint, &config.model_name);
    let layout = ArtifactLayout::new(&config.artifact_root);

    if config.train {
        let history = train_model(&backend, &tokenizer, config, &layout).await?;
        if let Some(best) = history.best_validation() {
            tracing::info!(epoch = best.epoch, val_loss = best.loss, "training finished");
        }
    } else {
        for report in evaluate_all(&backend, &tokenizer, config, &layout).await? {
            tracing::info!(
                test_file = %report.test_file.display(),
                correct = report.correct,
                total = report.total,
                accuracy = report.accuracy(),
                "accuracy"
            );
        }
    }
    Ok(())
}
