use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_MODEL: &str = "roberta-large";
const DEFAULT_REDIS_HOST: &str = "127.0.0.1";
const DEFAULT_REDIS_PORT: u16 = 6379;
const DEFAULT_BACKEND_ENDPOINT: &str = "http://127.0.0.1:8500";
const DEFAULT_CONCEPTNET_ENDPOINT: &str = "https://api.conceptnet.io";
const DEFAULT_TESTS_PATH: &str = "config/overgeneralization_tests.json";
const DEFAULT_SWEEP_TOP_K: usize = 20;
const DEFAULT_METRIC_TOP_K: usize = 1000;
const DEFAULT_LOOKUP_BACKOFF_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeTask {
    Preprocess,
    CategorySweep,
    MultipleChoice,
    SingleAnswer,
}

impl ProbeTask {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "preprocess" => Some(Self::Preprocess),
            "category-sweep" | "sweep" => Some(Self::CategorySweep),
            "mc-overgeneralization" | "multiple-choice" => Some(Self::MultipleChoice),
            "overgeneralization" | "single-answer" => Some(Self::SingleAnswer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preprocess => "preprocess",
            Self::CategorySweep => "category-sweep",
            Self::MultipleChoice => "mc-overgeneralization",
            Self::SingleAnswer => "overgeneralization",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub model_name: String,
    pub multi_choice: bool,
    pub task: ProbeTask,
    pub log_level: String,
    pub redis_url: String,
    pub backend_endpoint: String,
    pub conceptnet_endpoint: String,
    pub wordnet_dir: PathBuf,
    pub model_cache_dir: Option<PathBuf>,
    pub artifact_root: PathBuf,
    pub tests_path: PathBuf,
    pub test_name: Option<String>,
    pub categories: Vec<String>,
    pub sweep_top_k: usize,
    pub metric_top_k: usize,
    pub lookup_backoff: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let model_name = env_string("PROBE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let task = env_string("PROBE_TASK")
            .and_then(|v| ProbeTask::from_str(&v))
            .unwrap_or(ProbeTask::MultipleChoice);

        let categories = env_string("PROBE_CATEGORIES")
            .map(|v| split_list(&v))
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| vec!["animal".to_string()]);

        let wordnet_dir = env_string("WORDNET_DIR")
            .map(PathBuf::from)
            .or_else(|| dirs::data_dir().map(|d| d.join("wordnet")))
            .unwrap_or_else(|| PathBuf::from("wordnet"));

        Self {
            model_name,
            multi_choice: env_bool("PROBE_MULTI_CHOICE").unwrap_or(true),
            task,
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            redis_url: redis_url_from_env(),
            backend_endpoint: env_string("MODEL_BACKEND_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_BACKEND_ENDPOINT.to_string()),
            conceptnet_endpoint: env_string("CONCEPTNET_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_CONCEPTNET_ENDPOINT.to_string()),
            wordnet_dir,
            model_cache_dir: env_string("MODEL_CACHE_DIR").map(PathBuf::from),
            artifact_root: env_string("ARTIFACT_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            tests_path: env_string("PROBE_TESTS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TESTS_PATH)),
            test_name: env_string("PROBE_TEST_NAME"),
            categories,
            sweep_top_k: env_usize("PROBE_SWEEP_TOP_K").unwrap_or(DEFAULT_SWEEP_TOP_K),
            metric_top_k: env_usize("PROBE_METRIC_TOP_K").unwrap_or(DEFAULT_METRIC_TOP_K),
            lookup_backoff: Duration::from_secs(
                env_u64("LOOKUP_BACKOFF_SECS").unwrap_or(DEFAULT_LOOKUP_BACKOFF_SECS),
            ),
        }
    }
}

/// `REDIS_URL` wins; otherwise the URL is assembled from host, port and password.
pub fn redis_url_from_env() -> String {
    if let Some(url) = env_string("REDIS_URL") {
        return url;
    }
    let host = env_string("REDIS_HOST").unwrap_or_else(|| DEFAULT_REDIS_HOST.to_string());
    let port = env_string("REDIS_PORT")
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(DEFAULT_REDIS_PORT);
    build_redis_url(&host, port, env_string("REDIS_PASSWORD").as_deref())
}

pub fn build_redis_url(host: &str, port: u16, password: Option<&str>) -> String {
    match password {
        Some(pw) => format!("redis://:{}@{host}:{port}/", urlencoding::encode(pw)),
        None => format!("redis://{host}:{port}/"),
    }
}

pub(crate) fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn env_u64(key: &str) -> Option<u64> {
    env_string(key)?.parse().ok()
}

pub(crate) fn env_usize(key: &str) -> Option<usize> {
    env_string(key)?.parse().ok()
}

pub(crate) fn env_f64(key: &str) -> Option<f64> {
    env_string(key)?.parse().ok()
}

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|v| v == "true" || v == "1")
}

pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
