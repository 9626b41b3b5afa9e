#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use lexprobe::lexicon::{ConceptRecord, KnowledgeError, KnowledgeSource, Pos, WordNet};
use lexprobe::model::{
    Logits, MaskedLmBackend, ModelError, OptimizerSettings, Seq2SeqBackend, Seq2SeqBatch, TokenBatch,
};
use lexprobe::store::{EntityStore, StoreError};
use lexprobe::tokenizer::{TokenVocab, TokenizerError};

// ============================================================================
// Store
// ============================================================================

#[derive(Default)]
pub struct MemoryStore {
    categories: Mutex<HashMap<String, Vec<String>>>,
    concepts: Mutex<HashMap<String, ConceptRecord>>,
    failing_categories: BTreeSet<String>,
}

impl MemoryStore {
    pub fn with_category(self, category: &str, entities: &[&str]) -> Self {
        if let Ok(mut categories) = self.categories.lock() {
            categories.insert(category.to_string(), entities.iter().map(|e| e.to_string()).collect());
        }
        self
    }

    pub fn failing_on(mut self, category: &str) -> Self {
        self.failing_categories.insert(category.to_string());
        self
    }

    pub fn concept(&self, entity: &str) -> Option<ConceptRecord> {
        self.concepts.lock().ok()?.get(entity).cloned()
    }
}

fn store_failure() -> StoreError {
    StoreError::Redis(redis::RedisError::from((redis::ErrorKind::IoError, "connection refused")))
}

impl EntityStore for MemoryStore {
    async fn category_entities(&self, category: &str) -> Result<Vec<String>, StoreError> {
        if self.failing_categories.contains(category) {
            return Err(store_failure());
        }
        Ok(self
            .categories
            .lock()
            .map(|c| c.get(category).cloned().unwrap_or_default())
            .unwrap_or_default())
    }

    async fn load_concept(&self, entity: &str) -> Result<Option<ConceptRecord>, StoreError> {
        Ok(self.concept(entity))
    }

    async fn save_concept(&self, entity: &str, record: &ConceptRecord) -> Result<(), StoreError> {
        if let Ok(mut concepts) = self.concepts.lock() {
            concepts.insert(entity.to_string(), record.clone());
        }
        Ok(())
    }
}

// ============================================================================
// Knowledge
// ============================================================================

/// Answers every lookup with `IsA: [term]` except for the configured failures.
#[derive(Default)]
pub struct StubKnowledge {
    pub failing: BTreeSet<String>,
    pub calls: AtomicUsize,
}

impl StubKnowledge {
    pub fn failing_on(terms: &[&str]) -> Self {
        Self {
            failing: terms.iter().map(|t| t.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl KnowledgeSource for StubKnowledge {
    async fn entity_information(&self, entity: &str, _update_db: bool) -> Result<ConceptRecord, KnowledgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(entity) {
            return Err(KnowledgeError::HttpStatus {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                body: "unavailable".to_string(),
            });
        }
        Ok(ConceptRecord {
            relations: BTreeMap::from([("IsA".to_string(), vec![entity.to_string()])]),
        })
    }
}

// ============================================================================
// Vocabulary
// ============================================================================

pub const PAD: u32 = 0;
pub const BOS: u32 = 1;
pub const EOS: u32 = 2;
pub const UNK: u32 = 3;
pub const MASK: u32 = 4;
const SPECIALS: [&str; 5] = ["<pad>", "<s>", "</s>", "<unk>", "<mask>"];

/// Whitespace vocabulary: one token per word, a trailing period split off.
pub struct WordVocab {
    tokens: Vec<String>,
    ids: HashMap<String, u32>,
}

impl WordVocab {
    pub fn new(words: &[&str]) -> Self {
        let mut tokens: Vec<String> = SPECIALS.iter().map(|s| s.to_string()).collect();
        tokens.push(".".to_string());
        for word in words {
            if !tokens.iter().any(|t| t == word) {
                tokens.push(word.to_string());
            }
        }
        let ids = tokens.iter().enumerate().map(|(i, t)| (t.clone(), i as u32)).collect();
        Self { tokens, ids }
    }

    pub fn id(&self, token: &str) -> u32 {
        self.convert_token_to_id(token)
    }
}

impl TokenVocab for WordVocab {
    fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Vec<u32>, TokenizerError> {
        let mut ids = Vec::new();
        if add_special_tokens {
            ids.push(BOS);
        }
        for word in text.split_whitespace() {
            match word.strip_suffix('.') {
                Some(stem) if !stem.is_empty() => {
                    ids.push(self.convert_token_to_id(stem));
                    ids.push(self.convert_token_to_id("."));
                }
                _ => ids.push(self.convert_token_to_id(word)),
            }
        }
        if add_special_tokens {
            ids.push(EOS);
        }
        Ok(ids)
    }

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, TokenizerError> {
        Ok(ids
            .iter()
            .filter(|&&id| !(skip_special_tokens && (id as usize) < SPECIALS.len()))
            .filter_map(|&id| self.tokens.get(id as usize).cloned())
            .collect::<Vec<_>>()
            .join(" "))
    }

    fn token_to_id(&self, token: &str) -> Option<u32> {
        self.ids.get(token).copied()
    }

    fn id_to_token(&self, id: u32) -> Option<String> {
        self.tokens.get(id as usize).cloned()
    }

    fn mask_token(&self) -> &str {
        "<mask>"
    }

    fn mask_token_id(&self) -> u32 {
        MASK
    }

    fn unk_token_id(&self) -> u32 {
        UNK
    }

    fn pad_token_id(&self) -> u32 {
        PAD
    }

    fn vocab_size(&self) -> usize {
        self.tokens.len()
    }
}

// ============================================================================
// Masked LM backend
// ============================================================================

const LOW_SCORE: f32 = -10.0;

/// Scores every position with the same row. The row comes from the first
/// trigger token found in the input, else from the default scores.
pub struct ScriptedMlm {
    vocab_size: usize,
    default: Vec<(u32, f32)>,
    triggers: Vec<(u32, Vec<(u32, f32)>)>,
    pub calls: AtomicUsize,
}

impl ScriptedMlm {
    pub fn new(vocab_size: usize) -> Self {
        Self {
            vocab_size,
            default: Vec::new(),
            triggers: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_default(mut self, scores: &[(u32, f32)]) -> Self {
        self.default = scores.to_vec();
        self
    }

    pub fn on_token(mut self, trigger: u32, scores: &[(u32, f32)]) -> Self {
        self.triggers.push((trigger, scores.to_vec()));
        self
    }

    fn row_for(&self, input: &[u32]) -> Vec<f32> {
        let scores = self
            .triggers
            .iter()
            .find(|(trigger, _)| input.contains(trigger))
            .map(|(_, scores)| scores)
            .unwrap_or(&self.default);
        let mut row = vec![LOW_SCORE; self.vocab_size];
        for &(id, score) in scores {
            if let Some(slot) = row.get_mut(id as usize) {
                *slot = score;
            }
        }
        row
    }
}

impl MaskedLmBackend for ScriptedMlm {
    async fn forward(&self, batch: &TokenBatch) -> Result<Logits, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let nested = batch
            .input_ids
            .iter()
            .map(|ids| {
                let row = self.row_for(ids);
                vec![row; ids.len()]
            })
            .collect();
        Logits::from_nested(nested)
    }
}

// ============================================================================
// Seq2seq backend
// ============================================================================

#[derive(Debug, Default)]
pub struct Seq2SeqLog {
    pub configured: Option<OptimizerSettings>,
    pub train_steps: usize,
    pub optimizer_steps: usize,
    pub validation_steps: usize,
    pub saved: Vec<PathBuf>,
    pub loaded: Vec<PathBuf>,
    pub seen_labels: Vec<Vec<i64>>,
}

/// Validation losses follow `val_losses` one per epoch; generation answers
/// every question with `answer`.
pub struct ScriptedSeq2Seq {
    val_losses: Vec<f32>,
    val_batches_per_epoch: usize,
    answer: Vec<u32>,
    pub log: Mutex<Seq2SeqLog>,
}

impl ScriptedSeq2Seq {
    pub fn new(val_losses: &[f32], val_batches_per_epoch: usize, answer: &[u32]) -> Self {
        Self {
            val_losses: val_losses.to_vec(),
            val_batches_per_epoch: val_batches_per_epoch.max(1),
            answer: answer.to_vec(),
            log: Mutex::new(Seq2SeqLog::default()),
        }
    }

    pub fn with_log<R>(&self, f: impl FnOnce(&Seq2SeqLog) -> R) -> R {
        let log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        f(&log)
    }

    fn update<R>(&self, f: impl FnOnce(&mut Seq2SeqLog) -> R) -> R {
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut log)
    }
}

impl Seq2SeqBackend for ScriptedSeq2Seq {
    async fn configure(&self, settings: &OptimizerSettings) -> Result<(), ModelError> {
        self.update(|log| log.configured = Some(settings.clone()));
        Ok(())
    }

    async fn train_step(&self, batch: &Seq2SeqBatch) -> Result<f32, ModelError> {
        self.update(|log| {
            log.train_steps += 1;
            log.seen_labels.extend(batch.labels.iter().cloned());
        });
        Ok(1.0)
    }

    async fn optimizer_step(&self) -> Result<(), ModelError> {
        self.update(|log| log.optimizer_steps += 1);
        Ok(())
    }

    async fn validation_step(&self, _batch: &Seq2SeqBatch) -> Result<f32, ModelError> {
        let step = self.update(|log| {
            log.validation_steps += 1;
            log.validation_steps - 1
        });
        let epoch = step / self.val_batches_per_epoch;
        Ok(self.val_losses.get(epoch).copied().unwrap_or(1.0))
    }

    async fn generate(
        &self,
        input_ids: &[Vec<u32>],
        _attention_mask: &[Vec<u32>],
        max_length: usize,
    ) -> Result<Vec<Vec<u32>>, ModelError> {
        let answer: Vec<u32> = self.answer.iter().copied().take(max_length).collect();
        Ok(vec![answer; input_ids.len()])
    }

    async fn save_checkpoint(&self, path: &Path) -> Result<(), ModelError> {
        std::fs::write(path, b"weights").map_err(|e| ModelError::Backend(e.to_string()))?;
        self.update(|log| log.saved.push(path.to_path_buf()));
        Ok(())
    }

    async fn load_checkpoint(&self, path: &Path) -> Result<(), ModelError> {
        self.update(|log| log.loaded.push(path.to_path_buf()));
        Ok(())
    }
}

// ============================================================================
// WordNet fixture
// ============================================================================

/// (offset, lemmas, parent offset)
const TAXONOMY: &[(u64, &[&str], Option<u64>)] = &[
    (100, &["entity"], None),
    (200, &["organism"], Some(100)),
    (300, &["animal", "beast"], Some(200)),
    (350, &["mammal"], Some(300)),
    (360, &["bird"], Some(300)),
    (370, &["fish"], Some(300)),
    (400, &["dog"], Some(350)),
    (410, &["cat"], Some(350)),
    (420, &["robin"], Some(360)),
    (430, &["trout"], Some(370)),
    (500, &["artifact"], Some(100)),
    (510, &["stone"], Some(100)),
];

pub fn wndb_noun_files() -> (String, String) {
    let mut data = String::from("  1 fixture taxonomy\n");
    let mut index = String::from("  1 fixture taxonomy\n");
    for (offset, lemmas, parent) in TAXONOMY {
        let words: Vec<String> = lemmas.iter().map(|l| format!("{l} 0")).collect();
        let pointers = match parent {
            Some(p) => format!("001 @ {p:08} n 0000"),
            None => "000".to_string(),
        };
        data.push_str(&format!(
            "{offset:08} 05 n {:02x} {} {pointers} | {} gloss\n",
            lemmas.len(),
            words.join(" "),
            lemmas[0]
        ));
        for lemma in lemmas.iter() {
            index.push_str(&format!("{lemma} n 1 1 @ 1 0 {offset:08}\n"));
        }
    }
    (index, data)
}

pub fn wordnet() -> WordNet {
    let (index, data) = wndb_noun_files();
    let mut wn = WordNet::default();
    wn.load_pos(Pos::Noun, &index, &data, None)
        .unwrap_or_else(|e| panic!("fixture wordnet: {e}"));
    wn
}

pub fn write_wordnet(dir: &Path) {
    let (index, data) = wndb_noun_files();
    std::fs::write(dir.join("index.noun"), index).unwrap_or_else(|e| panic!("index.noun: {e}"));
    std::fs::write(dir.join("data.noun"), data).unwrap_or_else(|e| panic!("data.noun: {e}"));
}
