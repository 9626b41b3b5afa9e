mod common;

use std::path::{Path, PathBuf};

use common::{ScriptedSeq2Seq, WordVocab, PAD};
use lexprobe::model::IGNORE_INDEX;
use lexprobe::qa::checkpoint::checkpoint_name;
use lexprobe::qa::trainer::{EpochLoss, TRAINING_LOSS_FILE, VALIDATION_LOSS_FILE};
use lexprobe::qa::{evaluate_all, train_model, QaConfig, YesNoDataset};
use lexprobe::report::artifacts::{read_csv_column, read_json};
use lexprobe::report::ArtifactLayout;

const WORDS: &[&str] = &["Can", "a", "robin", "dog", "trout", "fly?", "swim?", "Yes", "No"];

const TRAIN: &str = "question,label\n\
Can a robin fly?,Yes\n\
Can a dog fly?,No\n\
Can a trout swim?,Yes\n\
Can a dog swim?,Yes\n\
Can a trout fly?,No\n";

const DEV: &str = "question,label\nCan a robin swim?,No\nCan a robin fly?,Yes\n";

fn vocab() -> WordVocab {
    WordVocab::new(WORDS)
}

fn write(root: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdir");
    }
    std::fs::write(&path, contents).expect("write");
    PathBuf::from(relative)
}

fn config(root: &Path) -> QaConfig {
    QaConfig {
        artifact_root: root.to_path_buf(),
        train_data: write(root, "csv/train.csv", TRAIN),
        dev_data: write(root, "csv/dev.csv", DEV),
        test_files: vec![write(root, "csv/can_fly_questions.csv", DEV)],
        max_epochs: 4,
        batch_size: 2,
        max_length: 8,
        gradient_accumulation_steps: 2,
        save_top_k: 2,
        ..QaConfig::default()
    }
}

// ============================================================================
// Dataset
// ============================================================================

#[test]
fn dataset_pads_questions_and_labels() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("train.csv");
    std::fs::write(&path, TRAIN).expect("csv");
    let vocab = vocab();

    let dataset = YesNoDataset::load(&path, &vocab, 8).expect("dataset");
    assert_eq!(dataset.len(), 5);
    assert_eq!(dataset.yes_count(), 3);
    assert_eq!(dataset.no_count(), 2);

    let sample = &dataset.samples()[0];
    assert_eq!(sample.input_ids.len(), 8);
    assert_eq!(sample.attention_mask, vec![1, 1, 1, 1, 1, 1, 0, 0]);
    assert_eq!(&sample.labels[..3], &[vocab.id("Yes"), vocab.id("</s>"), PAD]);
}

#[test]
fn empty_dataset_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("empty.csv");
    std::fs::write(&path, "question,label\n").expect("csv");
    assert!(YesNoDataset::load(&path, &vocab(), 8).is_err());
}

// ============================================================================
// Training
// ============================================================================

#[tokio::test]
async fn training_keeps_best_checkpoints_and_histories() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(dir.path());
    let layout = ArtifactLayout::new(dir.path());
    let backend = ScriptedSeq2Seq::new(&[0.9, 0.5, 0.7, 0.3], 1, &[]);

    let history = train_model(&backend, &vocab(), &config, &layout).await.expect("training");

    backend.with_log(|log| {
        // 3 batches per epoch, stepping after the 2nd and the trailing one
        assert_eq!(log.train_steps, 12);
        assert_eq!(log.optimizer_steps, 8);
        assert_eq!(log.configured.as_ref().map(|s| s.total_steps), Some(8));
        assert_eq!(log.saved.len(), 4);
        assert!(log.seen_labels.iter().all(|row| row.iter().all(|&id| id != PAD as i64)));
        assert!(log.seen_labels.iter().all(|row| row.contains(&IGNORE_INDEX)));
    });

    let mut kept: Vec<String> = std::fs::read_dir(layout.checkpoint_dir())
        .expect("checkpoint dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    kept.sort();
    assert_eq!(kept, vec![checkpoint_name(1, 4), checkpoint_name(3, 8)]);

    assert_eq!(history.best_validation().map(|e| e.epoch), Some(3));
    let validation: Vec<EpochLoss> = read_json(&layout.json(VALIDATION_LOSS_FILE)).expect("validation json");
    assert_eq!(validation.iter().map(|e| e.loss).collect::<Vec<_>>(), vec![0.9, 0.5, 0.7, 0.3]);
    let training: Vec<EpochLoss> = read_json(&layout.json(TRAINING_LOSS_FILE)).expect("training json");
    assert_eq!(training.len(), 4);
}

#[tokio::test]
async fn training_resumes_from_checkpoint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = config(dir.path());
    config.max_epochs = 1;
    config.checkpoint = Some(PathBuf::from("checkpoint/old.ckpt"));
    let layout = ArtifactLayout::new(dir.path());
    let backend = ScriptedSeq2Seq::new(&[0.4], 1, &[]);

    train_model(&backend, &vocab(), &config, &layout).await.expect("training");
    backend.with_log(|log| {
        assert_eq!(log.loaded, vec![dir.path().join("checkpoint/old.ckpt")]);
    });
}

// ============================================================================
// Evaluation
// ============================================================================

#[tokio::test]
async fn evaluation_compares_decoded_answers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(dir.path());
    let layout = ArtifactLayout::new(dir.path());
    let vocab = vocab();
    // decoder start token followed by "Yes"
    let backend = ScriptedSeq2Seq::new(&[], 1, &[PAD, vocab.id("Yes"), vocab.id("No")]);

    let reports = evaluate_all(&backend, &vocab, &config, &layout).await.expect("evaluation");
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.total, 2);
    assert_eq!(report.correct, 1);
    assert_eq!(report.accuracy(), 0.5);

    assert_eq!(report.results_path, dir.path().join("csv/results/can_fly_questions_result.csv"));
    assert_eq!(read_csv_column(&report.results_path, "model_answer").expect("answers"), vec!["Yes", "Yes"]);
    assert_eq!(read_csv_column(&report.results_path, "true_answer").expect("labels"), vec!["No", "Yes"]);
    assert_eq!(
        read_csv_column(&report.results_path, "question").expect("questions"),
        vec!["Can a robin swim?", "Can a robin fly?"]
    );
}
