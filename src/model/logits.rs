use super::ModelError;

/// Dense `[batch, seq_len, vocab_size]` logits, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Logits {
    batch: usize,
    seq_len: usize,
    vocab_size: usize,
    data: Vec<f32>,
}

impl Logits {
    pub fn new(batch: usize, seq_len: usize, vocab_size: usize, data: Vec<f32>) -> Result<Self, ModelError> {
        let expected = batch * seq_len * vocab_size;
        if data.len() != expected {
            return Err(ModelError::Shape {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            batch,
            seq_len,
            vocab_size,
            data,
        })
    }

    /// Builds from nested `[batch][position][vocab]` vectors. Every sequence
    /// must match the first one's length and every row its width.
    pub fn from_nested(nested: Vec<Vec<Vec<f32>>>) -> Result<Self, ModelError> {
        let batch = nested.len();
        let seq_len = nested.first().map_or(0, Vec::len);
        let vocab_size = nested
            .first()
            .and_then(|seq| seq.first())
            .map_or(0, Vec::len);

        for (sequence, positions) in nested.iter().enumerate() {
            if positions.len() != seq_len {
                return Err(ModelError::RaggedLogits {
                    sequence,
                    position: None,
                    expected: seq_len,
                    actual: positions.len(),
                });
            }
            if let Some((position, row)) = positions.iter().enumerate().find(|(_, row)| row.len() != vocab_size) {
                return Err(ModelError::RaggedLogits {
                    sequence,
                    position: Some(position),
                    expected: vocab_size,
                    actual: row.len(),
                });
            }
        }

        let data: Vec<f32> = nested.into_iter().flatten().flatten().collect();
        Self::new(batch, seq_len, vocab_size, data)
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn row(&self, batch: usize, position: usize) -> Option<&[f32]> {
        if batch >= self.batch || position >= self.seq_len {
            return None;
        }
        let start = (batch * self.seq_len + position) * self.vocab_size;
        self.data.get(start..start + self.vocab_size)
    }
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return vec![0.0; logits.len()];
    }
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Softmax with every id outside `legal` forced to probability zero.
pub fn restricted_softmax(logits: &[f32], legal: &[u32]) -> Vec<f32> {
    let mut masked = vec![f32::NEG_INFINITY; logits.len()];
    for &id in legal {
        if let Some(&value) = logits.get(id as usize) {
            masked[id as usize] = value;
        }
    }
    softmax(&masked)
}

/// The `k` most probable ids, highest first; equal probabilities keep the lower id first.
pub fn top_k(probabilities: &[f32], k: usize) -> Vec<(u32, f32)> {
    let mut ranked: Vec<(u32, f32)> = probabilities
        .iter()
        .enumerate()
        .map(|(id, &p)| (id as u32, p))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(k);
    ranked
}
