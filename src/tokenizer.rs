use std::path::Path;

use thiserror::Error;

const MASK_CANDIDATES: &[&str] = &["<mask>", "[MASK]"];
const UNK_CANDIDATES: &[&str] = &["<unk>", "[UNK]"];
const PAD_CANDIDATES: &[&str] = &["<pad>", "[PAD]"];

/// Word-start markers used by byte-level BPE and sentencepiece vocabularies.
const WORD_START_MARKERS: &[char] = &['Ġ', '▁'];

#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("failed to load tokenizer from {path}: {message}")]
    Load { path: String, message: String },
    #[error("tokenizer has no {0} token")]
    MissingSpecialToken(&'static str),
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("decode failed: {0}")]
    Decode(String),
}

/// The slice of a pretrained tokenizer the probes rely on.
pub trait TokenVocab {
    fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Vec<u32>, TokenizerError>;
    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, TokenizerError>;
    /// Raw vocabulary lookup; `None` when the token is unknown.
    fn token_to_id(&self, token: &str) -> Option<u32>;
    fn id_to_token(&self, id: u32) -> Option<String>;
    fn mask_token(&self) -> &str;
    fn mask_token_id(&self) -> u32;
    fn unk_token_id(&self) -> u32;
    fn pad_token_id(&self) -> u32;
    fn vocab_size(&self) -> usize;

    /// Id of `token`, falling back to the unknown-token id.
    fn convert_token_to_id(&self, token: &str) -> u32 {
        self.token_to_id(token).unwrap_or_else(|| self.unk_token_id())
    }

    fn convert_tokens_to_ids(&self, tokens: &[String]) -> Vec<u32> {
        tokens.iter().map(|t| self.convert_token_to_id(t)).collect()
    }

    /// Token string for `id` with word-start markers removed.
    fn display_token(&self, id: u32) -> String {
        self.id_to_token(id)
            .map(|t| clean_token(&t))
            .unwrap_or_default()
    }
}

pub fn clean_token(token: &str) -> String {
    token.replace(WORD_START_MARKERS, "")
}

pub struct PretrainedTokenizer {
    inner: tokenizers::Tokenizer,
    mask_token: String,
    mask_token_id: u32,
    unk_token_id: u32,
    pad_token_id: u32,
}

impl PretrainedTokenizer {
    pub fn from_file(path: &Path) -> Result<Self, TokenizerError> {
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| TokenizerError::Load {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_tokenizer(inner)
    }

    pub fn from_tokenizer(inner: tokenizers::Tokenizer) -> Result<Self, TokenizerError> {
        // Seq2seq vocabularies have no mask token; the masked-LM paths are
        // never used with them, so fall back to the unknown token.
        let unk = find_special(&inner, UNK_CANDIDATES).ok_or(TokenizerError::MissingSpecialToken("unknown"))?;
        let (mask_token, mask_token_id) = find_special(&inner, MASK_CANDIDATES).unwrap_or_else(|| unk.clone());
        let pad_token_id = find_special(&inner, PAD_CANDIDATES)
            .map(|(_, id)| id)
            .unwrap_or(unk.1);

        Ok(Self {
            inner,
            mask_token,
            mask_token_id,
            unk_token_id: unk.1,
            pad_token_id,
        })
    }

    pub fn has_mask_token(&self) -> bool {
        self.mask_token_id != self.unk_token_id
    }
}

fn find_special(tokenizer: &tokenizers::Tokenizer, candidates: &[&str]) -> Option<(String, u32)> {
    candidates
        .iter()
        .find_map(|c| tokenizer.token_to_id(c).map(|id| (c.to_string(), id)))
}

impl TokenVocab for PretrainedTokenizer {
    fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Vec<u32>, TokenizerError> {
        let encoding = self
            .inner
            .encode(text, add_special_tokens)
            .map_err(|e| TokenizerError::Encode(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, TokenizerError> {
        self.inner
            .decode(ids, skip_special_tokens)
            .map_err(|e| TokenizerError::Decode(e.to_string()))
    }

    fn token_to_id(&self, token: &str) -> Option<u32> {
        self.inner.token_to_id(token)
    }

    fn id_to_token(&self, id: u32) -> Option<String> {
        self.inner.id_to_token(id)
    }

    fn mask_token(&self) -> &str {
        &self.mask_token
    }

    fn mask_token_id(&self) -> u32 {
        self.mask_token_id
    }

    fn unk_token_id(&self) -> u32 {
        self.unk_token_id
    }

    fn pad_token_id(&self) -> u32 {
        self.pad_token_id
    }

    fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }
}
