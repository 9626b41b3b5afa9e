//! Local WordNet lookups over the WNDB flat-file database.
//!
//! Only the parts the probes need are parsed: the lemma index, synset lemma
//! lists, hypernym pointers and morphological exception lists. Synsets are
//! keyed by their `(pos, offset)` pair as written in the data file.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::Path;

use thiserror::Error;
use tracing::info;

const HYPERNYM: &str = "@";
const INSTANCE_HYPERNYM: &str = "@i";

#[derive(Debug, Error)]
pub enum WordNetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{file}:{line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },
    #[error("no noun database found in {0}")]
    MissingNouns(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Pos {
    Noun,
    Verb,
    Adjective,
    Adverb,
}

impl Pos {
    pub const ALL: [Pos; 4] = [Pos::Noun, Pos::Verb, Pos::Adjective, Pos::Adverb];

    pub fn file_suffix(&self) -> &'static str {
        match self {
            Self::Noun => "noun",
            Self::Verb => "verb",
            Self::Adjective => "adj",
            Self::Adverb => "adv",
        }
    }

    /// Satellite adjectives (`s`) live in the adjective files.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "n" => Some(Self::Noun),
            "v" => Some(Self::Verb),
            "a" | "s" => Some(Self::Adjective),
            "r" => Some(Self::Adverb),
            _ => None,
        }
    }

    fn detachment_rules(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Noun => &[
                ("s", ""),
                ("ses", "s"),
                ("ves", "f"),
                ("xes", "x"),
                ("zes", "z"),
                ("ches", "ch"),
                ("shes", "sh"),
                ("men", "man"),
                ("ies", "y"),
            ],
            Self::Verb => &[
                ("s", ""),
                ("ies", "y"),
                ("es", "e"),
                ("es", ""),
                ("ed", "e"),
                ("ed", ""),
                ("ing", "e"),
                ("ing", ""),
            ],
            Self::Adjective => &[("er", ""), ("est", ""), ("er", "e"), ("est", "e")],
            Self::Adverb => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SynsetId {
    pub pos: Pos,
    pub offset: u64,
}

#[derive(Debug, Clone)]
pub struct Synset {
    pub id: SynsetId,
    /// Head lemma, lowercased; the part of the synset name before the first `.`.
    pub name: String,
    pub lemmas: Vec<String>,
    pub hypernyms: Vec<SynsetId>,
    pub instance_hypernyms: Vec<SynsetId>,
}

#[derive(Debug, Default)]
pub struct WordNet {
    synsets: HashMap<SynsetId, Synset>,
    index: HashMap<(Pos, String), Vec<SynsetId>>,
    exceptions: HashMap<(Pos, String), Vec<String>>,
}

impl WordNet {
    /// Loads every part of speech present in `dir`. The noun files are required.
    pub fn open(dir: &Path) -> Result<Self, WordNetError> {
        let mut wordnet = Self::default();
        for pos in Pos::ALL {
            let index_path = dir.join(format!("index.{}", pos.file_suffix()));
            let data_path = dir.join(format!("data.{}", pos.file_suffix()));
            if !index_path.exists() || !data_path.exists() {
                if pos == Pos::Noun {
                    return Err(WordNetError::MissingNouns(dir.display().to_string()));
                }
                continue;
            }
            let index = read(&index_path)?;
            let data = read(&data_path)?;
            let exc_path = dir.join(format!("{}.exc", pos.file_suffix()));
            let exceptions = if exc_path.exists() { Some(read(&exc_path)?) } else { None };
            wordnet.load_pos(pos, &index, &data, exceptions.as_deref())?;
        }
        info!(
            dir = %dir.display(),
            synsets = wordnet.synsets.len(),
            lemmas = wordnet.index.len(),
            "wordnet loaded"
        );
        Ok(wordnet)
    }

    pub fn load_pos(
        &mut self,
        pos: Pos,
        index: &str,
        data: &str,
        exceptions: Option<&str>,
    ) -> Result<(), WordNetError> {
        let suffix = pos.file_suffix();
        for (line_no, line) in content_lines(data) {
            let synset = parse_data_line(pos, line).map_err(|message| WordNetError::Parse {
                file: format!("data.{suffix}"),
                line: line_no,
                message,
            })?;
            self.synsets.insert(synset.id, synset);
        }

        for (line_no, line) in content_lines(index) {
            let (lemma, offsets) = parse_index_line(line).map_err(|message| WordNetError::Parse {
                file: format!("index.{suffix}"),
                line: line_no,
                message,
            })?;
            let ids = offsets.into_iter().map(|offset| SynsetId { pos, offset }).collect();
            self.index.insert((pos, lemma), ids);
        }

        if let Some(exceptions) = exceptions {
            for (_, line) in content_lines(exceptions) {
                let mut parts = line.split_whitespace();
                if let Some(inflected) = parts.next() {
                    let bases: Vec<String> = parts.map(str::to_string).collect();
                    if !bases.is_empty() {
                        self.exceptions.insert((pos, inflected.to_string()), bases);
                    }
                }
            }
        }
        Ok(())
    }

    /// Base forms of `word` that exist in the index for `pos`, in lookup order.
    pub fn morphy(&self, word: &str, pos: Pos) -> Vec<String> {
        let form = normalize_lemma(word);
        let mut candidates = vec![form.clone()];
        if let Some(bases) = self.exceptions.get(&(pos, form.clone())) {
            candidates.extend(bases.iter().cloned());
        } else {
            for (suffix, ending) in pos.detachment_rules() {
                if let Some(stem) = form.strip_suffix(suffix) {
                    if !stem.is_empty() {
                        candidates.push(format!("{stem}{ending}"));
                    }
                }
            }
        }

        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|c| self.index.contains_key(&(pos, c.clone())))
            .filter(|c| seen.insert(c.clone()))
            .collect()
    }

    pub fn synsets_for(&self, word: &str, pos: Pos) -> Vec<&Synset> {
        let mut seen = HashSet::new();
        self.morphy(word, pos)
            .into_iter()
            .filter_map(|lemma| self.index.get(&(pos, lemma)))
            .flatten()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| self.synsets.get(id))
            .collect()
    }

    /// Synsets of `word` across all parts of speech, nouns first.
    pub fn synsets(&self, word: &str) -> Vec<&Synset> {
        Pos::ALL
            .iter()
            .flat_map(|pos| self.synsets_for(word, *pos))
            .collect()
    }

    /// Transitive hypernyms of `synset`, breadth first, excluding the synset itself.
    pub fn hypernym_closure(&self, synset: &Synset) -> Vec<&Synset> {
        let mut seen: HashSet<SynsetId> = HashSet::from([synset.id]);
        let mut queue: VecDeque<SynsetId> = synset.hypernyms.iter().copied().collect();
        let mut closure = Vec::new();

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(parent) = self.synsets.get(&id) {
                queue.extend(parent.hypernyms.iter().copied());
                closure.push(parent);
            }
        }
        closure
    }

    /// `word` plus the head names of every hypernym of every sense of `word`.
    /// `None` when the word has no synset at all.
    pub fn class_names(&self, word: &str) -> Option<BTreeSet<String>> {
        let synsets = self.synsets(word);
        if synsets.is_empty() {
            return None;
        }
        let mut names = BTreeSet::from([word.to_string()]);
        for synset in synsets {
            names.extend(self.hypernym_closure(synset).into_iter().map(|s| s.name.clone()));
        }
        Some(names)
    }

    /// Hypernym names of the most frequent noun sense of `entity`, nearest
    /// first. Instance hypernyms are used when the sense has no regular ones.
    pub fn entity_hypernyms(&self, entity: &str) -> Vec<String> {
        let Some(first) = self.synsets_for(entity, Pos::Noun).into_iter().next() else {
            return Vec::new();
        };

        let mut roots: Vec<&Synset> = Vec::new();
        if first.hypernyms.is_empty() {
            roots.extend(first.instance_hypernyms.iter().filter_map(|id| self.synsets.get(id)));
        } else {
            roots.push(first);
        }

        let mut names = Vec::new();
        let mut seen = HashSet::new();
        for root in roots {
            let chain = if root.id == first.id {
                self.hypernym_closure(root)
            } else {
                std::iter::once(root).chain(self.hypernym_closure(root)).collect()
            };
            for synset in chain {
                if seen.insert(synset.name.clone()) {
                    names.push(synset.name.clone());
                }
            }
        }
        names
    }
}

fn read(path: &Path) -> Result<String, WordNetError> {
    std::fs::read_to_string(path).map_err(|source| WordNetError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Skips the license preamble (lines starting with a space) and blank lines.
fn content_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line))
        .filter(|(_, line)| !line.starts_with(' ') && !line.trim().is_empty())
}

fn normalize_lemma(word: &str) -> String {
    word.trim().to_lowercase().replace(' ', "_")
}

/// Drops adjective syntactic markers such as `(a)`, `(p)` and `(ip)`.
fn strip_marker(word: &str) -> &str {
    match word.find('(') {
        Some(idx) if word.ends_with(')') => &word[..idx],
        _ => word,
    }
}

fn parse_index_line(line: &str) -> Result<(String, Vec<u64>), String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 6 {
        return Err("index line too short".to_string());
    }
    let lemma = tokens[0].to_string();
    let synset_cnt: usize = tokens[2].parse().map_err(|_| "bad synset_cnt".to_string())?;
    let p_cnt: usize = tokens[3].parse().map_err(|_| "bad p_cnt".to_string())?;
    // lemma pos synset_cnt p_cnt [ptr_symbol]{p_cnt} sense_cnt tagsense_cnt offsets...
    let offsets_start = 4 + p_cnt + 2;
    let offsets = tokens
        .get(offsets_start..offsets_start + synset_cnt)
        .ok_or_else(|| "missing synset offsets".to_string())?
        .iter()
        .map(|t| t.parse::<u64>().map_err(|_| format!("bad offset {t}")))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((lemma, offsets))
}

fn parse_data_line(pos: Pos, line: &str) -> Result<Synset, String> {
    // the gloss after " | " is not needed
    let fields = line.split_once(" | ").map_or(line, |(fields, _)| fields);
    let tokens: Vec<&str> = fields.split_whitespace().collect();
    if tokens.len() < 4 {
        return Err("data line too short".to_string());
    }

    let offset: u64 = tokens[0].parse().map_err(|_| "bad synset offset".to_string())?;
    let w_cnt = usize::from_str_radix(tokens[3], 16).map_err(|_| "bad w_cnt".to_string())?;
    let words_end = 4 + 2 * w_cnt;
    let lemmas: Vec<String> = tokens
        .get(4..words_end)
        .ok_or_else(|| "missing words".to_string())?
        .chunks(2)
        .map(|pair| strip_marker(pair[0]).to_string())
        .collect();
    let name = lemmas
        .first()
        .map(|l| l.to_lowercase())
        .ok_or_else(|| "synset without lemmas".to_string())?;

    let p_cnt: usize = tokens
        .get(words_end)
        .ok_or_else(|| "missing p_cnt".to_string())?
        .parse()
        .map_err(|_| "bad p_cnt".to_string())?;
    let pointers = tokens
        .get(words_end + 1..words_end + 1 + 4 * p_cnt)
        .ok_or_else(|| "missing pointers".to_string())?;

    let mut hypernyms = Vec::new();
    let mut instance_hypernyms = Vec::new();
    for ptr in pointers.chunks(4) {
        let target = || -> Result<SynsetId, String> {
            let offset = ptr[1].parse().map_err(|_| format!("bad pointer offset {}", ptr[1]))?;
            let pos = Pos::from_code(ptr[2]).ok_or_else(|| format!("bad pointer pos {}", ptr[2]))?;
            Ok(SynsetId { pos, offset })
        };
        match ptr[0] {
            HYPERNYM => hypernyms.push(target()?),
            INSTANCE_HYPERNYM => instance_hypernyms.push(target()?),
            _ => {}
        }
    }

    Ok(Synset {
        id: SynsetId { pos, offset },
        name,
        lemmas,
        hypernyms,
        instance_hypernyms,
    })
}
