pub mod conceptnet;
pub mod wordnet;

pub use conceptnet::{ConceptNetClient, ConceptRecord, KnowledgeError, KnowledgeSource};
pub use wordnet::{Pos, Synset, SynsetId, WordNet, WordNetError};
