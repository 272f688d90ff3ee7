//! Generation-service side of the pipeline: prompts, defensive reply
//! parsing, the two-pass structure orchestrator and entity extraction.

pub mod artifacts;
pub mod error;
pub mod llm;
pub mod ner;
pub mod orchestrator;
pub mod prompt;
pub mod reply;

pub use artifacts::ArtifactSink;
pub use error::ExtractError;
pub use llm::{GenerationRequest, Generator, Message, OllamaClient};
pub use ner::{EntityExtractor, EntityOutcome};
pub use orchestrator::{
    ChunkGap, ChunkStats, ExtractionOutcome, Extractor, RecoveryOptions, StructuredDocument,
};
pub use reply::ChunkReply;
