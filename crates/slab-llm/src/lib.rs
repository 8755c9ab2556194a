//! Client interfaces to the four model-backed external collaborators
//! (spec §1 "Out of scope"): the LLM, the embedding model, the document
//! retrieval index, and the document parser. The STT model and the
//! image-generation service are adapted directly in `slab-pipelines`
//! instead, since their interfaces are single-call rather than chat-shaped.
//!
//! Only [`GenaiLlmClient`] talks to a real backend; the other three traits
//! have lightweight in-process implementations since their underlying
//! libraries are explicitly out of scope.

mod document;
mod embed;
mod llm;
mod retrieval;

pub use document::{DocumentParser, LineChunkParser};
pub use embed::{Embedder, ZeroEmbedder};
pub use llm::{GenaiLlmClient, LlmClient};
pub use retrieval::{RetrievalIndex, RetrievedChunk, StaticRetrievalIndex};
