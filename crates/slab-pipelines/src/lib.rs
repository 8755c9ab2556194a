//! C8 — task runners and the shared harness that admits them to the GPU.
//!
//! Three runners share one harness (spec §4.8 "All three share"): ingest
//! (no GPU), image generation, and speech-to-text. `harness::run_task` owns
//! the acquire/report/after_task sequence common to all of them; each
//! runner only implements `execute`.

pub mod harness;
pub mod image;
pub mod ingest;
pub mod master_client;
pub mod stt;

pub use harness::{run_task, PipelineRunner};
pub use image::{ImageHost, ImageRunner};
pub use ingest::IngestRunner;
pub use master_client::{MasterClient, UploadImageResponse};
pub use stt::{SttModel, SttRunner, TranscriptLine};
