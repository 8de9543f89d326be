pub mod engine;
pub mod format;
pub mod whisper;

pub use engine::{Device, Segment, TranscriptionEngine, TranscriptionResult};
pub use format::{render_plain, render_timestamped, write_outputs, OutputPaths};
pub use whisper::WhisperEngine;
