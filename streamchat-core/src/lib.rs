pub mod config;
pub mod error;
pub mod http_client;
pub mod model;
pub mod normalizer;
pub mod session;
pub mod stream;
pub mod telemetry;
pub mod transcript;
pub mod transport;

pub use error::{ChatError, CoreResult};
pub use session::{CancelHandle, ChatSession, TurnOutcome};
pub use transcript::{Transcript, TranscriptStore};
