//! DuoThink Core Library
//!
//! Provides the debate session state machine, the coach backend client,
//! speech decoding and the debate archive.

pub mod archive;
pub mod coach;
pub mod config;
pub mod error;
pub mod gemini;
pub mod message;
pub mod orchestrator;
pub mod personality;
pub mod session;
pub mod speech;

pub use archive::{DebateArchive, FileStore, KeyValueStore, MemoryStore, SavedDebate};
pub use coach::{CoachBackend, CoachReply};
pub use config::{Config, default_config};
pub use error::CoachError;
pub use gemini::GeminiCoach;
pub use message::{BlindSpot, GroundingSource, Message, MessageId, MessageSender};
pub use orchestrator::{
    CoachOrchestrator, CompletedHint, CompletedReply, CompletedSpeech, PendingHint, PendingReply,
    PendingSpeech, SessionCallback, SessionEvent, TurnOutcome,
};
pub use personality::CoachPersonality;
pub use session::{DebateSession, TurnRejection};
pub use speech::{AudioOutput, WavFileOutput};
