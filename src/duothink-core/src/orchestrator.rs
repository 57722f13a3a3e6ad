//! Coaching orchestration.
//!
//! Drives a [`DebateSession`] against a [`CoachBackend`] and the debate
//! archive. Backend failures are logged and swallowed: the session drops back
//! to idle and the user can simply try again.

use std::sync::Arc;
use std::time::Instant;

use crate::archive::{DebateArchive, KeyValueStore, SavedDebate};
use crate::coach::{CoachBackend, CoachReply};
use crate::error::CoachError;
use crate::message::{BlindSpot, Message, MessageId};
use crate::personality::CoachPersonality;
use crate::session::{CoachRequest, DebateSession, TurnRejection};
use crate::speech::{AudioClip, AudioOutput, decode_pcm16, speech_text};

/// Callback for session events.
pub type SessionCallback = Box<dyn Fn(SessionEvent) + Send + Sync>;

/// Events emitted while coaching.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The user's argument was added to the transcript.
    UserMessage(Message),
    /// A fallacy was flagged in the user's argument.
    BlindSpotAlert(BlindSpot),
    /// The coach replied; `score` is the blended resilience score.
    CoachReply { message: Message, score: i32 },
    /// The coach could not be reached. The transcript is unchanged.
    TurnFailed { reason: String },
    /// A hint arrived.
    HintReady(String),
    /// The previous session was archived.
    DebateArchived { topic: String, score: i32 },
    /// A new debate started.
    DebateStarted { topic: String },
    /// An archived debate replaced the session.
    DebateLoaded { topic: String, score: i32 },
    AudioStarted(MessageId),
    AudioFinished(MessageId),
}

/// Result of submitting an argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The coach replied and the session was updated.
    Replied,
    /// The backend failed; the session is idle again.
    Failed,
    /// Nothing was sent.
    Rejected(TurnRejection),
}

/// A reply request that has left the session and awaits the backend.
pub struct PendingReply<B> {
    backend: Arc<B>,
    request: CoachRequest,
}

impl<B: CoachBackend> PendingReply<B> {
    /// Call the backend. Does not touch the session.
    pub async fn run(self) -> CompletedReply {
        let request = self.request;
        let result = self
            .backend
            .get_response(&request.topic, &request.transcript, request.personality)
            .await;
        CompletedReply { request, result }
    }
}

/// Backend answer for a [`PendingReply`], ready to fold.
pub struct CompletedReply {
    request: CoachRequest,
    result: Result<CoachReply, CoachError>,
}

/// A hint request awaiting the backend.
pub struct PendingHint<B> {
    backend: Arc<B>,
    request: CoachRequest,
}

impl<B: CoachBackend> PendingHint<B> {
    pub async fn run(self) -> CompletedHint {
        let request = self.request;
        let result = self
            .backend
            .get_hint(&request.topic, &request.transcript, request.personality)
            .await;
        CompletedHint { result }
    }
}

pub struct CompletedHint {
    result: Result<String, CoachError>,
}

/// A speech synthesis request awaiting the backend.
pub struct PendingSpeech<B> {
    backend: Arc<B>,
    id: MessageId,
    text: String,
}

impl<B: CoachBackend> PendingSpeech<B> {
    /// Synthesize and decode. Does not touch the session.
    pub async fn run(self) -> CompletedSpeech {
        let clip = self
            .backend
            .generate_speech(&speech_text(&self.text))
            .await
            .and_then(|payload| decode_pcm16(&payload));
        CompletedSpeech { id: self.id, clip }
    }
}

pub struct CompletedSpeech {
    id: MessageId,
    clip: Result<AudioClip, CoachError>,
}

/// Runs debate turns, hints, playback and archiving.
///
/// Each backend call is split into a `begin_*` step that claims the session
/// slot, a `run` on the returned pending value that needs no access to the
/// orchestrator, and a `finish_*` step that folds the result back in. A front
/// end can therefore keep a reply, a hint and a synthesis in flight at once
/// while still feeding input through the session.
pub struct CoachOrchestrator<B, S> {
    session: DebateSession,
    backend: Arc<B>,
    archive: DebateArchive<S>,
    callback: Option<SessionCallback>,
}

impl<B: CoachBackend, S: KeyValueStore> CoachOrchestrator<B, S> {
    pub fn new(session: DebateSession, backend: B, archive: DebateArchive<S>) -> Self {
        Self {
            session,
            backend: Arc::new(backend),
            archive,
            callback: None,
        }
    }

    /// Set a callback for session events.
    pub fn with_callback(mut self, callback: SessionCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn session(&self) -> &DebateSession {
        &self.session
    }

    pub fn archive(&self) -> &DebateArchive<S> {
        &self.archive
    }

    /// Submit an argument. Rejected while a reply is outstanding.
    pub fn begin_send(&mut self, input: &str) -> Result<PendingReply<B>, TurnRejection> {
        let request = self.session.begin_turn(input)?;
        if let Some(user) = self.session.messages().last() {
            self.emit_event(SessionEvent::UserMessage(user.clone()));
        }
        Ok(PendingReply {
            backend: Arc::clone(&self.backend),
            request,
        })
    }

    /// Fold a coach answer into the session.
    pub fn finish_send(&mut self, completed: CompletedReply) -> TurnOutcome {
        let CompletedReply { request, result } = completed;
        match result {
            Ok(reply) => {
                let Some(folded) = self.session.complete_turn(&request, reply) else {
                    return TurnOutcome::Failed;
                };
                if let Some(spot) = folded.alert.and_then(|alert| alert.blind_spot) {
                    self.emit_event(SessionEvent::BlindSpotAlert(spot));
                }
                self.emit_event(SessionEvent::CoachReply {
                    message: folded.reply,
                    score: folded.score,
                });
                TurnOutcome::Replied
            }
            Err(err) => {
                tracing::warn!(error = %err, "coach reply failed");
                self.session.fail_turn(&request);
                self.emit_event(SessionEvent::TurnFailed {
                    reason: err.to_string(),
                });
                TurnOutcome::Failed
            }
        }
    }

    /// Submit an argument and wait for the coach.
    pub async fn send(&mut self, input: &str) -> TurnOutcome {
        match self.begin_send(input) {
            Ok(pending) => {
                let completed = pending.run().await;
                self.finish_send(completed)
            }
            Err(rejection) => TurnOutcome::Rejected(rejection),
        }
    }

    /// Claim the hint slot. Independent of the reply slot.
    pub fn begin_hint(&mut self) -> Result<PendingHint<B>, TurnRejection> {
        let request = self.session.begin_hint()?;
        Ok(PendingHint {
            backend: Arc::clone(&self.backend),
            request,
        })
    }

    /// Show a finished hint. Returns the text when one was shown.
    pub fn finish_hint(&mut self, completed: CompletedHint) -> Option<String> {
        match completed.result {
            Ok(hint) => {
                self.session.complete_hint(hint.clone(), Instant::now());
                self.emit_event(SessionEvent::HintReady(hint.clone()));
                Some(hint)
            }
            Err(err) => {
                tracing::warn!(error = %err, "hint request failed");
                self.session.fail_hint();
                None
            }
        }
    }

    /// Ask for a hint and wait for it.
    pub async fn request_hint(&mut self) -> Option<String> {
        match self.begin_hint() {
            Ok(pending) => {
                let completed = pending.run().await;
                self.finish_hint(completed)
            }
            Err(rejection) => {
                tracing::debug!(%rejection, "hint request dropped");
                None
            }
        }
    }

    /// Archive the current debate if it went anywhere, then start on `topic`.
    ///
    /// Returns false for a blank topic. Fails only when the archive cannot be
    /// written; the session has been reset by then.
    pub fn start_new_debate(&mut self, topic: &str) -> Result<bool, CoachError> {
        let archived = match self.session.start_new_debate(topic) {
            Ok(archived) => archived,
            Err(rejection) => {
                tracing::debug!(%rejection, "new debate refused");
                return Ok(false);
            }
        };

        self.emit_event(SessionEvent::DebateStarted {
            topic: self.session.topic().to_string(),
        });

        if let Some(debate) = archived {
            let (topic, score) = (debate.topic.clone(), debate.score);
            self.archive.archive(debate)?;
            tracing::info!(%topic, score, "archived debate");
            self.emit_event(SessionEvent::DebateArchived { topic, score });
        }
        Ok(true)
    }

    /// Replace the session with the archived debate at `index` (newest first).
    pub fn load_debate(&mut self, index: usize) -> Option<&SavedDebate> {
        let debate = self.archive.get(index)?;
        self.session.load_debate(debate);
        self.emit_event(SessionEvent::DebateLoaded {
            topic: debate.topic.clone(),
            score: debate.score,
        });
        Some(debate)
    }

    pub fn set_personality(&mut self, personality: CoachPersonality) {
        self.session.set_personality(personality);
    }

    /// Claim the audio slot for a coach message.
    ///
    /// Returns `None` for user entries, unknown ids, or while another
    /// synthesis is loading.
    pub fn begin_speech(&mut self, id: MessageId) -> Option<PendingSpeech<B>> {
        let Some(text) = self.session.begin_speech(id) else {
            tracing::debug!(%id, "speech request dropped");
            return None;
        };
        Some(PendingSpeech {
            backend: Arc::clone(&self.backend),
            id,
            text,
        })
    }

    /// Release the audio slot and play the clip. Returns false when nothing
    /// was played.
    pub async fn finish_speech<O>(&mut self, completed: CompletedSpeech, output: &mut O) -> bool
    where
        O: AudioOutput + ?Sized,
    {
        let CompletedSpeech { id, clip } = completed;
        self.session.end_speech();

        let clip = match clip {
            Ok(clip) => clip,
            Err(err) => {
                tracing::warn!(error = %err, %id, "speech synthesis failed");
                return false;
            }
        };

        self.session.set_audio_playing(id, true);
        self.emit_event(SessionEvent::AudioStarted(id));
        let played = output.play(id, &clip).await;
        self.session.set_audio_playing(id, false);
        self.emit_event(SessionEvent::AudioFinished(id));

        match played {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, %id, "playback failed");
                false
            }
        }
    }

    /// Speak a coach message and wait for playback to end.
    pub async fn play_message<O>(&mut self, id: MessageId, output: &mut O) -> bool
    where
        O: AudioOutput + ?Sized,
    {
        let Some(pending) = self.begin_speech(id) else {
            return false;
        };
        let completed = pending.run().await;
        self.finish_speech(completed, output).await
    }

    /// Emit an event if a callback is registered.
    fn emit_event(&self, event: SessionEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}
