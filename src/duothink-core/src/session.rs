//! The live debate session and its transitions.
//!
//! A session owns the transcript, the resilience score, the fallacy tally and
//! the active topic and personality. Network work happens elsewhere: each
//! transition either hands out a request describing the call to make, or
//! folds a finished call back into state.
//!
//! Three independent slots track in-flight work. At most one coach reply,
//! one hint and one speech synthesis may be outstanding at a time.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::archive::SavedDebate;
use crate::coach::CoachReply;
use crate::message::{Message, MessageId, MessageSender};
use crate::personality::CoachPersonality;

/// Score a fresh session starts from.
pub const INITIAL_SCORE: i32 = 50;
/// How long a hint stays visible.
pub const HINT_DISPLAY: Duration = Duration::from_secs(8);

pub const DEFAULT_TOPIC: &str = "Universal Basic Income";
const DEFAULT_OPENING: &str = "Consider the economic implications of inflation. Introducing a universal stipend without corresponding production increases could devalue currency. How do you account for supply-side constraints?";

/// Weight of the newest turn in the resilience blend.
const NEW_SCORE_WEIGHT: f64 = 0.6;

/// Blend the running score with a turn's score: `round(0.4 * prev + 0.6 * new)`.
///
/// The turn score is taken as is; only the blended value is rounded (half up).
pub fn blend_score(previous: i32, turn_score: f64) -> i32 {
    let blended = previous as f64 * (1.0 - NEW_SCORE_WEIGHT) + turn_score * NEW_SCORE_WEIGHT;
    (blended + 0.5).floor() as i32
}

/// One-line reading of a resilience score.
pub fn score_verdict(score: i32) -> &'static str {
    if score > 80 {
        "Your arguments are highly structured and resilient."
    } else if score > 50 {
        "Your logic holds, but there are exploitable gaps."
    } else {
        "Focus on building more evidence-based claims."
    }
}

fn opening_for(topic: &str) -> String {
    format!("Opening debate: {topic}. I'm ready for your opening statement.")
}

/// Why a transition was refused. None of these reach the backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TurnRejection {
    #[error("Nothing to send")]
    EmptyInput,

    #[error("The coach is still replying")]
    ReplyPending,

    #[error("A hint is already on its way")]
    HintPending,

    #[error("Topic cannot be empty")]
    EmptyTopic,
}

/// Everything a backend call needs, captured when the call starts.
#[derive(Debug, Clone)]
pub struct CoachRequest {
    generation: u64,
    pub topic: String,
    pub personality: CoachPersonality,
    pub transcript: Vec<Message>,
}

/// Entries a completed turn appended.
#[derive(Debug, Clone)]
pub struct FoldedTurn {
    pub alert: Option<Message>,
    pub reply: Message,
    pub score: i32,
}

#[derive(Debug, Clone, Default)]
enum HintState {
    #[default]
    Idle,
    Pending,
    Shown {
        text: String,
        until: Instant,
    },
}

/// The in-progress debate.
#[derive(Debug, Clone)]
pub struct DebateSession {
    topic: String,
    personality: CoachPersonality,
    messages: Vec<Message>,
    score: i32,
    fallacies: BTreeMap<String, u32>,
    next_id: u64,
    /// Bumped on reset or load so late replies for the old session are dropped.
    generation: u64,
    reply_pending: bool,
    hint: HintState,
    audio_loading: Option<MessageId>,
}

impl Default for DebateSession {
    fn default() -> Self {
        Self::seeded(DEFAULT_TOPIC, DEFAULT_OPENING.to_string(), CoachPersonality::default())
    }
}

impl DebateSession {
    /// A fresh session on `topic` with the standard opening.
    pub fn new(topic: impl Into<String>, personality: CoachPersonality) -> Self {
        let topic = topic.into();
        let opening = opening_for(&topic);
        Self::seeded(&topic, opening, personality)
    }

    fn seeded(topic: &str, opening: String, personality: CoachPersonality) -> Self {
        Self {
            topic: topic.to_string(),
            personality,
            messages: vec![Message::coach(MessageId(1), opening)],
            score: INITIAL_SCORE,
            fallacies: BTreeMap::new(),
            next_id: 2,
            generation: 0,
            reply_pending: false,
            hint: HintState::Idle,
            audio_loading: None,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn personality(&self) -> CoachPersonality {
        self.personality
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn fallacies(&self) -> &BTreeMap<String, u32> {
        &self.fallacies
    }

    pub fn fallacy_total(&self) -> u32 {
        self.fallacies.values().sum()
    }

    pub fn is_reply_pending(&self) -> bool {
        self.reply_pending
    }

    pub fn is_hint_pending(&self) -> bool {
        matches!(self.hint, HintState::Pending)
    }

    /// Message whose audio is being synthesized, if any.
    pub fn audio_loading(&self) -> Option<MessageId> {
        self.audio_loading
    }

    /// Only the seeded opening so far.
    pub fn is_untouched(&self) -> bool {
        self.messages.len() <= 1
    }

    /// Later replies use the new personality; past messages are untouched.
    pub fn set_personality(&mut self, personality: CoachPersonality) {
        self.personality = personality;
    }

    fn allocate_id(&mut self) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        id
    }

    fn request(&self) -> CoachRequest {
        CoachRequest {
            generation: self.generation,
            topic: self.topic.clone(),
            personality: self.personality,
            transcript: self.messages.clone(),
        }
    }

    /// Append the user's argument and claim the reply slot.
    pub fn begin_turn(&mut self, input: &str) -> Result<CoachRequest, TurnRejection> {
        let text = input.trim();
        if text.is_empty() {
            return Err(TurnRejection::EmptyInput);
        }
        if self.reply_pending {
            return Err(TurnRejection::ReplyPending);
        }

        let id = self.allocate_id();
        self.messages.push(Message::user(id, text));
        self.reply_pending = true;
        Ok(self.request())
    }

    /// Fold a coach reply into the session.
    ///
    /// Returns `None` if the session was reset or replaced after the turn began.
    pub fn complete_turn(&mut self, request: &CoachRequest, reply: CoachReply) -> Option<FoldedTurn> {
        if request.generation != self.generation {
            tracing::debug!("dropping reply for a replaced session");
            return None;
        }
        self.reply_pending = false;
        self.score = blend_score(self.score, reply.logic_score);

        let alert = if reply.blind_spot.detected {
            *self
                .fallacies
                .entry(reply.blind_spot.kind.clone())
                .or_insert(0) += 1;
            let alert = Message::blind_spot_alert(self.allocate_id(), reply.blind_spot);
            self.messages.push(alert.clone());
            Some(alert)
        } else {
            None
        };

        let coach = Message::coach_reply(self.allocate_id(), reply.retort, reply.sources);
        self.messages.push(coach.clone());

        Some(FoldedTurn {
            alert,
            reply: coach,
            score: self.score,
        })
    }

    /// Release the reply slot after a failed call. The transcript is kept as is.
    pub fn fail_turn(&mut self, request: &CoachRequest) {
        if request.generation == self.generation {
            self.reply_pending = false;
        }
    }

    /// Claim the hint slot.
    pub fn begin_hint(&mut self) -> Result<CoachRequest, TurnRejection> {
        if self.is_hint_pending() {
            return Err(TurnRejection::HintPending);
        }
        self.hint = HintState::Pending;
        Ok(self.request())
    }

    /// Show a hint until `now + HINT_DISPLAY`.
    pub fn complete_hint(&mut self, text: impl Into<String>, now: Instant) {
        self.hint = HintState::Shown {
            text: text.into(),
            until: now + HINT_DISPLAY,
        };
    }

    pub fn fail_hint(&mut self) {
        self.hint = HintState::Idle;
    }

    /// The hint on screen at `now`, if it has not expired.
    pub fn active_hint(&self, now: Instant) -> Option<&str> {
        match &self.hint {
            HintState::Shown { text, until } if now < *until => Some(text),
            _ => None,
        }
    }

    /// Claim the audio slot for a coach message and return the text to speak.
    ///
    /// Returns `None` while another synthesis is in flight or if `id` is not
    /// a coach message.
    pub fn begin_speech(&mut self, id: MessageId) -> Option<String> {
        if self.audio_loading.is_some() {
            return None;
        }
        let text = self
            .message(id)
            .filter(|m| m.is_from_coach())
            .map(|m| m.text.clone())?;
        self.audio_loading = Some(id);
        Some(text)
    }

    pub fn end_speech(&mut self) {
        self.audio_loading = None;
    }

    /// Toggle a message's playing flag. Returns false for unknown ids.
    pub fn set_audio_playing(&mut self, id: MessageId, playing: bool) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.is_audio_playing = playing;
                true
            }
            None => false,
        }
    }

    /// Latest coach message, the default target for playback.
    pub fn last_coach_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_from_coach())
    }

    /// Snapshot the session for the archive.
    pub fn snapshot(&self) -> SavedDebate {
        SavedDebate {
            id: uuid::Uuid::new_v4().to_string(),
            topic: self.topic.clone(),
            date: chrono::Local::now().date_naive(),
            messages: self.messages.clone(),
            score: self.score,
        }
    }

    /// Reset to a new topic.
    ///
    /// Returns the snapshot to archive when the old session went past its
    /// opening message.
    pub fn start_new_debate(&mut self, topic: &str) -> Result<Option<SavedDebate>, TurnRejection> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(TurnRejection::EmptyTopic);
        }

        let archived = (!self.is_untouched()).then(|| self.snapshot());
        let generation = self.generation + 1;
        *self = Self {
            generation,
            hint: std::mem::take(&mut self.hint),
            ..Self::new(topic, self.personality)
        };
        Ok(archived)
    }

    /// Replace topic, transcript and score with an archived debate.
    ///
    /// The current session is discarded without archiving.
    pub fn load_debate(&mut self, debate: &SavedDebate) {
        self.topic = debate.topic.clone();
        self.messages = debate.messages.clone();
        self.score = debate.score;
        self.fallacies = tally_blind_spots(&self.messages);
        self.next_id = self.messages.iter().map(|m| m.id.0).max().unwrap_or(0) + 1;
        self.generation += 1;
        self.reply_pending = false;
        self.audio_loading = None;
    }
}

fn tally_blind_spots(messages: &[Message]) -> BTreeMap<String, u32> {
    let mut tally = BTreeMap::new();
    for spot in messages
        .iter()
        .filter(|m| m.sender == MessageSender::SystemAlert)
        .filter_map(|m| m.blind_spot.as_ref())
        .filter(|spot| spot.detected)
    {
        *tally.entry(spot.kind.clone()).or_insert(0) += 1;
    }
    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{BlindSpot, GroundingSource};
    use pretty_assertions::assert_eq;

    fn reply(score: i32, blind_spot: BlindSpot) -> CoachReply {
        CoachReply {
            retort: format!("Retort scoring {score}"),
            blind_spot,
            logic_score: f64::from(score),
            sources: vec![GroundingSource {
                title: "Source".to_string(),
                uri: "https://example.com".to_string(),
            }],
        }
    }

    fn play_turn(session: &mut DebateSession, input: &str, reply: CoachReply) -> FoldedTurn {
        let request = session.begin_turn(input).unwrap();
        session.complete_turn(&request, reply).unwrap()
    }

    #[test]
    fn test_blend_score_known_values() {
        assert_eq!(blend_score(50, 90.0), 74);
        assert_eq!(blend_score(74, 0.0), 30);
        assert_eq!(blend_score(50, 50.0), 50);
        // 0.4 * 1 + 0.6 * 2 = 1.6
        assert_eq!(blend_score(1, 2.0), 2);
    }

    #[test]
    fn test_blend_score_rounds_once_after_blending() {
        // 0.6 * 0.7 = 0.42; rounding the turn score first would give 1.
        assert_eq!(blend_score(0, 0.7), 0);
        // 0.4 * 10 + 0.6 * 64.6 = 42.76
        assert_eq!(blend_score(10, 64.6), 43);
        // 0.6 * 2.5 = 1.5 rounds half up
        assert_eq!(blend_score(0, 2.5), 2);
    }

    #[test]
    fn test_fractional_turn_score_is_not_pre_rounded() {
        let mut session = DebateSession::default();
        let mut turn = reply(0, BlindSpot::default());
        turn.logic_score = 0.7;
        // 0.4 * 50 + 0.6 * 0.7 = 20.42, where a pre-rounded 1 would give 20.6
        assert_eq!(play_turn(&mut session, "Claim", turn).score, 20);
        assert_eq!(session.score(), 20);
    }

    #[test]
    fn test_blend_score_negative_scores() {
        // -2.0 and -2.6
        assert_eq!(blend_score(-5, 0.0), -2);
        assert_eq!(blend_score(-5, -1.0), -3);
        // Not clamped above 100 either.
        assert_eq!(blend_score(100, 150.0), 130);
    }

    #[test]
    fn test_default_session() {
        let session = DebateSession::default();
        assert_eq!(session.topic(), DEFAULT_TOPIC);
        assert_eq!(session.score(), INITIAL_SCORE);
        assert_eq!(session.messages().len(), 1);
        assert!(session.messages()[0].is_from_coach());
        assert!(session.is_untouched());
    }

    #[test]
    fn test_score_sequence_across_turns() {
        let mut session = DebateSession::default();
        play_turn(&mut session, "First", reply(90, BlindSpot::default()));
        assert_eq!(session.score(), 74);
        play_turn(&mut session, "Second", reply(0, BlindSpot::default()));
        assert_eq!(session.score(), 30);
    }

    #[test]
    fn test_whitespace_input_is_rejected() {
        let mut session = DebateSession::default();
        assert_eq!(session.begin_turn("   \n\t").unwrap_err(), TurnRejection::EmptyInput);
        assert_eq!(session.messages().len(), 1);
        assert!(!session.is_reply_pending());
    }

    #[test]
    fn test_input_is_trimmed_and_ids_increase() {
        let mut session = DebateSession::default();
        let request = session.begin_turn("  Work gives meaning  ").unwrap();
        let user = &session.messages()[1];
        assert_eq!(user.text, "Work gives meaning");
        assert!(user.id > session.messages()[0].id);
        assert_eq!(request.transcript.len(), 2);
        assert_eq!(request.topic, DEFAULT_TOPIC);
    }

    #[test]
    fn test_second_submission_while_pending_is_rejected() {
        let mut session = DebateSession::default();
        session.begin_turn("First").unwrap();
        assert_eq!(session.begin_turn("Second").unwrap_err(), TurnRejection::ReplyPending);
        assert_eq!(session.messages().len(), 2);
    }

    #[test]
    fn test_detected_blind_spot_adds_alert_before_reply() {
        let mut session = DebateSession::default();
        let folded = play_turn(
            &mut session,
            "Everyone agrees",
            reply(40, BlindSpot::detected("Bandwagon", "Popularity is not proof.")),
        );

        let senders: Vec<_> = session.messages().iter().map(|m| m.sender).collect();
        assert_eq!(
            senders,
            vec![
                MessageSender::Coach,
                MessageSender::User,
                MessageSender::SystemAlert,
                MessageSender::Coach
            ]
        );
        assert_eq!(session.fallacies().get("Bandwagon"), Some(&1));
        assert_eq!(session.fallacy_total(), 1);
        assert!(folded.alert.is_some());
        assert_eq!(folded.reply.displayed_sources().len(), 1);
        assert!(folded.alert.unwrap().id < folded.reply.id);
    }

    #[test]
    fn test_repeated_fallacy_counts_by_type() {
        let mut session = DebateSession::default();
        play_turn(&mut session, "a", reply(40, BlindSpot::detected("Straw Man", "")));
        play_turn(&mut session, "b", reply(40, BlindSpot::detected("Straw Man", "")));
        play_turn(&mut session, "c", reply(40, BlindSpot::detected("Ad Hominem", "")));
        play_turn(&mut session, "d", reply(40, BlindSpot::default()));

        assert_eq!(session.fallacies().get("Straw Man"), Some(&2));
        assert_eq!(session.fallacies().get("Ad Hominem"), Some(&1));
        assert_eq!(session.fallacy_total(), 3);
    }

    #[test]
    fn test_failed_turn_keeps_user_message_and_frees_slot() {
        let mut session = DebateSession::default();
        let request = session.begin_turn("Claim").unwrap();
        session.fail_turn(&request);

        assert!(!session.is_reply_pending());
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.score(), INITIAL_SCORE);
        assert!(session.begin_turn("Again").is_ok());
    }

    #[test]
    fn test_new_debate_on_untouched_session_does_not_archive() {
        let mut session = DebateSession::default();
        let archived = session.start_new_debate("Space exploration").unwrap();
        assert!(archived.is_none());
        assert_eq!(session.topic(), "Space exploration");
        assert_eq!(
            session.messages()[0].text,
            "Opening debate: Space exploration. I'm ready for your opening statement."
        );
    }

    #[test]
    fn test_new_debate_archives_and_resets() {
        let mut session = DebateSession::default();
        session.set_personality(CoachPersonality::Stoic);
        play_turn(&mut session, "Claim", reply(90, BlindSpot::detected("Red Herring", "")));
        let before = session.messages().to_vec();

        let archived = session.start_new_debate("  Nuclear power  ").unwrap().unwrap();
        assert_eq!(archived.topic, DEFAULT_TOPIC);
        assert_eq!(archived.score, 74);
        assert_eq!(archived.messages, before);

        assert_eq!(session.topic(), "Nuclear power");
        assert_eq!(session.score(), INITIAL_SCORE);
        assert!(session.fallacies().is_empty());
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.personality(), CoachPersonality::Stoic);
    }

    #[test]
    fn test_new_debate_requires_topic() {
        let mut session = DebateSession::default();
        assert_eq!(session.start_new_debate("  ").unwrap_err(), TurnRejection::EmptyTopic);
        assert_eq!(session.topic(), DEFAULT_TOPIC);
    }

    #[test]
    fn test_reply_after_reset_is_dropped() {
        let mut session = DebateSession::default();
        let request = session.begin_turn("Claim").unwrap();
        session.start_new_debate("Other").unwrap();

        assert!(session.complete_turn(&request, reply(100, BlindSpot::default())).is_none());
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.score(), INITIAL_SCORE);
    }

    #[test]
    fn test_load_debate_reproduces_archive() {
        let mut original = DebateSession::default();
        play_turn(&mut original, "a", reply(90, BlindSpot::detected("Straw Man", "")));
        play_turn(&mut original, "b", reply(20, BlindSpot::detected("Straw Man", "")));
        let saved = original.snapshot();

        let mut session = DebateSession::new("Something else", CoachPersonality::Academic);
        play_turn(&mut session, "x", reply(10, BlindSpot::default()));
        session.load_debate(&saved);

        assert_eq!(session.topic(), saved.topic);
        assert_eq!(session.messages(), saved.messages.as_slice());
        assert_eq!(session.score(), saved.score);
        assert_eq!(session.fallacies().get("Straw Man"), Some(&2));
        assert_eq!(session.personality(), CoachPersonality::Academic);

        // New entries continue after the loaded ids.
        let max_id = saved.messages.iter().map(|m| m.id).max().unwrap();
        session.begin_turn("continue").unwrap();
        assert!(session.messages().last().unwrap().id > max_id);
    }

    #[test]
    fn test_personality_change_keeps_history() {
        let mut session = DebateSession::default();
        play_turn(&mut session, "a", reply(60, BlindSpot::default()));
        let before = session.messages().to_vec();
        session.set_personality(CoachPersonality::Aggressive);
        assert_eq!(session.messages(), before.as_slice());
        let request = session.begin_turn("b").unwrap();
        assert_eq!(request.personality, CoachPersonality::Aggressive);
    }

    #[test]
    fn test_hint_expires_after_display_window() {
        let mut session = DebateSession::default();
        session.begin_hint().unwrap();
        assert_eq!(session.begin_hint().unwrap_err(), TurnRejection::HintPending);

        let now = Instant::now();
        session.complete_hint("Attack the premise", now);
        assert_eq!(session.active_hint(now), Some("Attack the premise"));
        assert_eq!(
            session.active_hint(now + Duration::from_secs(7)),
            Some("Attack the premise")
        );
        assert_eq!(session.active_hint(now + HINT_DISPLAY), None);
        assert!(session.begin_hint().is_ok());
    }

    #[test]
    fn test_hint_does_not_block_turns() {
        let mut session = DebateSession::default();
        session.begin_hint().unwrap();
        assert!(session.begin_turn("Claim").is_ok());
    }

    #[test]
    fn test_speech_slot_is_exclusive() {
        let mut session = DebateSession::default();
        play_turn(&mut session, "Claim", reply(60, BlindSpot::default()));
        let opening = session.messages()[0].id;
        let latest = session.last_coach_message().unwrap().id;

        assert!(session.begin_speech(latest).is_some());
        assert_eq!(session.audio_loading(), Some(latest));
        assert!(session.begin_speech(opening).is_none());

        session.end_speech();
        assert!(session.begin_speech(opening).is_some());
    }

    #[test]
    fn test_speech_only_for_coach_messages() {
        let mut session = DebateSession::default();
        session.begin_turn("Claim").unwrap();
        let user_id = session.messages()[1].id;
        assert!(session.begin_speech(user_id).is_none());
        assert!(session.begin_speech(MessageId(999)).is_none());
        assert_eq!(session.audio_loading(), None);
    }

    #[test]
    fn test_audio_playing_flag_toggles() {
        let mut session = DebateSession::default();
        let id = session.messages()[0].id;
        assert!(session.set_audio_playing(id, true));
        assert!(session.messages()[0].is_audio_playing);
        assert!(session.set_audio_playing(id, false));
        assert!(!session.messages()[0].is_audio_playing);
        assert!(!session.set_audio_playing(MessageId(42), true));
    }

    #[test]
    fn test_score_verdict_bands() {
        assert_eq!(score_verdict(81), "Your arguments are highly structured and resilient.");
        assert_eq!(score_verdict(80), "Your logic holds, but there are exploitable gaps.");
        assert_eq!(score_verdict(51), "Your logic holds, but there are exploitable gaps.");
        assert_eq!(score_verdict(50), "Focus on building more evidence-based claims.");
    }
}
