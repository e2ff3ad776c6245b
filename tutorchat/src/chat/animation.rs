//! Animation scheduler: which single message, if any, is being revealed.
//!
//! The scheduler is a two-state machine, [`AnimationState::Idle`] and
//! [`AnimationState::Animating`]. It does not own timers; the client drives
//! the reveal and reports completion back. Every start and cancellation
//! bumps a generation counter so ticks from an abandoned reveal can be
//! recognised and ignored.

use std::collections::HashSet;

use tutorchat_proto::message::MessageId;

use super::timeline::Timeline;

/// Current state of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnimationState {
    /// Nothing is being revealed.
    #[default]
    Idle,
    /// The message with this id holds the animation token.
    Animating(MessageId),
}

/// Handle for a reveal the scheduler just started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationStart {
    /// Message to reveal.
    pub message_id: MessageId,
    /// Generation the reveal's ticks must carry.
    pub generation: u64,
}

/// Decides when a message starts and stops animating.
#[derive(Debug, Default)]
pub struct AnimationScheduler {
    state: AnimationState,
    /// Every id that ever started animating. Never pruned: an id may come
    /// back in a later history fetch and must not animate again, and the set
    /// only grows by one entry per answer received while the client runs.
    started: HashSet<MessageId>,
    last_completed: Option<MessageId>,
    generation: u64,
}

impl AnimationScheduler {
    /// Creates an idle scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> AnimationState {
        self.state
    }

    /// Id of the message holding the token, if any.
    #[must_use]
    pub const fn animating(&self) -> Option<MessageId> {
        match self.state {
            AnimationState::Animating(id) => Some(id),
            AnimationState::Idle => None,
        }
    }

    /// Current generation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// The newest confirmed message with an answer that was not delivered
    /// by the last history load.
    #[must_use]
    pub fn candidate(timeline: &Timeline) -> Option<MessageId> {
        let latest = timeline
            .messages()
            .iter()
            .rev()
            .find(|m| !m.is_optimistic && !m.answer.is_empty())?;
        let id = latest.permanent_id()?;
        (!timeline.seen_history().contains(&id)).then_some(id)
    }

    /// Looks at the timeline and starts animating the candidate if allowed.
    ///
    /// Only starts from idle, and never for an id that already started or
    /// was the last one completed.
    pub fn observe(&mut self, timeline: &Timeline) -> Option<AnimationStart> {
        if self.state != AnimationState::Idle {
            return None;
        }
        let id = Self::candidate(timeline)?;
        if self.last_completed == Some(id) || !self.started.insert(id) {
            return None;
        }

        self.generation += 1;
        self.state = AnimationState::Animating(id);
        tracing::debug!(message_id = %id, generation = self.generation, "animation started");
        Some(AnimationStart {
            message_id: id,
            generation: self.generation,
        })
    }

    /// Marks the reveal of `message_id` complete.
    ///
    /// Ignored (returns `false`) unless that message holds the token under
    /// the given generation.
    pub fn complete(&mut self, message_id: MessageId, generation: u64) -> bool {
        if self.state != AnimationState::Animating(message_id) || self.generation != generation {
            return false;
        }
        self.state = AnimationState::Idle;
        self.last_completed = Some(message_id);
        tracing::debug!(message_id = %message_id, "animation completed");
        true
    }

    /// Drops the token without completing it. Returns the cancelled id.
    pub fn cancel(&mut self) -> Option<MessageId> {
        let id = self.animating()?;
        self.state = AnimationState::Idle;
        self.generation += 1;
        tracing::debug!(message_id = %id, "animation cancelled");
        Some(id)
    }
}
