//! Software latch handshake.
//!
//! Setting `software_latch1`/`software_latch2` in DSP_CR3 makes the chip copy both RMS paths of the
//! channel into the data registers at one instant; it clears the bit itself when done. The host
//! writes the request and then polls DSP_CR3 until every requested bit reads back as zero.

use core::time::Duration;

use crate::data_types::Channels;

/// Bounds on the polling phase.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LatchBudget {
    /// Read-backs of DSP_CR3 before giving up.
    pub max_polls: u32,
    /// Sleep between read-backs.
    pub poll_interval: Duration,
    /// Upper bound on total time slept between polls.
    pub deadline: Option<Duration>,
}

impl Default for LatchBudget {
    fn default() -> Self {
        Self {
            max_polls: 300,
            poll_interval: Duration::from_millis(1),
            deadline: None,
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LatchState {
    /// Latch bits not yet written to the chip.
    Requested,
    /// Request written, waiting for the chip to clear the bits.
    Polling,
    /// Every requested channel reported cleared.
    Latched,
    /// Budget exhausted with channels still pending.
    TimedOut,
}

/// Progress of one latch request.
#[derive(Clone, Copy, Debug)]
pub struct LatchHandshake {
    requested: Channels,
    pending: Channels,
    budget: LatchBudget,
    polls: u32,
    waited: Duration,
    state: LatchState,
}

impl LatchHandshake {
    pub fn new(channels: Channels, budget: LatchBudget) -> Self {
        Self {
            requested: channels,
            pending: channels,
            budget,
            polls: 0,
            waited: Duration::ZERO,
            state: LatchState::Requested,
        }
    }

    pub fn state(&self) -> LatchState {
        self.state
    }

    /// Channels that have not yet reported cleared.
    pub fn pending(&self) -> Channels {
        self.pending
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn budget(&self) -> &LatchBudget {
        &self.budget
    }

    /// The request has been written to the chip.
    pub fn request_sent(&mut self) -> LatchState {
        if self.state == LatchState::Requested {
            self.state = if self.pending.is_empty() {
                LatchState::Latched
            } else if self.budget.max_polls == 0 {
                LatchState::TimedOut
            } else {
                LatchState::Polling
            };
        }
        self.state
    }

    /// Record one read-back of the latch bits (`true` = still set).
    pub fn observe(&mut self, latch1: bool, latch2: bool) -> LatchState {
        if self.state != LatchState::Polling {
            return self.state;
        }
        self.polls += 1;
        if self.requested.channel1 && !latch1 {
            self.pending.channel1 = false;
        }
        if self.requested.channel2 && !latch2 {
            self.pending.channel2 = false;
        }

        if self.pending.is_empty() {
            self.state = LatchState::Latched;
        } else if self.polls >= self.budget.max_polls || !self.can_wait() {
            self.state = LatchState::TimedOut;
        }
        self.state
    }

    /// Account for one poll interval slept.
    pub fn waited(&mut self) {
        self.waited += self.budget.poll_interval;
    }

    fn can_wait(&self) -> bool {
        match self.budget.deadline {
            Some(deadline) => self.waited + self.budget.poll_interval <= deadline,
            None => true,
        }
    }
}
