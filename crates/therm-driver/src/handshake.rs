// SPDX-License-Identifier: AGPL-3.0-only

//! Flag-based rendezvous with the thermal top.
//!
//! ```text
//! Idle ──► AwaitingStart ──(start == sentinel)──► Working ──(finish written)──► AwaitingFinishAck
//!  ▲                                                                                   │
//!  └──────────────────────────(finish ≠ own sentinel)──────────────────────────────────┘
//! ```
//!
//! All four channels share one start word and one finish word; the sentinel
//! value names the channel. A match must be exact.
//!
//! The hardware may leave the start word untouched between two rounds of the
//! same channel (store-sensor back to back with prediction disabled). A
//! round counts as acknowledged once the hardware has consumed the finish
//! sentinel, so a start word that still holds the sentinel after that is a
//! fresh request.
//!
//! On bare metal the wait is unbounded. Host targets may bound it with a
//! [`WaitPolicy`] or abort it with a [`CancelToken`]; an interrupted wait
//! writes nothing and leaves the channel in `AwaitingStart`, so a retry
//! resumes the same round.

use crate::error::{Result, ThermError};
use crate::mmio::{regs, MemoryBus, MmioRegister};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use therm_chip::Channel;
use tracing::{debug, trace};

/// Per-channel protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// No round in progress.
    #[default]
    Idle,
    /// Polling for the start sentinel.
    AwaitingStart,
    /// Start observed; stage running.
    Working,
    /// Finish written; the hardware has not yet consumed it.
    AwaitingFinishAck,
}

/// How long a wait may spin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPolicy {
    /// Spin forever (bare-metal behaviour).
    #[default]
    Unbounded,
    /// Give up after this many unsuccessful polls.
    MaxPolls(u64),
    /// Give up once this much wall time has passed.
    Timeout(Duration),
}

/// Shared flag that aborts in-flight waits.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort every wait observing this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether [`CancelToken::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Outcome of one completed round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundStats {
    /// Channel served.
    pub channel: Channel,
    /// Unsuccessful polls before the start sentinel was seen, including any
    /// wait for the previous round's acknowledgement.
    pub polls: u64,
    /// Hardware cycle counter read after the finish write.
    pub cycles: u64,
}

/// Drives the start/finish rendezvous for all four channels.
#[derive(Debug, Clone)]
pub struct HandshakeCoordinator {
    policy: WaitPolicy,
    cancel: Option<CancelToken>,
    states: [ChannelState; 4],
    rounds: [u64; 4],
    last: Option<RoundStats>,
}

impl HandshakeCoordinator {
    /// Coordinator with every channel idle.
    pub fn new(policy: WaitPolicy) -> Self {
        Self {
            policy,
            cancel: None,
            states: [ChannelState::Idle; 4],
            rounds: [0; 4],
            last: None,
        }
    }

    /// Attach a cancel token checked on every poll.
    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.set_cancel(token);
        self
    }

    /// Attach a cancel token without touching channel state.
    pub fn set_cancel(&mut self, token: CancelToken) {
        self.cancel = Some(token);
    }

    /// Active wait policy.
    pub fn policy(&self) -> WaitPolicy {
        self.policy
    }

    /// Current state of a channel.
    pub fn state(&self, channel: Channel) -> ChannelState {
        self.states[channel.index()]
    }

    /// Rounds completed on a channel.
    pub fn rounds(&self, channel: Channel) -> u64 {
        self.rounds[channel.index()]
    }

    /// Statistics of the most recent completed round.
    pub fn last_round(&self) -> Option<RoundStats> {
        self.last
    }

    /// Serve one round on `channel`.
    ///
    /// Waits for the hardware to consume this channel's previous finish
    /// sentinel if one is pending, then for the start sentinel, runs `work`,
    /// and writes the finish sentinel. `work` runs exactly once per
    /// successful call.
    ///
    /// # Errors
    ///
    /// [`ThermError::Timeout`] or [`ThermError::Cancelled`] if a bounded wait
    /// ends first. Nothing is written to the finish word in that case and
    /// `work` does not run.
    pub fn rendezvous<B, T, F>(&mut self, bus: &mut B, channel: Channel, work: F) -> Result<T>
    where
        B: MemoryBus + ?Sized,
        F: FnOnce(&mut B) -> T,
    {
        let start = channel.start_sentinel();
        let finish = channel.finish_sentinel();

        let mut polls = 0;
        if self.state(channel) == ChannelState::AwaitingFinishAck {
            polls = self.wait_for(bus, channel, regs::FINISH_FLAG, |word| word != finish)?;
        }
        self.set(channel, ChannelState::AwaitingStart);

        polls += self.wait_for(bus, channel, regs::START_FLAG, |word| word == start)?;
        self.set(channel, ChannelState::Working);
        trace!(%channel, polls, "start observed");

        let out = work(bus);

        regs::FINISH_FLAG.write(bus, finish);
        self.set(channel, ChannelState::AwaitingFinishAck);

        let cycles = regs::cycle_counter(channel).read(bus);
        self.rounds[channel.index()] += 1;
        self.last = Some(RoundStats {
            channel,
            polls,
            cycles,
        });
        debug!(
            %channel,
            round = self.rounds[channel.index()],
            polls,
            cycles,
            "round complete"
        );
        Ok(out)
    }

    fn set(&mut self, channel: Channel, state: ChannelState) {
        self.states[channel.index()] = state;
    }

    /// Spin on `flag` until `done` holds. Returns failed polls.
    fn wait_for<B>(
        &self,
        bus: &mut B,
        channel: Channel,
        flag: MmioRegister<u64>,
        done: impl Fn(u64) -> bool,
    ) -> Result<u64>
    where
        B: MemoryBus + ?Sized,
    {
        let began = Instant::now();
        let mut polls = 0u64;
        loop {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(ThermError::Cancelled { channel });
            }
            if done(flag.read(bus)) {
                return Ok(polls);
            }
            polls += 1;

            let expired = match self.policy {
                WaitPolicy::Unbounded => false,
                WaitPolicy::MaxPolls(limit) => polls >= limit,
                WaitPolicy::Timeout(limit) => began.elapsed() >= limit,
            };
            if expired {
                return Err(ThermError::Timeout {
                    channel,
                    polls,
                    elapsed_ms: u64::try_from(began.elapsed().as_millis()).unwrap_or(u64::MAX),
                });
            }
            std::hint::spin_loop();
        }
    }
}
