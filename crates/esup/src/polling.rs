//! 🔄 Polling: the beating heart of every cloud workflow ever written.
//!
//! 🎬 *[a domain is processing. an engineer is refreshing.]*
//! *[the status says IN_PROGRESS. it has said IN_PROGRESS for forty minutes.]*
//! *["it's fine," they whisper. "it's a managed service."]*
//!
//! Every step of the migration ends the same way: kick something off, then ask
//! "done yet?" until the answer is yes, or until we've asked too many times.
//! [`Poller`] is that question, asked politely, on a schedule, with a spinner.
//!
//! 🧠 Knowledge graph:
//! - The check owns the domain knowledge. It returns [`PollState::Pending`] with a note,
//!   or [`PollState::Done`] with a value, or an `Err` for "this will never succeed".
//! - The poller owns the timing: settle delay, interval, optional attempt cap.
//! - Transient failures are the check's call to make. The poller does not second-guess. 🦆

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info};

use crate::app_config::PollingConfig;
use crate::progress::{PollSpinner, format_duration};

/// 🚦 What a check reports after one look at the world.
#[derive(Debug, Clone, PartialEq)]
pub enum PollState<T> {
    /// ⏳ Not yet. The note says what we saw ("IN_PROGRESS", "HTTP 403", ...).
    Pending(String),
    /// ✅ Done. Here's the thing you were waiting for.
    Done(T),
}

/// ⏱️ Asks the same question on a schedule until it gets a good answer.
#[derive(Debug, Clone)]
pub struct Poller {
    label: String,
    interval: Duration,
    settle: Duration,
    max_attempts: Option<u32>,
}

impl Poller {
    pub fn new(label: impl Into<String>, interval: Duration) -> Self {
        Self {
            label: label.into(),
            interval,
            settle: Duration::ZERO,
            max_attempts: None,
        }
    }

    /// 🔧 The everyday poller: config interval, config attempt cap.
    pub fn from_config(label: impl Into<String>, config: &PollingConfig) -> Self {
        Self::new(label, Duration::from_millis(config.interval_ms))
            .with_max_attempts(config.max_attempts)
    }

    /// 🐢 The upgrade poller: slower interval, plus a settle delay before the first look,
    /// because the status endpoint keeps showing the previous operation for a few seconds.
    pub fn for_upgrades(label: impl Into<String>, config: &PollingConfig) -> Self {
        Self::new(label, Duration::from_millis(config.upgrade_interval_ms))
            .with_settle(Duration::from_millis(config.upgrade_settle_ms))
            .with_max_attempts(config.max_attempts)
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// 🔁 Run `check` until it says [`PollState::Done`].
    ///
    /// The check receives the 1-based attempt number. An `Err` from the check ends the
    /// wait immediately; running out of attempts ends it with an error naming the last note.
    pub async fn until<T, F, Fut>(&self, mut check: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<PollState<T>>>,
    {
        info!("⏳ {}: waiting...", self.label);
        if !self.settle.is_zero() {
            // 💤 let the dust settle before the first look
            tokio::time::sleep(self.settle).await;
        }

        let spinner = PollSpinner::new(&self.label);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match check(attempt).await {
                Ok(PollState::Done(value)) => {
                    let elapsed = spinner.finish();
                    info!(
                        "✅ {}: done after {} attempt(s) in {}",
                        self.label,
                        attempt,
                        format_duration(elapsed)
                    );
                    return Ok(value);
                }
                Ok(PollState::Pending(note)) => {
                    debug!("🔄 {} attempt {}: {}", self.label, attempt, note);
                    spinner.note(attempt, &note);
                    if self.max_attempts.is_some_and(|max| attempt >= max) {
                        spinner.finish();
                        anyhow::bail!(
                            "💀 {} ran out of patience after {} attempts. Last thing we saw: '{}'. \
                             Raise polling.max_attempts if the cloud is just being slow today.",
                            self.label,
                            attempt,
                            note
                        );
                    }
                }
                Err(err) => {
                    spinner.finish();
                    return Err(err.context(format!(
                        "💀 {} gave up on attempt {}: the check reported something that won't fix itself by waiting",
                        self.label, attempt
                    )));
                }
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}
