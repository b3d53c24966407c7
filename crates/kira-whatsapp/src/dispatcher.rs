//! Text command dispatcher
//!
//! Consumes live message batches and answers the two chat commands:
//! `ping`, and the pairing phrase with its delayed follow-up.

use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use regex::Regex;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use kira_core::{PairingConfig, VerificationRecorder};

use crate::error::Result;
use crate::socket::MessageSender;
use crate::tasks::{DeferredTask, TaskSet};
use crate::types::{MessagesUpsert, UpsertKind, WebMessage, is_broadcast, is_group, phone_number};

pub const PONG: &str = "🏓 Pong!";
pub const PLEASE_WAIT: &str = "Bro Please wait...";
pub const VERIFICATION_FAILED: &str =
    "❌ *Verification Failed*\n\nThere was an error processing your request. Please try again later.";
pub const FOLLOW_UP_ERROR: &str = "❌ *Error*\n\nAn error occurred. Please try again.";

static PAIR_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)pair\s+me\s+x-kira\s+pro").expect("pair phrase pattern is valid")
});

/// Recognised chat commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Pair,
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        if text.trim().eq_ignore_ascii_case("ping") {
            Some(Self::Ping)
        } else if PAIR_PHRASE.is_match(text) {
            Some(Self::Pair)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Follow-up delay candidates, picked uniformly
    pub pairing_delays: Vec<Duration>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from(&PairingConfig::default())
    }
}

impl From<&PairingConfig> for DispatcherConfig {
    fn from(config: &PairingConfig) -> Self {
        Self {
            pairing_delays: config
                .delays_minutes
                .iter()
                .map(|minutes| Duration::from_secs(minutes * 60))
                .collect(),
        }
    }
}

pub struct CommandDispatcher {
    sender: Arc<dyn MessageSender>,
    recorder: VerificationRecorder,
    config: DispatcherConfig,
    follow_ups: TaskSet,
}

impl CommandDispatcher {
    pub fn new(
        sender: Arc<dyn MessageSender>,
        recorder: VerificationRecorder,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            sender,
            recorder,
            config,
            follow_ups: TaskSet::new(),
        }
    }

    /// Handle batches one at a time until the channel closes
    pub async fn run(self: Arc<Self>, mut batches: mpsc::Receiver<MessagesUpsert>) {
        while let Some(batch) = batches.recv().await {
            self.handle_batch(batch).await;
        }
        debug!("Message channel closed, dispatcher stopping");
    }

    pub async fn handle_batch(&self, batch: MessagesUpsert) {
        if batch.kind != UpsertKind::Notify {
            return;
        }

        for message in &batch.messages {
            if let Err(e) = self.handle_message(message).await {
                error!("Error handling message: {}", e);
            }
        }
    }

    async fn handle_message(&self, message: &WebMessage) -> Result<()> {
        if message.message.is_none() {
            return Ok(());
        }

        let jid = message.remote_jid();
        if is_group(jid) || is_broadcast(jid) {
            return Ok(());
        }

        match Command::parse(message.text()) {
            Some(Command::Ping) => self.handle_ping(jid).await,
            Some(Command::Pair) => self.handle_pair(jid).await,
            None => Ok(()),
        }
    }

    async fn handle_ping(&self, jid: &str) -> Result<()> {
        let start = Instant::now();
        self.sender.send_text(jid, PONG).await?;
        let elapsed = start.elapsed().as_millis();

        self.sender
            .send_text(jid, &format!("⚡ *Response Time:* {}ms", elapsed))
            .await
    }

    async fn handle_pair(&self, jid: &str) -> Result<()> {
        let delay = self.pick_delay();
        info!(
            "Pairing request from {}, following up in {} minutes",
            jid,
            delay.as_secs() / 60
        );

        let sender = Arc::clone(&self.sender);
        let recorder = self.recorder.clone();
        let jid_owned = jid.to_string();
        self.follow_ups.push(DeferredTask::schedule(delay, async move {
            follow_up(sender, recorder, jid_owned).await;
        }));

        self.sender.send_text(jid, PLEASE_WAIT).await
    }

    fn pick_delay(&self) -> Duration {
        self.config
            .pairing_delays
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(Duration::from_secs(5 * 60))
    }

    /// Follow-ups that have not fired yet
    pub fn pending_follow_ups(&self) -> usize {
        self.follow_ups.pending()
    }

    pub fn cancel_pending(&self) {
        self.follow_ups.cancel_all();
    }
}

async fn follow_up(sender: Arc<dyn MessageSender>, recorder: VerificationRecorder, jid: String) {
    let phone = phone_number(&jid);
    let reply = if recorder.record(&phone).await {
        format!("pair again x-kira pro {}", phone)
    } else {
        VERIFICATION_FAILED.to_string()
    };

    if let Err(e) = sender.send_text(&jid, &reply).await {
        error!("Error in delayed pairing reply to {}: {}", jid, e);
        if let Err(e) = sender.send_text(&jid, FOLLOW_UP_ERROR).await {
            error!("Failed to send error message to {}: {}", jid, e);
        }
    }
}
