//! Scripted connector for driving a [`StreamChannel`](crate::StreamChannel)
//! without a network.

use crate::error::{ChannelError, Result};
use crate::transport::{Frame, StreamConnector, StreamTransport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

/// Sender half feeding frames into an accepted scripted socket. Dropping it
/// closes the socket.
pub type FrameSender = mpsc::UnboundedSender<Result<Frame>>;

enum Plan {
    Refuse,
    Accept(mpsc::UnboundedReceiver<Result<Frame>>),
}

#[derive(Default)]
struct Script {
    plans: VecDeque<Plan>,
    attempts: Vec<Instant>,
}

/// Connector whose outcomes are queued up front. Attempts past the end of
/// the script are refused.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse_next(&self) {
        self.lock_script().plans.push_back(Plan::Refuse);
    }

    /// Queue a successful open and return the sender for its inbound frames.
    pub fn accept_next(&self) -> FrameSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock_script().plans.push_back(Plan::Accept(rx));
        tx
    }

    /// Times at which `open` was called.
    #[must_use]
    pub fn attempts(&self) -> Vec<Instant> {
        self.lock_script().attempts.clone()
    }

    /// Text frames written by the channel across all sockets.
    #[must_use]
    pub fn sent_frames(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl StreamConnector for ScriptedConnector {
    async fn open(&self, url: &Url) -> Result<Box<dyn StreamTransport>> {
        let plan = {
            let mut script = self.lock_script();
            script.attempts.push(Instant::now());
            script.plans.pop_front().unwrap_or(Plan::Refuse)
        };
        match plan {
            Plan::Refuse => Err(ChannelError::Connection(format!(
                "scripted refusal for {}",
                url
            ))),
            Plan::Accept(frames) => Ok(Box::new(ScriptedTransport {
                frames,
                sent: Arc::clone(&self.sent),
            })),
        }
    }
}

struct ScriptedTransport {
    frames: mpsc::UnboundedReceiver<Result<Frame>>,
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl StreamTransport for ScriptedTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text);
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        self.frames.recv().await
    }

    async fn close(&mut self) {
        self.frames.close();
    }
}
