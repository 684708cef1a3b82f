use super::Transport;
use crate::error::TransportError;
use futures::future::{BoxFuture, FutureExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted answer from [`MockTransport`].
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Fail(TransportError),
    Delayed(Duration, Box<MockReply>),
    /// Never resolves; only cancellation ends the request.
    Hang,
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn timeout() -> Self {
        Self::Fail(TransportError::Network("request timed out".to_string()))
    }

    pub fn after(delay: Duration, reply: MockReply) -> Self {
        Self::Delayed(delay, Box::new(reply))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub system_prompt: String,
    pub user_text: String,
}

#[derive(Default)]
struct MockState {
    queue: VecDeque<MockReply>,
    routes: Vec<(String, VecDeque<MockReply>)>,
    calls: Vec<RecordedCall>,
}

/// In-process [`Transport`] that replays scripted replies and records every
/// request it receives.
///
/// Routed replies (keyed by a substring of the system prompt) are consulted
/// first; everything else is served from the shared queue in call order.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new(replies: Vec<MockReply>) -> Self {
        let transport = Self::default();
        transport.lock().queue.extend(replies);
        transport
    }

    pub fn route(self, system_prompt_contains: impl Into<String>, replies: Vec<MockReply>) -> Self {
        self.lock()
            .routes
            .push((system_prompt_contains.into(), replies.into()));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_reply(&self, system_prompt: &str, user_text: &str) -> Option<MockReply> {
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            system_prompt: system_prompt.to_string(),
            user_text: user_text.to_string(),
        });
        let routed = state
            .routes
            .iter_mut()
            .find(|(needle, replies)| !replies.is_empty() && system_prompt.contains(needle.as_str()))
            .and_then(|(_, replies)| replies.pop_front());
        routed.or_else(|| state.queue.pop_front())
    }
}

impl Transport for MockTransport {
    fn send<'a>(
        &'a self,
        system_prompt: &'a str,
        user_text: &'a str,
    ) -> BoxFuture<'a, Result<String, TransportError>> {
        let reply = self.next_reply(system_prompt, user_text);
        async move {
            let Some(mut reply) = reply else {
                return Err(TransportError::Network(
                    "MockTransport: no more replies configured".to_string(),
                ));
            };
            loop {
                match reply {
                    MockReply::Text(text) => return Ok(text),
                    MockReply::Fail(error) => return Err(error),
                    MockReply::Delayed(delay, inner) => {
                        tokio::time::sleep(delay).await;
                        reply = *inner;
                    }
                    MockReply::Hang => return futures::future::pending().await,
                }
            }
        }
        .boxed()
    }
}
