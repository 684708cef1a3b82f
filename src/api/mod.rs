pub mod client;
pub mod logging;
pub mod mock_client;

pub use client::ApiClient;
pub use mock_client::{MockReply, MockTransport, RecordedCall};

use crate::error::TransportError;
use futures::future::BoxFuture;

/// Sends one (system prompt, user text) pair to the remote model.
///
/// A single instance is shared by every tab, so implementations must tolerate
/// concurrent in-flight requests.
pub trait Transport: Send + Sync {
    fn send<'a>(
        &'a self,
        system_prompt: &'a str,
        user_text: &'a str,
    ) -> BoxFuture<'a, Result<String, TransportError>>;
}
