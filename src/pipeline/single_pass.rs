use super::normalize_dashes;
use super::prompts::delimited_source;
use crate::api::Transport;
use crate::error::TransportError;

/// One request: the style prompt as system message, the fenced source as
/// user message. Transport failures are returned as-is.
pub async fn single_pass(
    transport: &dyn Transport,
    style_text: &str,
    source: &str,
) -> Result<String, TransportError> {
    let user_text = delimited_source(source);
    let text = transport.send(style_text, &user_text).await?;
    Ok(normalize_dashes(&text))
}
