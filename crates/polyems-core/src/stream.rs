//! Server-sent-event parsing and drain-to-completion for streamed completions

use anyhow::{Context, Result, anyhow};
use futures_util::{Stream, StreamExt, TryStreamExt, stream};
use serde::Deserialize;

use crate::providers::types::or_placeholder;

/// Turn a raw SSE byte stream into the text fragments carried by
/// `data:` lines of OpenAI-style `chat.completion.chunk` events.
///
/// The stream ends at `data: [DONE]` or when the body closes. Chunks without
/// delta content are skipped. An `error` event or a `data:` payload that is
/// not valid JSON (including one cut off when the body closes) fails the
/// stream.
pub fn sse_fragments<S, B, E>(body: S) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::error::Error + Send + Sync + 'static,
{
    stream::try_unfold(
        (body, Vec::<u8>::new(), false),
        |(mut body, mut buf, mut ended)| async move {
            loop {
                while let Some(line_end) = buf.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=line_end).collect();
                    let line = String::from_utf8_lossy(&line);
                    let line = line.trim_end_matches(['\n', '\r']);

                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim_start();
                    if data == "[DONE]" {
                        return Ok(None);
                    }

                    let event = serde_json::from_str::<ChunkEvent>(data)
                        .with_context(|| format!("Malformed stream event: {}", data))?;
                    if let Some(error) = event.error {
                        return Err(anyhow!("Stream reported an error: {}", error_text(&error)));
                    }
                    if let Some(text) = event.into_fragment() {
                        return Ok(Some((text, (body, buf, ended))));
                    }
                }

                if ended {
                    return Ok(None);
                }

                match body.next().await {
                    Some(Ok(chunk)) => buf.extend_from_slice(chunk.as_ref()),
                    Some(Err(e)) => return Err(anyhow!(e).context("Stream read failed")),
                    None => {
                        ended = true;
                        // flush a final line that arrived without a newline
                        if !buf.is_empty() {
                            buf.push(b'\n');
                        }
                    }
                }
            }
        },
    )
}

/// Consume a finite fragment stream to the end, concatenating in arrival order.
///
/// An empty result becomes the "no response" placeholder. The first error
/// aborts the drain.
pub async fn drain_fragments<S>(fragments: S) -> Result<String>
where
    S: Stream<Item = Result<String>>,
{
    let text = fragments
        .try_fold(String::new(), |mut acc, fragment| async move {
            acc.push_str(&fragment);
            Ok(acc)
        })
        .await?;
    Ok(or_placeholder(text))
}

#[derive(Debug, Deserialize)]
struct ChunkEvent {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// `"error": "msg"` or `"error": {"message": "msg", ...}`
fn error_text(error: &serde_json::Value) -> String {
    match error {
        serde_json::Value::String(s) => s.clone(),
        other => other
            .get("message")
            .and_then(|m| m.as_str())
            .map_or_else(|| other.to_string(), str::to_string),
    }
}

impl ChunkEvent {
    fn into_fragment(self) -> Option<String> {
        self.choices.into_iter().next().and_then(|c| c.delta.content)
    }
}
