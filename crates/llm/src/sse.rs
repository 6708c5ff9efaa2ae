//! Server-sent event framing of unified streams.

use futures::{Stream, StreamExt, stream};

use crate::messages::unified::StreamEvent;

/// Terminates every framed stream.
pub const DONE: &str = "data: [DONE]\n\n";

/// Frames one event as `event: <type>\ndata: <json>\n\n`.
pub fn encode(event: &StreamEvent) -> String {
    match sonic_rs::to_string(event) {
        Ok(data) => format!("event: {}\ndata: {data}\n\n", event.event_type()),
        Err(e) => {
            log::error!("Failed to serialize {} event: {e}", event.event_type());

            "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"api_error\",\"message\":\"Internal server error\"}}\n\n"
                .to_string()
        }
    }
}

/// Frames a unified event stream, turning errors into `error` events and appending [`DONE`].
pub fn frame_stream<S>(events: S) -> impl Stream<Item = String> + Send
where
    S: Stream<Item = crate::Result<StreamEvent>> + Send,
{
    events
        .map(|event| match event {
            Ok(event) => encode(&event),
            Err(e) => encode(&StreamEvent::Error {
                error: e.to_unified().error,
            }),
        })
        .chain(stream::once(async { DONE.to_string() }))
}
