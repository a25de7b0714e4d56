// Server-sent events framing of a session's event channel

use axum::response::sse::Event as SseEvent;
use futures::{Stream, StreamExt};
use sluice_mcp::{Event, McpResult, McpSession, SessionManager};
use std::convert::Infallible;
use std::sync::Arc;

/// Removes the session and closes its channel when the stream is dropped
struct SessionGuard {
    sessions: Arc<SessionManager>,
    session: Arc<McpSession>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.delete_session(self.session.id());
        self.session.close();
        tracing::info!("Stream for session {} released", self.session.id());
    }
}

/// Frame one channel event as `event: <kind>` / `data: <payload>`
pub fn frame(event: &Event) -> SseEvent {
    SseEvent::default().event(&event.kind).data(&event.payload)
}

/// Queue the session's bootstrap event and drain its events for as long as
/// the client stays connected.
///
/// The session is owned by the returned stream. If the bootstrap event cannot
/// be queued, the session is removed before the error is returned.
pub fn open_event_stream(
    sessions: Arc<SessionManager>,
    session: Arc<McpSession>,
    endpoint_event: &str,
) -> McpResult<impl Stream<Item = Result<SseEvent, Infallible>> + Send + 'static> {
    let guard = SessionGuard { sessions, session };
    guard.session.open(endpoint_event)?;
    let events = guard.session.reader();

    Ok(async_stream::stream! {
        let _guard = guard;
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            yield Ok(frame(&event));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_mcp::tools::ProviderCatalog;
    use sluice_mcp::ENDPOINT_EVENT;

    fn sessions() -> Arc<SessionManager> {
        Arc::new(SessionManager::new(ProviderCatalog::new()))
    }

    #[tokio::test]
    async fn test_stream_starts_with_endpoint_and_owns_session() {
        let sessions = sessions();
        let session = sessions.create_session("my_mcp", "/rpc", "services");

        let mut stream =
            Box::pin(open_event_stream(sessions.clone(), session.clone(), ENDPOINT_EVENT).unwrap());
        assert!(stream.next().await.is_some());
        assert_eq!(sessions.len(), 1);

        drop(stream);
        assert!(sessions.is_empty());
        assert!(session.is_closed());
    }

    #[test]
    fn test_failed_open_removes_session() {
        let sessions = sessions();
        let session = sessions.create_session("my_mcp", "/rpc", "services");
        session.close();

        let result = open_event_stream(sessions.clone(), session.clone(), ENDPOINT_EVENT);
        assert!(result.is_err());
        assert!(sessions.is_empty());
        assert!(sessions.get_session(session.id()).is_none());
    }
}
