//! Streaming chat session
//!
//! A session manages exactly one chat-completion round trip:
//!
//! ```text
//! idle -> awaiting_response -> streaming -> completed
//!                  |               |
//!                  +---------------+-----> failed
//! ```
//!
//! The caller observes the exchange as a lazy stream of [`Snapshot`]s. The
//! first item is always the list with the user turn appended; every decoded
//! frame then yields the list with the accumulated reply as its last element.
//! A failure is delivered as the final `Err` item; completion ends the stream.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use parking_lot::{Mutex, MutexGuard};
use reqwest::{Response, StatusCode};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::config::CompletionOptions;
use crate::error::{ChatError, Result};
use crate::message::{Message, Snapshot};
use crate::request::{ChatTurn, Credentials};
use crate::stream::{FrameParser, MarkerMode, StreamDelta, Utf8StreamDecoder};

/// Ordered snapshots of one session, ending with an `Err` item on failure.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<Snapshot>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    AwaitingResponse,
    Streaming,
    Completed,
    Failed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingResponse => "awaiting_response",
            SessionState::Streaming => "streaming",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for the body of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub chunks: usize,
    pub bytes: usize,
    /// Every frame seen, malformed ones included.
    pub frames: usize,
    pub malformed_frames: usize,
}

impl StreamStats {
    /// True when frames arrived but none of them could be decoded.
    pub fn all_frames_malformed(&self) -> bool {
        self.frames > 0 && self.frames == self.malformed_frames
    }
}

#[derive(Debug)]
struct SessionRecord {
    state: SessionState,
    dispatched: bool,
    last_snapshot: Option<Snapshot>,
    stats: StreamStats,
}

/// Shared view of a session's progress, readable while the stream runs.
#[derive(Debug, Clone)]
struct SessionTracker {
    record: Arc<Mutex<SessionRecord>>,
}

impl SessionTracker {
    fn new() -> Self {
        Self {
            record: Arc::new(Mutex::new(SessionRecord {
                state: SessionState::Idle,
                dispatched: false,
                last_snapshot: None,
                stats: StreamStats::default(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionRecord> {
        self.record.lock()
    }

    fn transition(&self, next: SessionState) {
        let mut record = self.lock();
        if record.state.is_terminal() {
            return;
        }
        tracing::debug!(from = %record.state, to = %next, "Session state transition");
        record.state = next;
    }

    fn fail(&self, error: &ChatError) {
        tracing::warn!(error = %error, "Chat session failed");
        self.transition(SessionState::Failed);
    }

    /// The stream was dropped before reaching a terminal state.
    fn abandon(&self) {
        let mut record = self.lock();
        if record.state.is_terminal() {
            return;
        }
        tracing::warn!(from = %record.state, "Chat session stream dropped before completion");
        record.state = SessionState::Failed;
    }

    fn record_snapshot(&self, snapshot: &Snapshot) {
        self.lock().last_snapshot = Some(snapshot.clone());
    }

    fn note_chunk(&self, len: usize) {
        let mut record = self.lock();
        record.stats.chunks += 1;
        record.stats.bytes += len;
    }

    fn note_frame(&self, malformed: bool) {
        let mut record = self.lock();
        record.stats.frames += 1;
        if malformed {
            record.stats.malformed_frames += 1;
        }
    }
}

/// Fails the session when the generator holding it is dropped early.
struct AbandonGuard(SessionTracker);

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        self.0.abandon();
    }
}

/// Folds reply fragments into the visible message list.
struct ReplyBuilder {
    messages: Vec<Message>,
    content: String,
    started: bool,
}

impl ReplyBuilder {
    fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            content: String::new(),
            started: false,
        }
    }

    fn append(&mut self, fragment: &str) -> Snapshot {
        self.content.push_str(fragment);
        let reply = Message::assistant(self.content.clone());
        match self.messages.last_mut() {
            Some(last) if self.started => *last = reply,
            _ => {
                self.messages.push(reply);
                self.started = true;
            }
        }
        Snapshot::with_reply(self.messages.clone())
    }
}

/// One chat-completion round trip. Build a new session for every send.
pub struct StreamingChatSession {
    api: ApiClient,
    options: CompletionOptions,
    tracker: SessionTracker,
    cancel: CancellationToken,
}

impl StreamingChatSession {
    pub fn new(api: ApiClient, options: CompletionOptions) -> Self {
        Self {
            api,
            options,
            tracker: SessionTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.tracker.lock().state
    }

    /// The last snapshot delivered, which is the final state once the
    /// session is terminal. Partial replies are kept on failure.
    pub fn last_snapshot(&self) -> Option<Snapshot> {
        self.tracker.lock().last_snapshot.clone()
    }

    pub fn stats(&self) -> StreamStats {
        self.tracker.lock().stats
    }

    /// Abandon the exchange at the next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Send one user turn and stream the evolving message list.
    ///
    /// The request body is built here, before the stream is polled. The token
    /// is used for this request only and never retained by the session.
    pub fn send(&self, turn: ChatTurn, credentials: &Credentials) -> Result<SnapshotStream> {
        if turn.model.trim().is_empty() {
            return Err(ChatError::InvalidRequest("model must not be empty".to_string()));
        }
        if turn.prompt.trim().is_empty() {
            return Err(ChatError::InvalidRequest("prompt must not be empty".to_string()));
        }

        {
            let mut record = self.tracker.lock();
            if record.dispatched {
                return Err(ChatError::SessionInUse(record.state));
            }
            record.dispatched = true;
        }

        let request = turn.to_request(credentials.chat_id.clone(), self.options);
        let visible = turn.visible_messages();
        let token = credentials.token.clone();
        let api = self.api.clone();
        let tracker = self.tracker.clone();
        let cancel = self.cancel.clone();
        let mode = api.config().marker_mode;

        Ok(Box::pin(async_stream::stream! {
            let _guard = AbandonGuard(tracker.clone());
            let pending = Snapshot::pending(visible.clone());
            tracker.record_snapshot(&pending);
            yield Ok(pending);

            tracker.transition(SessionState::AwaitingResponse);
            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ChatError::Cancelled),
                response = api.open_completion(&request, token.as_deref()) => response,
            };
            let response = match opened {
                Ok(response) => response,
                Err(e) => {
                    tracker.fail(&e);
                    yield Err(e);
                    return;
                }
            };

            if !has_stream_body(&response) {
                let e = ChatError::UnsupportedStream;
                tracker.fail(&e);
                yield Err(e);
                return;
            }

            let mut body = fold_body(tracker, visible, response.bytes_stream(), mode, cancel);
            while let Some(item) = body.next().await {
                yield item;
            }
        }))
    }
}

fn has_stream_body(response: &Response) -> bool {
    let status = response.status();
    if status == StatusCode::NO_CONTENT || status == StatusCode::RESET_CONTENT {
        return false;
    }
    response.content_length() != Some(0)
}

/// Read `body` to its end, emitting a snapshot for every decoded frame.
fn fold_body<B, T, E>(
    tracker: SessionTracker,
    messages: Vec<Message>,
    body: B,
    mode: MarkerMode,
    cancel: CancellationToken,
) -> SnapshotStream
where
    B: Stream<Item = std::result::Result<T, E>> + Send + 'static,
    T: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let _guard = AbandonGuard(tracker.clone());
        tracker.transition(SessionState::Streaming);

        let mut body = Box::pin(body);
        let mut decoder = Utf8StreamDecoder::new();
        let mut parser = FrameParser::new(mode);
        let mut reply = ReplyBuilder::new(messages);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                chunk = body.next() => Some(chunk),
            };

            match next {
                None => {
                    let e = ChatError::Cancelled;
                    tracker.fail(&e);
                    yield Err(e);
                    return;
                }
                Some(Some(Ok(chunk))) => {
                    let bytes = chunk.as_ref();
                    tracker.note_chunk(bytes.len());
                    let text = decoder.decode(bytes);
                    for frame in parser.push(&text) {
                        if let Some(snapshot) = apply_frame(&tracker, &mut reply, frame) {
                            yield Ok(snapshot);
                        }
                    }
                }
                Some(Some(Err(e))) => {
                    let e = ChatError::Read(e.to_string());
                    tracker.fail(&e);
                    yield Err(e);
                    return;
                }
                Some(None) => {
                    let tail = decoder.finish();
                    let mut frames = parser.push(&tail);
                    frames.extend(parser.finish());
                    for frame in frames {
                        if let Some(snapshot) = apply_frame(&tracker, &mut reply, frame) {
                            yield Ok(snapshot);
                        }
                    }

                    let stats = tracker.lock().stats;
                    if stats.all_frames_malformed() {
                        tracing::warn!(
                            frames = stats.frames,
                            "Stream ended without a single decodable frame"
                        );
                    }
                    tracing::info!(
                        chunks = stats.chunks,
                        bytes = stats.bytes,
                        frames = stats.frames,
                        malformed = stats.malformed_frames,
                        reply_chars = reply.content.chars().count(),
                        "Chat completion finished"
                    );
                    tracker.transition(SessionState::Completed);
                    return;
                }
            }
        }
    })
}

fn apply_frame(
    tracker: &SessionTracker,
    reply: &mut ReplyBuilder,
    frame: Result<StreamDelta>,
) -> Option<Snapshot> {
    match frame {
        Ok(delta) => {
            tracker.note_frame(false);
            let snapshot = reply.append(&delta.content);
            tracker.record_snapshot(&snapshot);
            Some(snapshot)
        }
        Err(e) => {
            tracker.note_frame(true);
            tracing::warn!(error = %e, "Skipping malformed frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::message::{Conversation, Role};
    use futures::stream;

    fn frame(content: &str) -> String {
        format!(
            "data:{}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    fn base() -> Vec<Message> {
        vec![Message::system("Be terse."), Message::user("2+2?")]
    }

    fn chunks(parts: Vec<String>) -> Vec<std::result::Result<Vec<u8>, String>> {
        parts.into_iter().map(|p| Ok(p.into_bytes())).collect()
    }

    async fn collect(mut body: SnapshotStream) -> (Vec<Snapshot>, Option<ChatError>) {
        let mut snapshots = Vec::new();
        while let Some(item) = body.next().await {
            match item {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => return (snapshots, Some(e)),
            }
        }
        (snapshots, None)
    }

    fn reply_text(snapshot: &Snapshot) -> &str {
        snapshot.assistant().map(|m| m.content.as_str()).unwrap_or("")
    }

    #[tokio::test]
    async fn final_content_is_concatenation_in_order() {
        let tracker = SessionTracker::new();
        let body = stream::iter(chunks(vec![
            frame("Hel"),
            frame(""),
            frame("lo"),
            frame(", world"),
        ]));
        let (snapshots, error) = collect(fold_body(
            tracker.clone(),
            base(),
            body,
            MarkerMode::Validated,
            CancellationToken::new(),
        ))
        .await;

        assert!(error.is_none());
        assert_eq!(snapshots.len(), 4);
        assert_eq!(reply_text(snapshots.last().unwrap()), "Hello, world");
        assert_eq!(tracker.lock().state, SessionState::Completed);
    }

    #[tokio::test]
    async fn reply_replaces_rather_than_duplicates() {
        let body = stream::iter(chunks(vec![frame("a"), frame("b"), frame("c")]));
        let (snapshots, _) = collect(fold_body(
            SessionTracker::new(),
            base(),
            body,
            MarkerMode::Validated,
            CancellationToken::new(),
        ))
        .await;

        let mut previous_len = 0;
        for snapshot in &snapshots {
            let assistants = snapshot
                .messages()
                .iter()
                .filter(|m| m.role == Role::Assistant)
                .count();
            assert_eq!(assistants, 1);
            assert_eq!(snapshot.len(), 3);
            let len = reply_text(snapshot).len();
            assert!(len >= previous_len);
            previous_len = len;
        }
    }

    #[tokio::test]
    async fn malformed_frame_between_good_frames_is_skipped() {
        let tracker = SessionTracker::new();
        let body = stream::iter(chunks(vec![
            frame("left"),
            "data:{not json}\n\n".to_string(),
            frame("right"),
        ]));
        let (snapshots, error) = collect(fold_body(
            tracker.clone(),
            base(),
            body,
            MarkerMode::Validated,
            CancellationToken::new(),
        ))
        .await;

        assert!(error.is_none());
        assert_eq!(snapshots.len(), 2);
        assert_eq!(reply_text(&snapshots[1]), "leftright");
        let stats = tracker.lock().stats;
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.malformed_frames, 1);
        assert!(!stats.all_frames_malformed());
    }

    #[tokio::test]
    async fn frames_split_mid_character_and_mid_line() {
        let whole = format!("{}{}", frame("naïve "), frame("🦀"));
        let bytes = whole.into_bytes();
        let parts: Vec<std::result::Result<Vec<u8>, String>> =
            bytes.chunks(3).map(|c| Ok(c.to_vec())).collect();

        let (snapshots, error) = collect(fold_body(
            SessionTracker::new(),
            base(),
            stream::iter(parts),
            MarkerMode::Validated,
            CancellationToken::new(),
        ))
        .await;

        assert!(error.is_none());
        assert_eq!(reply_text(snapshots.last().unwrap()), "naïve 🦀");
    }

    #[tokio::test]
    async fn read_error_keeps_partial_reply() {
        let tracker = SessionTracker::new();
        let body = stream::iter(vec![
            Ok(frame("partial").into_bytes()),
            Err("connection reset".to_string()),
            Ok(frame("never").into_bytes()),
        ]);
        let (snapshots, error) = collect(fold_body(
            tracker.clone(),
            base(),
            body,
            MarkerMode::Validated,
            CancellationToken::new(),
        ))
        .await;

        assert!(matches!(error, Some(ChatError::Read(ref msg)) if msg == "connection reset"));
        assert_eq!(snapshots.len(), 1);
        let record = tracker.lock();
        assert_eq!(record.state, SessionState::Failed);
        assert_eq!(
            record.last_snapshot.as_ref().map(reply_text),
            Some("partial")
        );
    }

    #[tokio::test]
    async fn cancel_after_frames_yields_cancelled() {
        let tracker = SessionTracker::new();
        let cancel = CancellationToken::new();
        let body = stream::iter(chunks(vec![frame("one "), frame("two")]))
            .chain(stream::pending());
        let mut snapshots = fold_body(
            tracker.clone(),
            base(),
            body,
            MarkerMode::Validated,
            cancel.clone(),
        );

        assert_eq!(reply_text(&snapshots.next().await.unwrap().unwrap()), "one ");
        assert_eq!(reply_text(&snapshots.next().await.unwrap().unwrap()), "one two");
        cancel.cancel();
        assert!(matches!(snapshots.next().await, Some(Err(ChatError::Cancelled))));
        assert!(snapshots.next().await.is_none());

        let record = tracker.lock();
        assert_eq!(record.state, SessionState::Failed);
        assert_eq!(record.last_snapshot.as_ref().map(reply_text), Some("one two"));
    }

    #[tokio::test]
    async fn bytes_without_frames_still_pass_through_streaming() {
        let tracker = SessionTracker::new();
        let body = stream::iter(chunks(vec![": keep-alive\n\n".to_string()]));
        let (snapshots, error) = collect(fold_body(
            tracker.clone(),
            base(),
            body,
            MarkerMode::Validated,
            CancellationToken::new(),
        ))
        .await;

        assert!(snapshots.is_empty());
        assert!(error.is_none());
        let record = tracker.lock();
        assert_eq!(record.state, SessionState::Completed);
        assert_eq!(record.stats.chunks, 1);
    }

    #[tokio::test]
    async fn every_frame_malformed_is_visible_in_stats() {
        let tracker = SessionTracker::new();
        let body = stream::iter(chunks(vec!["garbage\n".to_string(), "more\n".to_string()]));
        let (snapshots, _) = collect(fold_body(
            tracker.clone(),
            base(),
            body,
            MarkerMode::Validated,
            CancellationToken::new(),
        ))
        .await;

        assert!(snapshots.is_empty());
        assert!(tracker.lock().stats.all_frames_malformed());
    }

    #[tokio::test]
    async fn fixed_offset_mode_reads_unmarked_frames() {
        let body = stream::iter(chunks(vec![
            "XXXXX{\"choices\":[{\"delta\":{\"content\":\"raw\"}}]}".to_string(),
        ]));
        let (snapshots, _) = collect(fold_body(
            SessionTracker::new(),
            base(),
            body,
            MarkerMode::FixedOffset,
            CancellationToken::new(),
        ))
        .await;

        assert_eq!(reply_text(snapshots.last().unwrap()), "raw");
    }

    #[tokio::test]
    async fn unterminated_frame_per_chunk_is_read_chunk_by_chunk() {
        for mode in [MarkerMode::FixedOffset, MarkerMode::Validated] {
            let tracker = SessionTracker::new();
            let body = stream::iter(chunks(vec![
                frame("a").trim_end().to_string(),
                frame("b").trim_end().to_string(),
            ]));
            let (snapshots, error) = collect(fold_body(
                tracker.clone(),
                base(),
                body,
                mode,
                CancellationToken::new(),
            ))
            .await;

            assert!(error.is_none());
            assert_eq!(snapshots.len(), 2, "{mode:?}");
            assert_eq!(reply_text(&snapshots[1]), "ab");
            let record = tracker.lock();
            assert_eq!(record.stats.frames, 2);
            assert_eq!(record.stats.malformed_frames, 0);
            assert_eq!(record.state, SessionState::Completed);
        }
    }

    #[tokio::test]
    async fn dropping_stream_mid_body_fails_session() {
        let tracker = SessionTracker::new();
        let body = stream::iter(chunks(vec![frame("half")])).chain(stream::pending());
        let mut snapshots = fold_body(
            tracker.clone(),
            base(),
            body,
            MarkerMode::Validated,
            CancellationToken::new(),
        );

        assert_eq!(reply_text(&snapshots.next().await.unwrap().unwrap()), "half");
        assert_eq!(tracker.lock().state, SessionState::Streaming);
        drop(snapshots);

        let record = tracker.lock();
        assert_eq!(record.state, SessionState::Failed);
        assert_eq!(record.last_snapshot.as_ref().map(reply_text), Some("half"));
    }

    #[tokio::test]
    async fn dropping_completed_stream_keeps_completed() {
        let tracker = SessionTracker::new();
        let body = stream::iter(chunks(vec![frame("done")]));
        let (_, error) = collect(fold_body(
            tracker.clone(),
            base(),
            body,
            MarkerMode::Validated,
            CancellationToken::new(),
        ))
        .await;

        assert!(error.is_none());
        assert_eq!(tracker.lock().state, SessionState::Completed);
    }

    #[test]
    fn send_rejects_invalid_turns() {
        let api = ApiClient::new(ClientConfig::default()).unwrap();
        let session = api.session(CompletionOptions::default());

        let err = session
            .send(ChatTurn::new(Conversation::new(), "hi", "  "), &Credentials::anonymous())
            .err()
            .unwrap();
        assert!(matches!(err, ChatError::InvalidRequest(_)));

        let err = session
            .send(ChatTurn::new(Conversation::new(), " \n", "m"), &Credentials::anonymous())
            .err()
            .unwrap();
        assert!(matches!(err, ChatError::InvalidRequest(_)));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn second_send_on_one_session_is_rejected() {
        let api = ApiClient::new(ClientConfig::default()).unwrap();
        let session = api.session(CompletionOptions::default());
        let turn = ChatTurn::new(Conversation::new(), "hi", "m");

        let _stream = session.send(turn.clone(), &Credentials::anonymous()).unwrap();
        let err = session.send(turn, &Credentials::anonymous()).err().unwrap();
        assert!(matches!(err, ChatError::SessionInUse(SessionState::Idle)));
    }
}
