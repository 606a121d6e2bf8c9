//! Viewer playback session.
//!
//! The player itself lives in the browser, this is the state machine it follows so
//! clients (and tests) agree on when a channel counts as playing or failed.

use std::time::{Duration, Instant};

use crate::m3u::StreamKind;

/// how long the player may stay in `Loading` before the channel counts as broken
pub const DEFAULT_LOADING_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// the relay answered with an error (origin unreachable, non-2xx, timeout)
    Relay(String),
    /// the player can't handle the format or codec
    Unsupported,
    /// nothing playable showed up within the loading timeout
    TimedOut,
}

impl PlaybackError {
    /// shown next to the error, the raw url usually still works in VLC or mpv
    pub fn hint(&self) -> &'static str {
        "Playback failed in the browser. Copy the stream URL into an external player such as VLC."
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading { since: Instant },
    Playing,
    Error(PlaybackError),
}

#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub stream_url: String,
    pub kind: StreamKind,
    state: PlaybackState,
    loading_timeout: Duration,
}

impl PlaybackSession {
    /// A channel was picked, nothing is attached yet.
    pub fn select(stream_url: impl Into<String>) -> Self {
        Self::with_timeout(stream_url, DEFAULT_LOADING_TIMEOUT)
    }

    pub fn with_timeout(stream_url: impl Into<String>, loading_timeout: Duration) -> Self {
        let stream_url = stream_url.into();
        let kind = StreamKind::from_url(&stream_url);
        Self {
            stream_url,
            kind,
            state: PlaybackState::Idle,
            loading_timeout,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, PlaybackState::Playing | PlaybackState::Error(_))
    }

    /// player attached to the proxied source
    pub fn attach(&mut self, now: Instant) {
        if self.state == PlaybackState::Idle {
            self.state = PlaybackState::Loading { since: now };
        }
    }

    /// first manifest/metadata parse succeeded
    pub fn manifest_parsed(&mut self) {
        if matches!(self.state, PlaybackState::Loading { .. }) {
            self.state = PlaybackState::Playing;
        }
    }

    pub fn relay_failed(&mut self, reason: impl Into<String>) {
        self.fail(PlaybackError::Relay(reason.into()));
    }

    pub fn unsupported(&mut self) {
        self.fail(PlaybackError::Unsupported);
    }

    /// Checks the loading deadline, returns true when this tick moved the session to `Error`.
    pub fn tick(&mut self, now: Instant) -> bool {
        if let PlaybackState::Loading { since } = self.state {
            if now.saturating_duration_since(since) >= self.loading_timeout {
                self.state = PlaybackState::Error(PlaybackError::TimedOut);
                return true;
            }
        }
        false
    }

    fn fail(&mut self, error: PlaybackError) {
        if matches!(self.state, PlaybackState::Loading { .. }) {
            self.state = PlaybackState::Error(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let mut session = PlaybackSession::select("http://o/live.m3u8");
        assert_eq!(session.kind, StreamKind::Hls);
        assert_eq!(session.state(), &PlaybackState::Idle);

        let now = Instant::now();
        session.attach(now);
        assert!(matches!(session.state(), PlaybackState::Loading { .. }));

        session.manifest_parsed();
        assert_eq!(session.state(), &PlaybackState::Playing);
        assert!(session.is_terminal());
    }

    #[test]
    fn relay_failure_while_loading() {
        let mut session = PlaybackSession::select("http://o/1.ts");
        session.attach(Instant::now());
        session.relay_failed("502");
        assert_eq!(
            session.state(),
            &PlaybackState::Error(PlaybackError::Relay("502".to_string()))
        );
    }

    #[test]
    fn loading_times_out() {
        let mut session = PlaybackSession::with_timeout("http://o/x", Duration::from_secs(10));
        let start = Instant::now();
        session.attach(start);

        assert!(!session.tick(start + Duration::from_secs(5)));
        assert!(session.tick(start + Duration::from_secs(10)));
        assert_eq!(session.state(), &PlaybackState::Error(PlaybackError::TimedOut));
    }

    #[test]
    fn terminal_states_ignore_later_events() {
        let mut session = PlaybackSession::select("http://o/live.m3u8");
        let start = Instant::now();
        session.attach(start);
        session.manifest_parsed();

        session.relay_failed("late");
        session.unsupported();
        assert!(!session.tick(start + Duration::from_secs(3600)));
        assert_eq!(session.state(), &PlaybackState::Playing);

        let mut failed = PlaybackSession::select("http://o/live.m3u8");
        failed.attach(start);
        failed.unsupported();
        failed.manifest_parsed();
        assert_eq!(failed.state(), &PlaybackState::Error(PlaybackError::Unsupported));
    }

    #[test]
    fn events_before_attach_are_ignored() {
        let mut session = PlaybackSession::select("http://o/live.m3u8");
        session.manifest_parsed();
        session.relay_failed("early");
        assert_eq!(session.state(), &PlaybackState::Idle);
    }
}
