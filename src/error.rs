use thiserror::Error;

/// Everything a session command can fail with.
///
/// Errors produced by the resolver or the voice transport are converted into
/// this taxonomy at the controller boundary; nothing else escapes the
/// command loop.
#[derive(Debug, Error)]
pub enum SessionError {
    /// URL rejected before any external call (bad scheme or host not on the
    /// allow-list).
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// yt-dlp failed, timed out, or produced no artifact.
    #[error("resolution failed")]
    ResolutionFailed(#[source] anyhow::Error),

    /// Enqueue requested but the requester has no voice presence and there is
    /// no live session to join.
    #[error("requester is not in a voice channel")]
    NotInVoiceChannel,

    /// Stop/leave with no voice session.
    #[error("not connected to a voice channel")]
    NotConnected,

    /// Pause/resume/skip with nothing active.
    #[error("no active playback")]
    NoActivePlayback,

    /// Voice connect/play/stop failure.
    #[error("voice transport error")]
    Transport(#[source] anyhow::Error),

    /// Operation superseded by a stop transition. Never reported to users.
    #[error("operation cancelled")]
    Cancelled,

    /// The session's command loop is gone (shutdown race).
    #[error("session closed")]
    SessionClosed,
}

impl SessionError {
    /// Human-readable reply for the requester.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::InvalidUrl(url) => format!("❌ Invalid link: {url}"),
            SessionError::ResolutionFailed(_) => "❌ Could not play that track.".to_string(),
            SessionError::NotInVoiceChannel => {
                "❌ You need to be in a voice channel.".to_string()
            }
            SessionError::NotConnected => {
                "❌ The bot is not connected to a voice channel.".to_string()
            }
            SessionError::NoActivePlayback => "❌ Nothing is playing right now.".to_string(),
            SessionError::Transport(_) => "❌ Voice connection failed.".to_string(),
            SessionError::Cancelled | SessionError::SessionClosed => {
                "❌ The session is shutting down.".to_string()
            }
        }
    }
}
