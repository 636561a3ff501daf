use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::error::SessionError;
use crate::session::queue::TrackRequest;

/// A request turned into a locally playable audio artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTrack {
    pub title: String,
    pub artifact: PathBuf,
    pub request: TrackRequest,
}

/// Converts a submitted URL into a playable artifact.
///
/// `validate` is cheap and synchronous so the controller can reject bad
/// links at enqueue time without touching the queue. `resolve` is the
/// long-running part; implementations must honor the cancellation token and
/// return within a bounded time.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    fn validate(&self, url: &str) -> Result<(), SessionError>;

    async fn resolve(
        &self,
        request: TrackRequest,
        cancel: CancellationToken,
    ) -> Result<ResolvedTrack, SessionError>;
}

/// yt-dlp backed resolver: downloads and transcodes into the scratch
/// directory, one mp3 per resolve.
pub struct YtDlpResolver {
    scratch_dir: PathBuf,
    allowed_hosts: Vec<String>,
    timeout: Duration,
}

impl YtDlpResolver {
    pub fn new(scratch_dir: PathBuf, allowed_hosts: Vec<String>, timeout: Duration) -> Self {
        Self {
            scratch_dir,
            allowed_hosts,
            timeout,
        }
    }

    fn host_allowed(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.allowed_hosts
            .iter()
            .any(|allowed| host == *allowed || host.ends_with(&format!(".{allowed}")))
    }

    fn ytdlp_command(&self, url: &str) -> tokio::process::Command {
        let out_template = self.scratch_dir.join("%(title)s.%(ext)s");

        let mut cmd = tokio::process::Command::new("yt-dlp");
        cmd.args([
            "-x",
            "--audio-format",
            "mp3",
            "--audio-quality",
            "192K",
            "--no-playlist",
            "--quiet",
            "--no-warnings",
            "--socket-timeout",
            "30",
            "--retries",
            "3",
            "--no-simulate",
            "--print",
            "title",
            "--print",
            "after_move:filepath",
            "-o",
        ])
        .arg(&out_template)
        .arg(url)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
        cmd
    }

    /// Removes the in-progress download files (`.part`, `.ytdl`) a killed
    /// yt-dlp can leave behind. Finished artifacts are untouched.
    async fn discard_partials(&self) {
        let mut entries = match tokio::fs::read_dir(&self.scratch_dir).await {
            Ok(entries) => entries,
            Err(_) => return,
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let leftover = path
                .extension()
                .is_some_and(|ext| ext == "part" || ext == "ytdl");
            if leftover && tokio::fs::remove_file(&path).await.is_ok() {
                info!("🗑️ Removed partial download {}", path.display());
            }
        }
    }
}

async fn read_pipe<R: tokio::io::AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_string(&mut buf).await;
    }
    buf
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    fn validate(&self, url: &str) -> Result<(), SessionError> {
        let parsed = Url::parse(url).map_err(|_| SessionError::InvalidUrl(url.to_string()))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SessionError::InvalidUrl(url.to_string()));
        }

        match parsed.host_str() {
            Some(host) if self.host_allowed(host) => Ok(()),
            _ => Err(SessionError::InvalidUrl(url.to_string())),
        }
    }

    async fn resolve(
        &self,
        request: TrackRequest,
        cancel: CancellationToken,
    ) -> Result<ResolvedTrack, SessionError> {
        self.validate(&request.url)?;

        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }

        info!("🎧 Resolving: {}", request.url);

        let mut child = self.ytdlp_command(&request.url).spawn().map_err(|e| {
            SessionError::ResolutionFailed(anyhow::anyhow!("could not spawn yt-dlp: {e}"))
        })?;

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("🛑 Resolution cancelled for {}", request.url);
                // kill() also reaps the child, so no write can land after
                // the teardown sweep has run. Leftover .part files from the
                // interrupted download are removed here as well.
                if let Err(e) = child.kill().await {
                    warn!("⚠️ Could not kill yt-dlp: {e}");
                }
                self.discard_partials().await;
                return Err(SessionError::Cancelled);
            }
            status = tokio::time::timeout(self.timeout, child.wait()) => match status {
                Ok(Ok(status)) => status,
                Ok(Err(e)) => return Err(SessionError::ResolutionFailed(e.into())),
                Err(_) => {
                    warn!("⏱️ Resolution timed out after {:?} for {}", self.timeout, request.url);
                    let _ = child.kill().await;
                    self.discard_partials().await;
                    return Err(SessionError::ResolutionFailed(anyhow::anyhow!(
                        "timed out after {:?}",
                        self.timeout
                    )));
                }
            },
        };

        if !status.success() {
            let stderr = read_pipe(child.stderr.take()).await;
            warn!("❌ Resolution failed for {}: {}", request.url, stderr.trim());
            return Err(SessionError::ResolutionFailed(anyhow::anyhow!(
                "yt-dlp failed: {}",
                stderr.trim()
            )));
        }

        let stdout = read_pipe(child.stdout.take()).await;
        let mut lines = stdout.lines();
        let title = lines
            .next()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                SessionError::ResolutionFailed(anyhow::anyhow!("yt-dlp printed no title"))
            })?
            .to_string();
        let artifact: PathBuf = lines
            .next()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                SessionError::ResolutionFailed(anyhow::anyhow!("yt-dlp printed no artifact path"))
            })?
            .into();

        if tokio::fs::metadata(&artifact).await.is_err() {
            return Err(SessionError::ResolutionFailed(anyhow::anyhow!(
                "yt-dlp reported a missing artifact: {}",
                artifact.display()
            )));
        }

        info!("🎶 Resolved \"{title}\" -> {}", artifact.display());
        Ok(ResolvedTrack {
            title,
            artifact,
            request,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::model::id::UserId;

    fn resolver() -> YtDlpResolver {
        YtDlpResolver::new(
            "music".into(),
            vec![
                "youtube.com".to_string(),
                "youtu.be".to_string(),
                "music.youtube.com".to_string(),
            ],
            Duration::from_secs(120),
        )
    }

    #[test]
    fn accepts_allow_listed_hosts() {
        let resolver = resolver();
        assert!(resolver
            .validate("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
            .is_ok());
        assert!(resolver.validate("https://youtu.be/dQw4w9WgXcQ").is_ok());
        assert!(resolver
            .validate("https://music.youtube.com/watch?v=test")
            .is_ok());
    }

    #[test]
    fn rejects_foreign_hosts_and_schemes() {
        let resolver = resolver();
        assert!(matches!(
            resolver.validate("https://example.com/video"),
            Err(SessionError::InvalidUrl(_))
        ));
        assert!(matches!(
            resolver.validate("ftp://youtube.com/watch?v=x"),
            Err(SessionError::InvalidUrl(_))
        ));
        assert!(matches!(
            resolver.validate("not a url"),
            Err(SessionError::InvalidUrl(_))
        ));
        // Suffix matching must not be fooled by look-alike hosts.
        assert!(matches!(
            resolver.validate("https://evilyoutube.com/watch?v=x"),
            Err(SessionError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn partial_download_leftovers_are_swept() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("track.mp3.part"), b"x").unwrap();
        std::fs::write(dir.path().join("track.mp3.ytdl"), b"x").unwrap();
        std::fs::write(dir.path().join("done.mp3"), b"x").unwrap();

        let resolver = YtDlpResolver::new(
            dir.path().to_path_buf(),
            vec!["youtube.com".to_string()],
            Duration::from_secs(120),
        );
        resolver.discard_partials().await;

        assert!(!dir.path().join("track.mp3.part").exists());
        assert!(!dir.path().join("track.mp3.ytdl").exists());
        assert!(dir.path().join("done.mp3").exists());
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_resolution() {
        let resolver = resolver();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let request = TrackRequest::new("https://youtube.com/watch?v=x", UserId::new(1));
        let result = resolver.resolve(request, cancel).await;
        assert!(matches!(result, Err(SessionError::Cancelled)));
    }
}
