//! Reachability probe for the REDCap instance under test

use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};

/// Polls a URL until the web server answers
#[derive(Debug, Clone)]
pub struct AppProbe {
    url: String,
    accept_invalid_certs: bool,
}

impl AppProbe {
    pub fn new(url: impl Into<String>, accept_invalid_certs: bool) -> Self {
        Self {
            url: url.into(),
            accept_invalid_certs,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Wait until the server answers with any HTTP status.
    ///
    /// Error statuses still mean the server is up; REDCap answers the
    /// landing page with a login form or a redirect.
    pub async fn wait_until_reachable(&self, timeout_duration: Duration) -> E2eResult<()> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .build()?;

        let start = Instant::now();
        let mut attempts = 0;

        loop {
            attempts += 1;

            match client.get(&self.url).send().await {
                Ok(resp) => {
                    if !resp.status().is_success() && !resp.status().is_redirection() {
                        warn!("{} answered {}", self.url, resp.status());
                    }
                    info!("REDCap reachable at {}", self.url);
                    return Ok(());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for {}...", self.url);
                    }
                    // Connection refused is expected while the server starts
                    if !e.is_connect() {
                        warn!("Probe error: {}", e);
                    }
                }
            }

            if start.elapsed() >= timeout_duration {
                return Err(E2eError::AppUnreachable(attempts));
            }
            sleep(Duration::from_millis(250)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_unreachable_after_timeout() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = AppProbe::new(format!("http://127.0.0.1:{}/redcap/", port), false);
        let result = probe
            .wait_until_reachable(Duration::from_millis(300))
            .await;
        assert!(matches!(result, Err(E2eError::AppUnreachable(n)) if n >= 1));
    }

    #[tokio::test]
    async fn test_any_status_counts_as_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
        });

        let probe = AppProbe::new(format!("http://127.0.0.1:{}/", port), false);
        probe
            .wait_until_reachable(Duration::from_secs(5))
            .await
            .unwrap();
    }
}
