//! Self-registration with the directory.

use std::time::Duration;

use onion_common::{DirectoryClient, Error, NodeEntry, Result};
use tracing::{info, warn};

/// Retry schedule for directory registration.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// `None` retries until the directory answers.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: None,
        }
    }
}

/// Publish `entry`, retrying with exponential backoff.
///
/// A duplicate id is terminal: another relay already owns it.
pub async fn register_with_retry(
    directory: &DirectoryClient,
    entry: &NodeEntry,
    policy: RetryPolicy,
) -> Result<()> {
    let mut retry_delay = policy.initial_delay;
    let mut attempt = 0u32;

    info!(
        "Registering node {} with directory at {}...",
        entry.node_id,
        directory.base_url()
    );

    loop {
        attempt += 1;
        match directory.register(entry).await {
            Ok(()) => {
                info!("Node {} registered", entry.node_id);
                return Ok(());
            }
            Err(e @ Error::Duplicate(_)) => return Err(e),
            Err(e) => {
                warn!("Directory registration attempt {} failed: {}", attempt, e);
                if policy.max_attempts.is_some_and(|max| attempt >= max) {
                    return Err(e);
                }
            }
        }

        info!("Retrying registration in {:?}...", retry_delay);
        tokio::time::sleep(retry_delay).await;
        retry_delay = std::cmp::min(retry_delay * 2, policy.max_delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use onion_core::NodeId;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            max_attempts: Some(max_attempts),
        }
    }

    fn entry() -> NodeEntry {
        NodeEntry {
            node_id: NodeId(3),
            pub_key: "AAAA".into(),
        }
    }

    /// Directory stub answering 503 until `fail_first` calls have been made.
    async fn flaky_directory(fail_first: u32, calls: Arc<AtomicU32>) -> String {
        let app = Router::new().route(
            "/registerNode",
            post(move || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < fail_first {
                        StatusCode::SERVICE_UNAVAILABLE
                    } else {
                        StatusCode::CREATED
                    }
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_retries_until_accepted() {
        let calls = Arc::new(AtomicU32::new(0));
        let url = flaky_directory(2, calls.clone()).await;

        register_with_retry(&DirectoryClient::new(url), &entry(), quick(5))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let url = flaky_directory(u32::MAX, calls.clone()).await;

        let err = register_with_retry(&DirectoryClient::new(url), &entry(), quick(3))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Rejected { status: 503, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_duplicate_is_terminal() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let app = Router::new().route(
            "/registerNode",
            post(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { StatusCode::CONFLICT }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let err = register_with_retry(
            &DirectoryClient::new(format!("http://{}", addr)),
            &entry(),
            quick(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Duplicate(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
