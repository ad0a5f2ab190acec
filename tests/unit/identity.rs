//! Unit tests for session identities

use ad_archive_scraper::identity::{IdentityPool, IdentityProvider, IdentityTemplate};
use ad_archive_scraper::shutdown::ShutdownCoordinator;
use std::sync::Arc;
use std::time::Duration;

fn pool() -> Arc<IdentityPool> {
    Arc::new(IdentityPool::deterministic(vec![
        IdentityTemplate::new(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36",
            "en-US,en;q=0.9",
        ),
        IdentityTemplate::new(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.5; rv:128.0) Gecko/20100101 Firefox/128.0",
            "fr-FR,fr;q=0.9",
        ),
    ]))
}

#[test]
fn test_identity_stable_until_reset() {
    let mut provider = IdentityProvider::new(pool());
    assert!(!provider.has_identity());

    let first = provider.get_identity().clone();
    let again = provider.get_identity().clone();
    assert_eq!(first, again);
    assert!(provider.has_identity());
}

#[test]
fn test_chromium_identity_sends_client_hints() {
    let mut provider = IdentityProvider::new(pool());
    let headers = provider.get_identity().headers().unwrap();

    assert!(headers["user-agent"].to_str().unwrap().contains("Chrome/136"));
    assert_eq!(headers["sec-ch-ua-platform"], "\"Windows\"");
    assert!(headers["sec-ch-ua"].to_str().unwrap().contains("v=\"136\""));
    assert_eq!(headers["accept-language"], "en-US,en;q=0.9");
}

#[tokio::test(start_paused = true)]
async fn test_reset_draws_new_identity_after_cooldown() {
    let shutdown = ShutdownCoordinator::new();
    let mut provider = IdentityProvider::new(pool())
        .with_cooldown(Duration::from_secs(3)..=Duration::from_secs(5));
    let before = provider.get_identity().user_agent.clone();

    let started = tokio::time::Instant::now();
    let cooldown = provider.reset(&shutdown).await.unwrap();
    assert!(cooldown >= Duration::from_secs(3) && cooldown <= Duration::from_secs(5));
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert!(!provider.has_identity());

    let after = provider.get_identity();
    assert_ne!(after.user_agent, before);
    assert!(after.user_agent.contains("Firefox"));
    assert!(after.headers().unwrap().get("sec-ch-ua").is_none());
    assert_eq!(provider.reset_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reset_cancelled_during_cooldown() {
    let shutdown = ShutdownCoordinator::new();
    shutdown.request_shutdown();
    let mut provider = IdentityProvider::new(pool());
    provider.get_identity();

    assert!(provider.reset(&shutdown).await.is_err());
    assert!(!provider.has_identity());
}
