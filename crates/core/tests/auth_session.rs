//! Token lifecycle tests against in-memory ports

mod support;

use std::sync::Arc;
use std::time::Duration;

use myinvois_common::time::MockClock;
use myinvois_core::{AuthSession, SessionSettings};
use myinvois_domain::{AuthIdentity, AuthMode, Credentials, ErrorKind, MyInvoisError, Tin};
use support::{MemoryTokenCache, ScriptedIdentityProvider};

fn settings(mode: AuthMode) -> SessionSettings {
    SessionSettings { mode, ..SessionSettings::default() }
}

fn session(
    mode: AuthMode,
    provider: Arc<ScriptedIdentityProvider>,
    cache: Arc<MemoryTokenCache>,
    clock: &MockClock,
) -> AuthSession {
    AuthSession::new(Credentials::new("client", "secret"), settings(mode), provider)
        .with_cache(cache)
        .with_clock(Arc::new(clock.clone()))
}

#[tokio::test]
async fn concurrent_callers_share_one_authentication() {
    let provider = ScriptedIdentityProvider::slow(3600, Duration::from_millis(50));
    let cache = MemoryTokenCache::new();
    let clock = MockClock::new();
    let session = Arc::new(session(AuthMode::Direct, provider.clone(), cache, &clock));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let session = session.clone();
            tokio::spawn(async move { session.get_access_token().await })
        })
        .collect();

    let tokens: Vec<String> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(provider.calls(), 1);
    assert!(tokens.iter().all(|t| t == &tokens[0]));
}

#[tokio::test]
async fn token_is_shared_through_cache_between_sessions() {
    let provider = ScriptedIdentityProvider::new(3600);
    let cache = MemoryTokenCache::new();
    let clock = MockClock::new();

    let first = session(AuthMode::Direct, provider.clone(), cache.clone(), &clock);
    let second = session(AuthMode::Direct, provider.clone(), cache.clone(), &clock);

    let a = first.get_access_token().await.unwrap();
    assert!(second.has_valid_token().await.unwrap());
    let b = second.get_access_token().await.unwrap();

    assert_eq!(a, b);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn cache_ttl_is_capped_by_token_ttl() {
    let provider = ScriptedIdentityProvider::new(3600);
    let cache = MemoryTokenCache::new();
    let clock = MockClock::new();
    let settings = SessionSettings {
        token_ttl: Some(Duration::from_secs(600)),
        ..SessionSettings::default()
    };
    let session = AuthSession::new(Credentials::new("client", "secret"), settings, provider)
        .with_cache(cache.clone())
        .with_clock(Arc::new(clock.clone()));

    session.authenticate().await.unwrap();
    assert_eq!(cache.ttl_for(&AuthIdentity::direct("client")), Some(Duration::from_secs(600)));
}

#[tokio::test]
async fn identities_never_share_tokens() {
    let provider = ScriptedIdentityProvider::new(3600);
    let cache = MemoryTokenCache::new();
    let clock = MockClock::new();
    let session = session(AuthMode::Intermediary, provider.clone(), cache.clone(), &clock);

    session.on_behalf_of("C1111111111").await.unwrap();
    let first = session.get_access_token().await.unwrap();
    assert_eq!(provider.last_on_behalf_of.lock().as_deref(), Some("C1111111111"));

    session.on_behalf_of("C2222222222").await.unwrap();
    let second = session.get_access_token().await.unwrap();
    assert_eq!(provider.last_on_behalf_of.lock().as_deref(), Some("C2222222222"));

    assert_ne!(first, second);
    // previous identity's entry was dropped on switch
    let old = AuthIdentity::intermediary("client", Tin::parse("C1111111111").unwrap());
    assert!(cache.ttl_for(&old).is_none());
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn reselecting_same_tin_keeps_token() {
    let provider = ScriptedIdentityProvider::new(3600);
    let cache = MemoryTokenCache::new();
    let clock = MockClock::new();
    let session = session(AuthMode::Intermediary, provider.clone(), cache, &clock);

    session.on_behalf_of("C1111111111").await.unwrap();
    session.get_access_token().await.unwrap();
    session.on_behalf_of("C1111111111").await.unwrap();
    session.get_access_token().await.unwrap();
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn authentication_failures_propagate_unchanged() {
    let provider = ScriptedIdentityProvider::new(3600);
    provider.fail_with(MyInvoisError::authentication(Some(400), "invalid_client"));
    let cache = MemoryTokenCache::new();
    let clock = MockClock::new();
    let session = session(AuthMode::Direct, provider, cache.clone(), &clock);

    let err = session.get_access_token().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert_eq!(err.status(), Some(400));
    assert_eq!(cache.len(), 0);
}

#[tokio::test]
async fn expired_token_in_cache_triggers_refresh() {
    let provider = ScriptedIdentityProvider::new(3600);
    let cache = MemoryTokenCache::new();
    let clock = MockClock::new();
    let session = session(AuthMode::Direct, provider.clone(), cache, &clock);

    let first = session.get_access_token().await.unwrap();
    clock.advance(Duration::from_secs(3600 - 300));
    assert!(!session.has_valid_token().await.unwrap());

    let second = session.get_access_token().await.unwrap();
    assert_ne!(first, second);
    assert_eq!(provider.calls(), 2);
}
