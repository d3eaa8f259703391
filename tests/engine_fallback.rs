//! Capability-ladder behavior: downgrades on load, device, and element
//! failures, forward-only transitions, and the silent terminal tier.

mod helpers;

use std::sync::atomic::Ordering;
use std::time::Duration;

use riverloop::Tier;

use helpers::{failing_engine, settle, test_engine};

#[tokio::test(start_paused = true)]
async fn test_load_failure_falls_back_after_retries() {
    let (engine, backend) = failing_engine();
    engine.enable_user_interaction().await;

    // Each play burns one load attempt; the budget is three.
    engine.play().await;
    assert!(!engine.is_currently_playing());
    assert_eq!(engine.status().tier, Tier::BufferScheduled);

    engine.play().await;
    assert_eq!(engine.status().tier, Tier::BufferScheduled);

    engine.play().await;
    settle().await;

    assert_eq!(engine.status().tier, Tier::ElementFallback);
    assert!(engine.is_currently_playing());
    assert!(backend.element.playing.load(Ordering::SeqCst));
    assert!((backend.element.volume() - 0.25).abs() < 1e-6);
}

#[tokio::test(start_paused = true)]
async fn test_graph_failure_falls_back_immediately() {
    let (engine, backend) = test_engine(4.0);
    backend.fail_graph.store(true, Ordering::SeqCst);

    engine.enable_user_interaction().await;
    engine.play().await;
    settle().await;

    assert_eq!(engine.status().tier, Tier::ElementFallback);
    assert!(engine.is_currently_playing());
    assert!(backend.element.playing.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_both_tiers_failing_goes_silent() {
    let (engine, backend) = test_engine(4.0);
    backend.fail_graph.store(true, Ordering::SeqCst);
    backend.fail_element.store(true, Ordering::SeqCst);

    engine.enable_user_interaction().await;
    engine.play().await;
    settle().await;

    assert_eq!(engine.status().tier, Tier::Silent);
    assert!(!engine.is_currently_playing());

    // The public API stays a safe no-op on the terminal tier
    engine.play().await;
    engine.set_volume(0.7);
    engine.fade_in(Duration::from_secs(1)).await;
    engine.fade_out(Duration::from_secs(1));
    engine.stop();
    assert_eq!(engine.status().tier, Tier::Silent);
    assert!(!engine.is_currently_playing());
}

#[tokio::test(start_paused = true)]
async fn test_element_play_refusal_goes_silent() {
    let (engine, backend) = test_engine(4.0);
    backend.fail_graph.store(true, Ordering::SeqCst);
    backend.element.fail_play.store(true, Ordering::SeqCst);

    engine.enable_user_interaction().await;
    engine.play().await;
    settle().await;

    assert_eq!(engine.status().tier, Tier::Silent);
    assert!(!engine.is_currently_playing());
}

#[tokio::test(start_paused = true)]
async fn test_stream_error_downgrades_mid_playback() {
    let (engine, backend) = test_engine(4.0);
    engine.enable_user_interaction().await;
    engine.play().await;
    settle().await;
    assert_eq!(engine.status().tier, Tier::BufferScheduled);
    assert!(engine.analyser().is_some());

    // Device dies: the scheduler notices on its next tick and the ladder
    // restarts playback on the fallback element.
    backend.stream.error.store(true, Ordering::SeqCst);
    settle().await;
    settle().await;

    assert_eq!(engine.status().tier, Tier::ElementFallback);
    assert!(engine.is_currently_playing());
    assert!(backend.element.playing.load(Ordering::SeqCst));

    // The analyser rode the dropped graph; a stale handle must not be
    // handed out as live data over the element tier.
    assert!(engine.analyser().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_element_error_goes_silent_mid_playback() {
    let (engine, backend) = test_engine(4.0);
    backend.fail_graph.store(true, Ordering::SeqCst);
    engine.enable_user_interaction().await;
    engine.play().await;
    settle().await;
    assert_eq!(engine.status().tier, Tier::ElementFallback);
    assert!(engine.is_currently_playing());

    // The element dies with no public call in flight; the watchdog picks
    // it up within a tick instead of waiting for the next play().
    backend.element.error.store(true, Ordering::SeqCst);
    settle().await;
    settle().await;

    assert_eq!(engine.status().tier, Tier::Silent);
    assert!(!engine.is_currently_playing());
}

#[tokio::test(start_paused = true)]
async fn test_asset_requiring_element_goes_silent_without_load() {
    // The native element plays the decoded asset, so a loader that never
    // succeeded leaves it nothing to open and the ladder ends at silent.
    let (engine, backend) = failing_engine();
    backend.element_requires_asset.store(true, Ordering::SeqCst);

    engine.enable_user_interaction().await;
    for _ in 0..3 {
        engine.play().await;
    }
    settle().await;

    assert_eq!(engine.status().tier, Tier::Silent);
    assert!(!engine.is_currently_playing());
}

#[tokio::test(start_paused = true)]
async fn test_downgrade_is_forward_only() {
    let (engine, backend) = test_engine(4.0);
    backend.fail_graph.store(true, Ordering::SeqCst);

    engine.enable_user_interaction().await;
    engine.play().await;
    settle().await;
    assert_eq!(engine.status().tier, Tier::ElementFallback);

    // Clearing the failure does not resurrect the buffer tier
    backend.fail_graph.store(false, Ordering::SeqCst);
    engine.stop();
    engine.play().await;
    settle().await;

    assert_eq!(engine.status().tier, Tier::ElementFallback);
    assert!(engine.is_currently_playing());
    // And the analyser stays unavailable off the buffer tier
    assert!(engine.analyser().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_element_tier_volume_is_direct() {
    let (engine, backend) = test_engine(4.0);
    backend.fail_graph.store(true, Ordering::SeqCst);

    engine.enable_user_interaction().await;
    engine.play().await;
    settle().await;
    assert_eq!(engine.status().tier, Tier::ElementFallback);

    engine.set_volume(0.6);
    assert!((backend.element.volume() - 0.6).abs() < 1e-6);

    engine.stop();
    assert!(!backend.element.playing.load(Ordering::SeqCst));
}
