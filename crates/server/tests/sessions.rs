//! Session registry lifecycle: capacity, idle eviction and shutdown

use std::sync::Arc;
use std::time::Duration;

use voice_turn_agent::{CloseReason, RulePlanner, TurnEvent};
use voice_turn_config::{SessionConfig, Settings};
use voice_turn_core::{AudioFrame, SampleRate, TurnState};
use voice_turn_server::AppState;

fn state(sessions: SessionConfig) -> AppState {
    let settings = Settings {
        sessions,
        ..Settings::default()
    };
    AppState::with_planner(settings, Arc::new(RulePlanner::new()))
}

fn small_config() -> SessionConfig {
    SessionConfig {
        max_sessions: 2,
        idle_timeout_secs: 60,
        cleanup_interval_secs: 10,
    }
}

#[tokio::test(start_paused = true)]
async fn test_capacity_is_enforced() {
    let state = state(small_config());

    state.sessions.create().unwrap();
    state.sessions.create().unwrap();
    assert!(state.sessions.create().is_err());
    assert_eq!(state.sessions.count(), 2);

    let listed = state.sessions.list();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|s| s.state == TurnState::Listening));
}

#[tokio::test(start_paused = true)]
async fn test_idle_sessions_are_evicted() {
    let state = state(small_config());

    let quiet = state.sessions.create().unwrap();
    let active = state.sessions.create().unwrap();
    let mut quiet_events = quiet.subscribe();

    tokio::time::sleep(Duration::from_secs(30)).await;
    active
        .push_audio(AudioFrame::silence(20, SampleRate::Hz16000, 0, 0))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(40)).await;

    assert_eq!(state.sessions.evict_idle().await, 1);
    assert!(quiet.is_closed());
    assert!(!active.is_closed());
    assert!(state.sessions.get(quiet.session_id()).is_none());
    assert!(state.sessions.get(active.session_id()).is_some());

    let reason = loop {
        match quiet_events.recv().await {
            Ok(TurnEvent::Closed { reason }) => break reason,
            Ok(_) => continue,
            Err(e) => panic!("event stream ended: {:?}", e),
        }
    };
    assert_eq!(reason, CloseReason::IdleTimeout);

    // closed handles reject input once the loop has exited
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(quiet
        .push_audio(AudioFrame::silence(20, SampleRate::Hz16000, 1, 20))
        .is_err());
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_task_sweeps() {
    let state = state(small_config());
    let handle = state.sessions.create().unwrap();
    let shutdown = state.sessions.start_cleanup_task();

    tokio::time::sleep(Duration::from_secs(75)).await;

    assert_eq!(state.sessions.count(), 0);
    assert!(handle.is_closed());
    let _ = shutdown.send(true);
}

#[tokio::test(start_paused = true)]
async fn test_remove_and_close_all() {
    let state = state(small_config());
    let first = state.sessions.create().unwrap();
    let second = state.sessions.create().unwrap();

    assert!(state.sessions.remove(first.session_id(), CloseReason::Disconnect).await);
    assert!(!state.sessions.remove(first.session_id(), CloseReason::Disconnect).await);
    assert!(first.is_closed());

    state.sessions.close_all(CloseReason::Shutdown).await;
    assert_eq!(state.sessions.count(), 0);
    assert!(second.is_closed());

    // capacity is released
    state.sessions.create().unwrap();
}
