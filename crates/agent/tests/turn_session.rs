//! End-to-end session loop tests
//!
//! Real adapters over the scripted transcriber and tone synthesizer, the
//! in-memory persistence layer and the full tool router. Time is paused so
//! pacing, deadlines and the watchdog run on the virtual clock.

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use voice_turn_agent::{CloseReason, RulePlanner, TurnEvent, TurnHandle, TurnOrchestrator};
use voice_turn_config::constants::phrases;
use voice_turn_config::{BookingConfig, OrchestratorConfig, SpeechConfig, TranscriptConfig, VadConfig};
use voice_turn_core::{
    AudioFrame, ErrorKind, Plan, PlannedCall, Planner, Result, SampleRate, Speaker, TurnState,
    Utterance,
};
use voice_turn_pipeline::{
    ScriptedTranscriber, SpeechStreamAdapter, ToneSynthesizer, TranscriptStreamAdapter,
};
use voice_turn_tools::{create_router, BookingArbiter};

/// Planner that returns a fixed plan after a delay and records its input
struct ScriptedPlanner {
    plan: Plan,
    delay: Duration,
    seen: Mutex<Vec<Vec<Utterance>>>,
}

impl ScriptedPlanner {
    fn new(plan: Plan) -> Self {
        Self {
            plan,
            delay: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(&self, _session_id: &str, context: &[Utterance]) -> Result<Plan> {
        self.seen.lock().push(context.to_vec());
        tokio::time::sleep(self.delay).await;
        Ok(self.plan.clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn orchestrator(
    planner: Arc<dyn Planner>,
    config: OrchestratorConfig,
    words_per_second: f32,
) -> TurnOrchestrator {
    let today = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
    let persistence = voice_turn_persistence::in_memory(today);
    let arbiter = Arc::new(BookingArbiter::new(persistence.bookings.clone()));
    let clock = Arc::new(|| Utc.with_ymd_and_hms(2030, 1, 1, 8, 0, 0).unwrap());
    let tools = create_router(&persistence, arbiter, &BookingConfig::default(), clock);

    TurnOrchestrator::new(
        config,
        VadConfig::default(),
        TranscriptStreamAdapter::new(Arc::new(ScriptedTranscriber::silent()), TranscriptConfig::default()),
        SpeechStreamAdapter::new(
            Arc::new(ToneSynthesizer::new(words_per_second)),
            SpeechConfig::default(),
        ),
        planner,
        Arc::new(tools),
    )
}

/// Collect events until `done` matches one
async fn wait_for<F>(events: &mut broadcast::Receiver<TurnEvent>, mut done: F) -> Vec<TurnEvent>
where
    F: FnMut(&TurnEvent) -> bool,
{
    let mut seen = Vec::new();
    let finished = tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let stop = done(&event);
                    seen.push(event);
                    if stop {
                        return;
                    }
                },
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event stream closed"),
            }
        }
    })
    .await;
    assert!(finished.is_ok(), "timed out; saw {:?}", seen);
    seen
}

fn back_to_listening(event: &TurnEvent) -> bool {
    matches!(
        event,
        TurnEvent::StateChanged {
            to: TurnState::Listening,
            ..
        }
    )
}

fn last_agent_text(handle: &TurnHandle) -> String {
    handle
        .utterances()
        .into_iter()
        .rev()
        .find(|u| u.speaker == Speaker::Agent)
        .map(|u| u.text)
        .unwrap_or_default()
}

fn loud(sequence: u64, timestamp_ms: u64) -> AudioFrame {
    AudioFrame::tone(0.5, 20, SampleRate::Hz16000, sequence, timestamp_ms)
}

#[tokio::test(start_paused = true)]
async fn test_search_turn_speaks_listing() {
    let orchestrator = orchestrator(Arc::new(RulePlanner::new()), OrchestratorConfig::default(), 20.0);
    let handle = orchestrator.start("s-search");
    let mut events = handle.subscribe();

    handle.send_text("two bedroom under 120000").await.unwrap();
    let seen = wait_for(&mut events, back_to_listening).await;

    let states: Vec<TurnState> = seen
        .iter()
        .filter_map(|e| match e {
            TurnEvent::StateChanged { to, .. } => Some(*to),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            TurnState::Planning,
            TurnState::ToolDispatch,
            TurnState::Speaking,
            TurnState::Listening
        ]
    );
    assert!(seen.iter().any(|e| matches!(e, TurnEvent::Audio(_))));

    let reply = last_agent_text(&handle);
    assert!(reply.contains("2BR Clifton"), "reply: {}", reply);
    assert!(reply.contains("PKR 120,000"), "reply: {}", reply);

    let tool = handle
        .utterances()
        .into_iter()
        .find(|u| u.speaker == Speaker::Tool)
        .unwrap();
    let payload = tool.payload.unwrap();
    assert_eq!(payload.tool, "search_listings");
    assert!(payload.ok);
    assert_eq!(
        payload.arguments,
        json!({"filters": {"beds": 2, "rent_max": 120000}})
    );

    assert_eq!(handle.state(), TurnState::Listening);
    assert_eq!(handle.metrics().latency_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_barge_in_stops_speech() {
    let long_reply = "Let me walk you through every single detail of this lovely apartment \
                      starting with the kitchen and then the two bedrooms and the balcony and \
                      the parking and the building amenities and the neighbourhood shops and \
                      schools nearby";
    let planner = Arc::new(ScriptedPlanner::new(Plan::reply(long_reply)));
    let orchestrator = orchestrator(planner, OrchestratorConfig::default(), 2.5);
    let handle = orchestrator.start("s-barge");
    let mut events = handle.subscribe();
    let mut state = handle.state_watch();

    handle.send_text("tell me about it").await.unwrap();
    wait_for(&mut events, |e| matches!(e, TurnEvent::Audio(_))).await;

    tokio::time::sleep(Duration::from_millis(850)).await;
    for seq in 0..8u64 {
        handle.push_audio(loud(seq, 1_000 + seq * 20)).unwrap();
        if seq < 7 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    let pushed_at = Instant::now();
    let listening = tokio::time::timeout(
        Duration::from_millis(150),
        state.wait_for(|s| *s == TurnState::Listening),
    )
    .await;
    assert!(listening.is_ok(), "barge-in did not return to Listening in time");
    assert!(pushed_at.elapsed() <= Duration::from_millis(150));

    wait_for(&mut events, |e| matches!(e, TurnEvent::BargeIn(_))).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, TurnEvent::Audio(_)), "audio after barge-in");
    }

    let interrupted = handle
        .utterances()
        .into_iter()
        .rev()
        .find(|u| u.speaker == Speaker::Agent)
        .unwrap();
    assert!(interrupted.interrupted);
    assert!(interrupted.text.ends_with(phrases::INTERRUPTED_MARKER));
    assert!(interrupted.text.len() < long_reply.len());
    assert!(long_reply.starts_with(interrupted.text.trim_end_matches(phrases::INTERRUPTED_MARKER).trim_end()));

    let metrics = handle.metrics();
    assert_eq!(metrics.barge_in_count, 1);
    assert_eq!(metrics.tts_stop_count, 1);
    assert_eq!(metrics.vad_start_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_barge_in_disabled_keeps_speaking() {
    let planner = Arc::new(ScriptedPlanner::new(Plan::reply("one two three four five six")));
    let config = OrchestratorConfig {
        barge_in_enabled: false,
        ..Default::default()
    };
    let handle = orchestrator(planner, config, 2.5).start("s-no-barge");
    let mut events = handle.subscribe();

    handle.send_text("hi").await.unwrap();
    wait_for(&mut events, |e| matches!(e, TurnEvent::Audio(_))).await;
    for seq in 0..10u64 {
        handle.push_audio(loud(seq, seq * 20)).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let seen = wait_for(&mut events, back_to_listening).await;
    assert!(!seen.iter().any(|e| matches!(e, TurnEvent::BargeIn(_))));
    assert_eq!(last_agent_text(&handle), "one two three four five six");
    assert_eq!(handle.metrics().barge_in_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_planning_timeout_falls_back_to_listening() {
    let planner = Arc::new(
        ScriptedPlanner::new(Plan::reply("too late")).with_delay(Duration::from_secs(10)),
    );
    let config = OrchestratorConfig {
        planning_timeout_ms: 200,
        ..Default::default()
    };
    let handle = orchestrator(planner, config, 20.0).start("s-slow");
    let mut events = handle.subscribe();

    handle.send_text("hello").await.unwrap();
    let seen = wait_for(&mut events, back_to_listening).await;

    assert!(seen.iter().any(|e| matches!(
        e,
        TurnEvent::Error {
            kind: ErrorKind::UpstreamTimeout,
            ..
        }
    )));
    assert!(!seen.iter().any(|e| matches!(e, TurnEvent::Audio(_))));
    assert_eq!(last_agent_text(&handle), phrases::PLANNING_APOLOGY);
    assert_eq!(handle.state(), TurnState::Listening);
}

#[tokio::test(start_paused = true)]
async fn test_tool_failure_continues_turn() {
    let plan = Plan::default()
        .with_call(PlannedCall::new("teleport", json!({})))
        .with_call(PlannedCall::new("quote_total", json!({"unit_id": "unit-nowhere"})))
        .with_call(PlannedCall::new("search_listings", json!({"filters": {"beds": 2}})));
    let handle = orchestrator(Arc::new(ScriptedPlanner::new(plan)), OrchestratorConfig::default(), 50.0)
        .start("s-partial");
    let mut events = handle.subscribe();

    handle.send_text("do several things").await.unwrap();
    wait_for(&mut events, back_to_listening).await;

    let tools: Vec<_> = handle
        .utterances()
        .into_iter()
        .filter_map(|u| u.payload)
        .collect();
    assert_eq!(tools.len(), 3);
    assert!(!tools[0].ok);
    assert!(!tools[1].ok);
    assert!(tools[2].ok, "search result: {:?}", tools[2].result);

    let reply = last_agent_text(&handle);
    assert!(reply.starts_with(phrases::TOOL_APOLOGY), "reply: {}", reply);
    assert!(reply.contains("2BR Clifton"), "reply: {}", reply);
}

#[tokio::test(start_paused = true)]
async fn test_missing_deposit_speaks_guard_phrase() {
    let plan = Plan::reply("The deposit is 130000.")
        .with_call(PlannedCall::new("quote_total", json!({"unit_id": "unit-gulshan-1br"})));
    let handle = orchestrator(Arc::new(ScriptedPlanner::new(plan)), OrchestratorConfig::default(), 50.0)
        .start("s-guard");
    let mut events = handle.subscribe();

    handle.send_text("what is the deposit on the gulshan flat").await.unwrap();
    wait_for(&mut events, back_to_listening).await;

    let reply = last_agent_text(&handle);
    assert!(reply.contains(phrases::GUARD_PHRASE), "reply: {}", reply);
    assert!(!reply.contains("130000"), "reply: {}", reply);
    assert!(reply.contains("PKR 65,000"), "reply: {}", reply);
}

#[tokio::test(start_paused = true)]
async fn test_caller_deposit_figure_is_not_echoed() {
    let plan = Plan::reply("Yes, the deposit is 50000.")
        .with_call(PlannedCall::new("quote_total", json!({"unit_id": "unit-gulshan-1br"})));
    let handle = orchestrator(Arc::new(ScriptedPlanner::new(plan)), OrchestratorConfig::default(), 50.0)
        .start("s-echo");
    let mut events = handle.subscribe();

    handle.send_text("is the deposit 50000 on the gulshan flat").await.unwrap();
    wait_for(&mut events, back_to_listening).await;

    let reply = last_agent_text(&handle);
    assert!(!reply.contains("50000"), "reply: {}", reply);
    assert!(!reply.contains("50,000"), "reply: {}", reply);
    assert!(reply.contains(phrases::GUARD_PHRASE), "reply: {}", reply);
}

#[tokio::test(start_paused = true)]
async fn test_other_units_figures_are_not_borrowed() {
    let plan = Plan::reply("The 1BR Gulshan deposit is 240000.")
        .with_call(PlannedCall::new("search_listings", json!({"filters": {}})))
        .with_call(PlannedCall::new("quote_total", json!({"unit_id": "unit-gulshan-1br"})));
    let handle = orchestrator(Arc::new(ScriptedPlanner::new(plan)), OrchestratorConfig::default(), 50.0)
        .start("s-borrow");
    let mut events = handle.subscribe();

    handle.send_text("what do you have, and the deposit on gulshan").await.unwrap();
    wait_for(&mut events, back_to_listening).await;

    let payloads: Vec<_> = handle
        .utterances()
        .into_iter()
        .filter_map(|u| u.payload)
        .collect();
    // Clifton's deposit is in the search payload
    assert!(payloads[0].result.to_string().contains("240000"));

    let reply = last_agent_text(&handle);
    assert!(!reply.contains("240000"), "reply: {}", reply);
    assert!(!reply.contains("240,000"), "reply: {}", reply);
    assert!(reply.contains(phrases::GUARD_PHRASE), "reply: {}", reply);
}

#[tokio::test(start_paused = true)]
async fn test_spelled_out_figures_are_dropped() {
    let plan = Plan::reply("The deposit is one hundred thirty thousand rupees. Anything else?")
        .with_call(PlannedCall::new("quote_total", json!({"unit_id": "unit-gulshan-1br"})));
    let handle = orchestrator(Arc::new(ScriptedPlanner::new(plan)), OrchestratorConfig::default(), 50.0)
        .start("s-words");
    let mut events = handle.subscribe();

    handle.send_text("what is the deposit on the gulshan flat").await.unwrap();
    wait_for(&mut events, back_to_listening).await;

    let reply = last_agent_text(&handle);
    assert!(!reply.contains("thousand"), "reply: {}", reply);
    assert!(reply.starts_with("Anything else?"), "reply: {}", reply);
    assert!(reply.contains(phrases::GUARD_PHRASE), "reply: {}", reply);
}

#[tokio::test(start_paused = true)]
async fn test_finals_during_turn_are_joined() {
    let planner = Arc::new(
        ScriptedPlanner::new(Plan::reply("Okay.")).with_delay(Duration::from_millis(300)),
    );
    let handle = orchestrator(planner.clone(), OrchestratorConfig::default(), 20.0).start("s-queue");
    let mut events = handle.subscribe();

    handle.send_text("first").await.unwrap();
    wait_for(&mut events, |e| {
        matches!(
            e,
            TurnEvent::StateChanged {
                to: TurnState::Planning,
                ..
            }
        )
    })
    .await;
    handle.send_text("second").await.unwrap();
    handle.send_text("third").await.unwrap();

    // first turn, then the queued one
    wait_for(&mut events, back_to_listening).await;
    wait_for(&mut events, back_to_listening).await;

    let users: Vec<String> = handle
        .utterances()
        .into_iter()
        .filter(|u| u.speaker == Speaker::User)
        .map(|u| u.text)
        .collect();
    assert_eq!(users, vec!["first", "second third"]);

    let seen = planner.seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].last().map(|u| u.text.as_str()), Some("second third"));
}

#[tokio::test(start_paused = true)]
async fn test_audio_stall_is_reported() {
    let planner = Arc::new(ScriptedPlanner::new(Plan::reply("unused")));
    let handle = orchestrator(planner, OrchestratorConfig::default(), 20.0).start("s-stall");
    let mut events = handle.subscribe();

    for seq in 0..5u64 {
        handle
            .push_audio(AudioFrame::silence(20, SampleRate::Hz16000, seq, seq * 20))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let seen = wait_for(&mut events, |e| matches!(e, TurnEvent::AudioStalled { .. })).await;
    assert!(matches!(
        seen.last(),
        Some(TurnEvent::AudioStalled { last_frame_ms: 100 })
    ));
    assert!(handle.snapshot().audio_stalled);

    handle
        .push_audio(AudioFrame::silence(20, SampleRate::Hz16000, 5, 2_000))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!handle.snapshot().audio_stalled);
}

#[tokio::test(start_paused = true)]
async fn test_close_reaches_closed() {
    let planner = Arc::new(ScriptedPlanner::new(Plan::reply("unused")));
    let handle = orchestrator(planner, OrchestratorConfig::default(), 20.0).start("s-close");
    let mut events = handle.subscribe();

    handle.close(CloseReason::IdleTimeout).await;
    let seen = wait_for(&mut events, |e| matches!(e, TurnEvent::Closed { .. })).await;
    assert!(matches!(
        seen.last(),
        Some(TurnEvent::Closed {
            reason: CloseReason::IdleTimeout
        })
    ));
    assert!(handle.is_closed());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(handle.push_audio(AudioFrame::silence(20, SampleRate::Hz16000, 0, 0)).is_err());
    assert!(handle.send_text("anyone there").await.is_err());
}
