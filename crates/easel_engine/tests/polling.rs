//! Poll-loop timing with a scripted transport on a paused clock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use easel_core::{Credential, GenerateOutcome, GenerationRequest, ProgressSnapshot};
use easel_engine::{
    endpoints, EngineConfig, EngineError, GenerationEngine, NoProgress, RequestError, RetryPolicy,
    Transport,
};
use serde_json::{json, Value};
use tokio::time::Instant;

struct Step {
    latency: Duration,
    reply: Result<Value, RequestError>,
}

impl Step {
    fn ok(latency_ms: u64, reply: Value) -> Self {
        Self {
            latency: Duration::from_millis(latency_ms),
            reply: Ok(reply),
        }
    }

    fn fail(latency_ms: u64, err: RequestError) -> Self {
        Self {
            latency: Duration::from_millis(latency_ms),
            reply: Err(err),
        }
    }
}

/// Answers `/generate` with job `abc` and `/jobResult` from a script; the
/// last step repeats once the script runs dry.
struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Result<Value, RequestError>>>,
    status_calls: Mutex<Vec<Instant>>,
}

impl ScriptedTransport {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            last: Mutex::new(None),
            status_calls: Mutex::new(Vec::new()),
        })
    }

    fn status_calls(&self) -> Vec<Instant> {
        self.status_calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn post_json(&self, endpoint: &str, _body: String) -> Result<Value, RequestError> {
        if endpoint == endpoints::GENERATE {
            return Ok(json!({"job_id": "abc"}));
        }
        self.status_calls.lock().unwrap().push(Instant::now());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(step) => {
                *self.last.lock().unwrap() = Some(step.reply.clone());
                tokio::time::sleep(step.latency).await;
                step.reply
            }
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Ok(json!({"状态": "WAITING"}))),
        }
    }
}

fn engine_with(transport: Arc<ScriptedTransport>, config: EngineConfig) -> GenerationEngine {
    GenerationEngine::builder(config)
        .transport(transport)
        .build()
        .unwrap()
}

fn request() -> GenerationRequest {
    GenerationRequest {
        model: "600423432991350804".to_string(),
        ..GenerationRequest::default()
    }
    .with_credential(Credential::new("jjdd-test-credential"))
}

fn waiting() -> Value {
    json!({"状态": "WAITING"})
}

fn success() -> Value {
    json!({"状态": "SUCCESS", "images": ["https://cdn.example/abc.png"]})
}

fn gaps(calls: &[Instant]) -> Vec<Duration> {
    calls.windows(2).map(|pair| pair[1] - pair[0]).collect()
}

#[tokio::test(start_paused = true)]
async fn ticks_start_a_fixed_interval_apart_regardless_of_latency() {
    let transport = ScriptedTransport::new(vec![
        Step::ok(100, waiting()),
        Step::ok(1_200, waiting()),
        Step::ok(4_900, waiting()),
        Step::ok(0, waiting()),
        Step::ok(300, success()),
    ]);
    let engine = engine_with(transport.clone(), EngineConfig::default());

    let outcome = engine.generate(&request(), "", &NoProgress).await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(gaps(&transport.status_calls()), vec![Duration::from_secs(5); 4]);
}

#[tokio::test(start_paused = true)]
async fn slow_tick_is_followed_immediately() {
    let transport = ScriptedTransport::new(vec![
        Step::ok(7_000, waiting()),
        Step::ok(0, success()),
    ]);
    let engine = engine_with(transport.clone(), EngineConfig::default());

    engine.generate(&request(), "", &NoProgress).await.unwrap();

    assert_eq!(gaps(&transport.status_calls()), vec![Duration::from_secs(7)]);
}

#[tokio::test(start_paused = true)]
async fn whole_job_is_bounded_by_ticks_times_interval() {
    let transport = ScriptedTransport::new(vec![Step::ok(10, waiting())]);
    let mut config = EngineConfig::default();
    config.poll.max_ticks = 6;
    let engine = engine_with(transport.clone(), config);

    let started = Instant::now();
    let err = engine.generate(&request(), "", &NoProgress).await.unwrap_err();

    assert_eq!(
        err,
        EngineError::PollTimeout {
            ticks: 6,
            budget_ms: 30_000
        }
    );
    assert_eq!(transport.status_calls().len(), 6);
    assert!(started.elapsed() <= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn transient_failures_keep_polling() {
    let busy = RequestError::Status {
        status: 502,
        body: "bad gateway".to_string(),
    };
    let transport = ScriptedTransport::new(vec![
        Step::fail(20, busy.clone()),
        Step::ok(20, waiting()),
        Step::fail(20, busy),
        Step::ok(20, success()),
    ]);
    let config = EngineConfig {
        request: RetryPolicy {
            retry_count: 0,
            ..RetryPolicy::default()
        },
        ..EngineConfig::default()
    };
    let engine = engine_with(transport.clone(), config);

    let outcome = engine.generate(&request(), "", &NoProgress).await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(transport.status_calls().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn connectivity_failure_ends_polling_after_retries() {
    let transport = ScriptedTransport::new(vec![
        Step::ok(10, waiting()),
        Step::fail(10, RequestError::Connect("connection refused".to_string())),
    ]);
    let engine = engine_with(transport.clone(), EngineConfig::default());

    let err = engine.generate(&request(), "", &NoProgress).await.unwrap_err();

    assert!(matches!(err, EngineError::Request(RequestError::Connect(_))));
    // One good tick, then the first attempt plus three retries.
    assert_eq!(transport.status_calls().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn clearing_the_slot_mid_poll_cancels_on_next_tick() {
    let transport = ScriptedTransport::new(vec![Step::ok(50, waiting())]);
    let engine = Arc::new(engine_with(transport.clone(), EngineConfig::default()));

    let runner = engine.clone();
    let job = tokio::spawn(async move { runner.generate(&request(), "", &NoProgress).await });

    tokio::time::sleep(Duration::from_millis(7_500)).await;
    assert_eq!(transport.status_calls().len(), 2);
    engine.channel().clear();

    let outcome = job.await.unwrap().unwrap();
    assert!(matches!(outcome, GenerateOutcome::Canceled { .. }));
    assert_eq!(transport.status_calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn superseding_job_cancels_the_old_loop() {
    let transport = ScriptedTransport::new(vec![Step::ok(50, waiting())]);
    let engine = Arc::new(engine_with(transport.clone(), EngineConfig::default()));

    let runner = engine.clone();
    let job = tokio::spawn(async move { runner.generate(&request(), "", &NoProgress).await });

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    engine
        .channel()
        .record_job(&easel_core::JobId::from("newer"))
        .unwrap();

    let outcome = job.await.unwrap().unwrap();
    assert!(outcome.is_canceled());
    // The old loop must not clear the newer job's slot.
    assert_eq!(
        engine.channel().current_job(),
        Some(easel_core::JobId::from("newer"))
    );
}

#[tokio::test(start_paused = true)]
async fn late_success_for_a_superseded_job_is_dropped() {
    let transport = ScriptedTransport::new(vec![Step::ok(3_000, success())]);
    let engine = Arc::new(engine_with(transport.clone(), EngineConfig::default()));

    let runner = engine.clone();
    let job = tokio::spawn(async move { runner.generate(&request(), "", &NoProgress).await });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(transport.status_calls().len(), 1);
    engine
        .channel()
        .record_job(&easel_core::JobId::from("newer"))
        .unwrap();

    let outcome = job.await.unwrap().unwrap();
    assert!(outcome.is_canceled());
    assert_eq!(
        engine.channel().current_job(),
        Some(easel_core::JobId::from("newer"))
    );
}

#[tokio::test(start_paused = true)]
async fn late_failure_after_slot_cleared_is_a_cancel() {
    let failed = json!({"状态": "FAILED", "任务": "task-9"});
    let transport = ScriptedTransport::new(vec![Step::ok(3_000, failed)]);
    let engine = Arc::new(engine_with(transport.clone(), EngineConfig::default()));

    let runner = engine.clone();
    let job = tokio::spawn(async move { runner.generate(&request(), "", &NoProgress).await });

    tokio::time::sleep(Duration::from_secs(1)).await;
    engine.channel().clear();

    let outcome = job.await.unwrap().unwrap();
    assert!(matches!(outcome, GenerateOutcome::Canceled { .. }));
    assert_eq!(transport.status_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn panicking_reporter_does_not_break_generation() {
    let transport = ScriptedTransport::new(vec![
        Step::ok(10, waiting()),
        Step::ok(10, success()),
    ]);
    let engine = engine_with(transport, EngineConfig::default());

    let reporter = |snapshot: &ProgressSnapshot| {
        if snapshot.percent >= 15.0 {
            panic!("progress bar detached");
        }
    };
    let outcome = engine.generate(&request(), "", &reporter).await.unwrap();
    assert!(outcome.is_success());
}
