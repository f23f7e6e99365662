//! In-process fakes for the pipeline collaborators.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{Value, json};
use tokio::sync::{Semaphore, mpsc, watch};

use crate::error::JobError;
use crate::job::{JobSubmission, JobToken};
use crate::normalize::{ImageNormalizer, NormalizedImage};
use crate::poller::Sleeper;
use crate::predictor::{Predictor, StatusReport, StatusSource};
use crate::publish::SnapshotPublisher;
use crate::upload::ObjectStore;

pub fn pending() -> Value {
    json!({"status": "processing"})
}

pub fn succeeded(output: Value) -> Value {
    json!({"status": "succeeded", "output": output})
}

/// Base64 PNG of the given size.
pub fn png_payload(width: u32, height: u32) -> String {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 80, 40]));
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, image::ImageFormat::Png)
        .expect("encode test png");
    base64::engine::general_purpose::STANDARD.encode(bytes.into_inner())
}

/// Returns immediately, remembering every requested duration.
#[derive(Default)]
pub struct RecordingSleeper {
    durations: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn count(&self) -> usize {
        self.durations.lock().unwrap().len()
    }

    pub fn durations(&self) -> Vec<Duration> {
        self.durations.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.durations.lock().unwrap().push(duration);
    }
}

/// Blocks every sleep until the test opens the gate.
pub struct GatedSleeper {
    gate: Semaphore,
    entered: watch::Sender<usize>,
}

impl Default for GatedSleeper {
    fn default() -> Self {
        Self {
            gate: Semaphore::new(0),
            entered: watch::Sender::new(0),
        }
    }
}

impl GatedSleeper {
    /// Let `n` pending or future sleeps finish.
    pub fn open(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Wait until `n` sleeps have started in total.
    pub async fn wait_for_sleepers(&self, n: usize) {
        let mut rx = self.entered.subscribe();
        rx.wait_for(|entered| *entered >= n)
            .await
            .expect("sender lives as long as self");
    }
}

#[async_trait]
impl Sleeper for GatedSleeper {
    async fn sleep(&self, _duration: Duration) {
        self.entered.send_modify(|entered| *entered += 1);
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
    }
}

/// Replays a scripted sequence of status payloads, then stays pending.
#[derive(Default)]
pub struct ScriptedStatus {
    script: Mutex<VecDeque<Value>>,
    failures_left: AtomicUsize,
    calls: AtomicUsize,
    sleeper: Option<Arc<RecordingSleeper>>,
    sleeps_at_calls: Mutex<Vec<usize>>,
}

impl ScriptedStatus {
    pub fn new(script: Vec<Value>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    /// Record how many sleeps had happened at each probe.
    pub fn observing(mut self, sleeper: Arc<RecordingSleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    /// Fail the first `n` probes before replaying the script.
    pub fn failing_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn push(&self, statuses: Vec<Value>) {
        self.script.lock().unwrap().extend(statuses);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sleeps_at_calls(&self) -> Vec<usize> {
        self.sleeps_at_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusSource for ScriptedStatus {
    async fn status(&self, _token: &JobToken) -> Result<StatusReport, JobError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref sleeper) = self.sleeper {
            self.sleeps_at_calls.lock().unwrap().push(sleeper.count());
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(JobError::StatusProbe("connection reset".to_string()));
        }

        let next = self.script.lock().unwrap().pop_front().unwrap_or_else(pending);
        Ok(StatusReport::from_payload(next))
    }
}

enum SubmitBehavior {
    Accept(String),
    Reject { status: u16, body: String },
}

/// Predictor with a fixed submit result and scripted status reports.
pub struct FakePredictor {
    behavior: SubmitBehavior,
    submissions: Mutex<Vec<JobSubmission>>,
    status: ScriptedStatus,
}

impl FakePredictor {
    pub fn new(token: &str, statuses: Vec<Value>) -> Self {
        Self {
            behavior: SubmitBehavior::Accept(token.to_string()),
            submissions: Mutex::new(Vec::new()),
            status: ScriptedStatus::new(statuses),
        }
    }

    pub fn rejecting(status: u16, body: &str) -> Self {
        Self {
            behavior: SubmitBehavior::Reject {
                status,
                body: body.to_string(),
            },
            submissions: Mutex::new(Vec::new()),
            status: ScriptedStatus::default(),
        }
    }

    pub fn push_statuses(&self, statuses: Vec<Value>) {
        self.status.push(statuses);
    }

    pub fn submissions(&self) -> Vec<JobSubmission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn submit_calls(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }

    pub fn status_calls(&self) -> usize {
        self.status.calls()
    }
}

#[async_trait]
impl StatusSource for FakePredictor {
    async fn status(&self, token: &JobToken) -> Result<StatusReport, JobError> {
        self.status.status(token).await
    }
}

#[async_trait]
impl Predictor for FakePredictor {
    async fn submit(&self, submission: &JobSubmission) -> Result<JobToken, JobError> {
        self.submissions.lock().unwrap().push(submission.clone());
        match &self.behavior {
            SubmitBehavior::Accept(token) => Ok(JobToken::new(token.clone())),
            SubmitBehavior::Reject { status, body } => Err(JobError::Submission {
                status: Some(*status),
                body: body.clone(),
            }),
        }
    }
}

/// Skips decoding and hands the payload bytes straight through.
#[derive(Default)]
pub struct FakeNormalizer {
    fail: bool,
    calls: AtomicUsize,
}

impl FakeNormalizer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageNormalizer for FakeNormalizer {
    async fn normalize(&self, payload: &str) -> Result<NormalizedImage, JobError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(JobError::Validation("image payload is not valid base64".to_string()));
        }
        Ok(NormalizedImage {
            bytes: payload.as_bytes().to_vec(),
            content_type: "image/png",
            width: 1,
            height: 1,
        })
    }
}

#[derive(Default)]
pub struct FakeObjectStore {
    failure: Option<String>,
    calls: AtomicUsize,
}

impl FakeObjectStore {
    pub const URL: &'static str = "https://cdn.test/restyle/source.png";

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn upload(&self, _bytes: Vec<u8>, _content_type: &str) -> Result<String, JobError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(JobError::UpstreamIo(message.clone())),
            None => Ok(Self::URL.to_string()),
        }
    }
}

#[derive(Debug)]
pub struct Published {
    pub path: String,
    pub payload: Value,
    pub message: String,
}

/// Forwards every publish attempt to a channel.
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<Published>,
    fail: bool,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Published>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, fail: false }, rx)
    }

    pub fn failing() -> (Self, mpsc::UnboundedReceiver<Published>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, fail: true }, rx)
    }
}

#[async_trait]
impl SnapshotPublisher for ChannelPublisher {
    async fn publish(&self, path: &str, payload: &Value, message: &str) -> Result<(), JobError> {
        let _ = self.tx.send(Published {
            path: path.to_string(),
            payload: payload.clone(),
            message: message.to_string(),
        });
        if self.fail {
            return Err(JobError::Publish("commit returned HTTP 409: conflict".to_string()));
        }
        Ok(())
    }
}
