//! Scripted in-process backend for orchestrator and route tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::{BackendError, GeneratedImage, GenerationBackend};

pub struct FakeBackend {
    reply: Option<String>,
    image: Option<GeneratedImage>,
    panics: AtomicBool,
    gate: Option<Arc<Semaphore>>,
    prompts: Mutex<Vec<String>>,
    text_calls: AtomicUsize,
    image_calls: AtomicUsize,
}

impl FakeBackend {
    /// Answers every text call with `reply` and every image call with a tiny PNG.
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_owned()),
            image: Some(GeneratedImage {
                data: b"\x89PNG fake".to_vec(),
                content_type: "image/png".into(),
            }),
            panics: AtomicBool::new(false),
            gate: None,
            prompts: Mutex::new(Vec::new()),
            text_calls: AtomicUsize::new(0),
            image_calls: AtomicUsize::new(0),
        }
    }

    /// Every call fails with a 503.
    pub fn failing() -> Self {
        Self { reply: None, image: None, ..Self::replying("") }
    }

    /// Every call panics.
    pub fn panicking() -> Self {
        let backend = Self::replying("");
        backend.panics.store(true, Ordering::SeqCst);
        backend
    }

    /// Calls block until a permit is added to the returned semaphore.
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn text_calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    async fn pass_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.panics.load(Ordering::SeqCst) {
            panic!("scripted backend panic");
        }
    }

    fn unavailable() -> BackendError {
        BackendError::Status { status: 503, body: "scripted outage".into() }
    }
}

#[async_trait]
impl GenerationBackend for FakeBackend {
    async fn generate_text(&self, context: &str) -> Result<String, BackendError> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(context.to_owned());
        self.pass_gate().await;
        self.reply.clone().ok_or_else(Self::unavailable)
    }

    async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, BackendError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_owned());
        self.pass_gate().await;
        self.image.clone().ok_or_else(Self::unavailable)
    }
}
