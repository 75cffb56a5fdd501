//! Scripted recognizer for orchestration tests.
//!
//! Each `streaming_recognize` call consumes the next script (or the fallback script
//! once the queue is empty) and records the audio it receives, one log per call.
//! When a script runs out of steps the event stream stays open, like a live session
//! that simply has nothing more to say.

use crate::recognition::{AudioStream, EventStream, SpeechRecognizer};
use crate::recognition::types::{RecognitionError, RecognitionEvent, StreamingConfig};
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum ScriptStep {
    Wait(Duration),
    Event(RecognitionEvent),
    Fail(RecognitionError),
    /// Provider closes the session cleanly
    End,
}

#[derive(Debug, Default)]
pub struct ScriptedRecognizer {
    scripts: Mutex<VecDeque<Vec<ScriptStep>>>,
    fallback: Vec<ScriptStep>,
    calls: AtomicUsize,
    audio_logs: Mutex<Vec<Arc<Mutex<Vec<Bytes>>>>>,
    configs: Mutex<Vec<StreamingConfig>>,
}

impl ScriptedRecognizer {
    pub fn new(scripts: Vec<Vec<ScriptStep>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        }
    }

    /// Script replayed by every call once the queued scripts are used up
    pub fn with_fallback(mut self, fallback: Vec<ScriptStep>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Audio buffers received by the n-th call, in arrival order
    pub fn audio_for_call(&self, call: usize) -> Vec<Bytes> {
        let logs = self.audio_logs.lock().unwrap();
        logs.get(call)
            .map(|log| log.lock().unwrap().clone())
            .unwrap_or_default()
    }

    pub fn configs(&self) -> Vec<StreamingConfig> {
        self.configs.lock().unwrap().clone()
    }
}

impl SpeechRecognizer for ScriptedRecognizer {
    fn name(&self) -> &str {
        "scripted"
    }

    fn streaming_recognize(&self, config: StreamingConfig, mut audio: AudioStream) -> EventStream {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.configs.lock().unwrap().push(config);

        let log = Arc::new(Mutex::new(Vec::new()));
        self.audio_logs.lock().unwrap().push(log.clone());
        tokio::spawn(async move {
            while let Some(chunk) = audio.next().await {
                log.lock().unwrap().push(chunk);
            }
        });

        let steps: VecDeque<ScriptStep> = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
            .into();

        stream::unfold(steps, |mut steps| async move {
            loop {
                match steps.pop_front() {
                    Some(ScriptStep::Wait(duration)) => tokio::time::sleep(duration).await,
                    Some(ScriptStep::Event(event)) => return Some((Ok(event), steps)),
                    Some(ScriptStep::Fail(err)) => {
                        steps.clear();
                        steps.push_back(ScriptStep::End);
                        return Some((Err(err), steps));
                    }
                    Some(ScriptStep::End) => return None,
                    None => std::future::pending::<()>().await,
                }
            }
        })
        .boxed()
    }
}
