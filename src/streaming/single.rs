//! Single-session streaming recognition.
//!
//! The bounded sibling of `EndlessStream`: one recognition session, no restarts, no
//! bridging. Every result in every response is reported, the recognizer's
//! end-of-utterance event is passed through, and the first remote error ends the
//! stream.

use crate::audio::queue::{AudioQueueReceiver, Pull};
use crate::error::StreamError;
use crate::recognition::{RecognitionEvent, SpeechEvent, SpeechRecognizer, StreamingConfig};
use crate::streaming::events::{
    EventEmitter, EventForwarder, ResultSink, StreamEvent, TranscriptPayload, WordTimestamp,
};
use crate::streaming::handle::StreamHandle;
use crate::streaming::options::{StreamMode, StreamingOptions};
use bytes::Bytes;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info};

pub struct SingleStream {
    recognizer: Arc<dyn SpeechRecognizer>,
    pull_timeout: Duration,
    config: Option<StreamingConfig>,
    handle: StreamHandle,
    queue: AudioQueueReceiver,
}

impl SingleStream {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>, pull_timeout: Duration) -> Self {
        let (handle, queue) = StreamHandle::new();
        Self {
            recognizer,
            pull_timeout,
            config: None,
            handle,
            queue,
        }
    }

    pub fn configure(&mut self, options: StreamingOptions) -> Result<(), StreamError> {
        let config = options.into_config(StreamMode::Single)?;
        info!(
            "Stream configured: {} @ {}Hz, single_utterance={}",
            config.config.encoding, config.config.sample_rate_hertz, config.single_utterance
        );
        self.config = Some(config);
        Ok(())
    }

    pub fn config(&self) -> Option<&StreamingConfig> {
        self.config.as_ref()
    }

    pub fn handle(&self) -> StreamHandle {
        self.handle.clone()
    }

    pub async fn run(mut self, sink: ResultSink) -> Result<(), StreamError> {
        let forwarder = EventForwarder::spawn(sink);
        let events = forwarder.emitter();

        let result = self.run_session(&events).await;
        self.handle.set_running(false);

        drop(events);
        forwarder.finish().await;
        result
    }

    async fn run_session(&mut self, events: &EventEmitter) -> Result<(), StreamError> {
        let Some(config) = self.config.clone() else {
            error!("Stream started without configuration");
            events.emit(StreamEvent::FatalError {
                message: StreamError::NotConfigured.to_string(),
            });
            return Err(StreamError::NotConfigured);
        };

        self.handle.set_running(true);
        events.emit(StreamEvent::SessionStarted {
            message: "Streaming started".to_string(),
            restart_count: 0,
        });

        let (audio_tx, audio_rx) = mpsc::unbounded_channel::<Bytes>();
        let mut responses = self
            .recognizer
            .streaming_recognize(config, UnboundedReceiverStream::new(audio_rx).boxed());

        loop {
            tokio::select! {
                response = responses.next() => match response {
                    Some(Ok(event)) => emit_results(event, events),
                    Some(Err(err)) => {
                        error!("Streaming recognition failed: {}", err);
                        events.emit(StreamEvent::Error {
                            message: StreamError::Remote(err).to_string(),
                            restart_count: None,
                        });
                        break;
                    }
                    None => {
                        debug!("Recognizer closed the stream");
                        break;
                    }
                },

                pulled = self.queue.pull(self.pull_timeout) => match pulled {
                    Pull::Chunk(chunk) => {
                        if audio_tx.send(chunk).is_err() {
                            debug!("Recognizer stopped accepting audio");
                        }
                    }
                    Pull::Timeout => {}
                    Pull::Closed => break,
                },
            }
        }

        info!("Streaming recognition finished");
        Ok(())
    }
}

fn emit_results(event: RecognitionEvent, events: &EventEmitter) {
    if event.speech_event == SpeechEvent::EndOfSingleUtterance {
        debug!("End of single utterance");
        events.emit(StreamEvent::EndOfUtterance);
        return;
    }

    for result in event.results {
        let Some(alternative) = result.alternatives.into_iter().next() else {
            continue;
        };

        let payload = TranscriptPayload {
            transcript: alternative.transcript,
            confidence: alternative.confidence,
            corrected_time: None,
            restart_count: None,
            word_timestamps: if result.is_final && !alternative.words.is_empty() {
                Some(
                    alternative
                        .words
                        .iter()
                        .map(|w| WordTimestamp {
                            word: w.word.clone(),
                            start_time: w.start_time.as_secs_f64(),
                            end_time: w.end_time.as_secs_f64(),
                        })
                        .collect(),
                )
            } else {
                None
            },
        };

        if result.is_final {
            events.emit(StreamEvent::Final(payload));
        } else {
            events.emit(StreamEvent::Interim(payload));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::scripted::{ScriptStep, ScriptedRecognizer};
    use crate::recognition::{
        Alternative, EventDuration, RecognitionError, RecognitionResult, WordInfo,
    };
    use crate::streaming::events::result_sink;
    use std::sync::Mutex;

    fn recording_sink() -> (ResultSink, Arc<Mutex<Vec<StreamEvent>>>) {
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let target = recorded.clone();
        let sink = result_sink(move |event| {
            let target = target.clone();
            async move { target.lock().unwrap().push(event) }
        });
        (sink, recorded)
    }

    fn two_results_with_words() -> RecognitionEvent {
        let word = WordInfo {
            word: "yes".to_string(),
            start_time: EventDuration::new(0, 100_000),
            end_time: EventDuration::new(0, 400_000),
        };
        RecognitionEvent {
            results: vec![
                RecognitionResult {
                    alternatives: vec![Alternative {
                        transcript: "yes".to_string(),
                        confidence: 0.8,
                        words: vec![word],
                    }],
                    is_final: true,
                    result_end_time: EventDuration::from_millis(400),
                },
                RecognitionResult {
                    alternatives: vec![Alternative {
                        transcript: "and".to_string(),
                        ..Default::default()
                    }],
                    is_final: false,
                    result_end_time: EventDuration::from_millis(600),
                },
            ],
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_every_result_and_end_of_utterance() {
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![vec![
            ScriptStep::Event(two_results_with_words()),
            ScriptStep::Event(RecognitionEvent {
                speech_event: SpeechEvent::EndOfSingleUtterance,
                ..Default::default()
            }),
            ScriptStep::End,
        ]]));
        let mut stream = SingleStream::new(recognizer.clone(), Duration::from_millis(100));
        stream.configure(StreamingOptions::default()).unwrap();
        stream.handle().add_audio(vec![0u8; 8]);

        let (sink, recorded) = recording_sink();
        stream.run(sink).await.unwrap();

        let events = recorded.lock().unwrap().clone();
        let kinds: Vec<&str> = events.iter().map(StreamEvent::kind).collect();
        assert_eq!(
            kinds,
            vec!["streaming_started", "final_result", "interim_result", "end_of_utterance"]
        );

        match &events[1] {
            StreamEvent::Final(p) => {
                assert_eq!(p.corrected_time, None);
                let words = p.word_timestamps.as_ref().unwrap();
                assert_eq!(words[0].word, "yes");
                assert!((words[0].end_time - 0.4).abs() < 1e-9);
            }
            other => panic!("expected final, got {:?}", other),
        }
        assert_eq!(recognizer.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_error_ends_stream() {
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![vec![ScriptStep::Fail(
            RecognitionError::Connection("reset by peer".to_string()),
        )]]));
        let mut stream = SingleStream::new(recognizer.clone(), Duration::from_millis(100));
        stream.configure(StreamingOptions::default()).unwrap();
        let handle = stream.handle();

        let (sink, recorded) = recording_sink();
        stream.run(sink).await.unwrap();

        let events = recorded.lock().unwrap().clone();
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Error { restart_count: None, .. })
        ));
        assert_eq!(recognizer.calls(), 1);
        assert!(!handle.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_stream() {
        let recognizer = Arc::new(ScriptedRecognizer::default());
        let mut stream = SingleStream::new(recognizer.clone(), Duration::from_millis(100));
        stream.configure(StreamingOptions::default()).unwrap();
        let handle = stream.handle();

        let (sink, _recorded) = recording_sink();
        let task = tokio::spawn(stream.run(sink));
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.stop();
        task.await.unwrap().unwrap();
        assert_eq!(recognizer.calls(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_run_is_fatal() {
        let recognizer = Arc::new(ScriptedRecognizer::default());
        let stream = SingleStream::new(recognizer.clone(), Duration::from_millis(100));

        let (sink, recorded) = recording_sink();
        assert_eq!(stream.run(sink).await, Err(StreamError::NotConfigured));
        assert_eq!(recorded.lock().unwrap().len(), 1);
        assert_eq!(recognizer.calls(), 0);
    }
}
