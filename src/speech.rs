use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use async_trait::async_trait;
use thiserror::Error;
use log::Level::{Debug, Error, Warn};

pub mod command;

pub use command::{CommandSpeaker, NotifySpeaker};

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("Speech output unavailable: {0}")]
    Unavailable(String),

    #[error("Speech output failed: {0}")]
    Failed(String),
}

/// A single spoken alert. Rate, pitch and volume are relative, 1.0 is neutral.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }

    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }
}

/// Text-to-speech backend. `speak` resolves once playback has finished.
#[async_trait]
pub trait Speaker: Send + Sync {
    async fn speak(&self, utterance: &Utterance) -> Result<(), SpeechError>;
}

/// Single-flight front for a [`Speaker`]: while one utterance plays, further
/// requests are dropped, never queued.
#[derive(Clone)]
pub struct SpeechGate {
    speaking: Arc<AtomicBool>,
    speaker: Arc<dyn Speaker>,
    fallback: NotifySpeaker,
}

impl SpeechGate {
    pub fn new(speaker: Arc<dyn Speaker>) -> Self {
        Self {
            speaking: Arc::new(AtomicBool::new(false)),
            speaker,
            fallback: NotifySpeaker::default(),
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Acquire)
    }

    /// Take the gate without speaking yet. `None` while an utterance is in
    /// flight or another claim is held. Dropping an unused claim releases it.
    pub fn try_claim(&self) -> Option<SpeechClaim> {
        self.speaking
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SpeechClaim {
                gate: self.clone(),
                handed_off: false,
            })
    }

    /// Fire and forget. Returns false when the request was dropped because an
    /// utterance is already in flight.
    pub fn request(&self, utterance: Utterance) -> bool {
        match self.try_claim() {
            Some(claim) => {
                claim.speak(utterance);
                true
            }
            None => {
                crate::speech_log!(Debug, "Dropping utterance while speaking: {}", utterance.text);
                false
            }
        }
    }

    fn play(&self, utterance: Utterance) {
        let speaking = self.speaking.clone();
        let speaker = self.speaker.clone();
        let fallback = self.fallback.clone();
        tokio::spawn(async move {
            match speaker.speak(&utterance).await {
                Ok(()) => {}
                Err(SpeechError::Unavailable(reason)) => {
                    crate::speech_log!(Warn, "Speech unavailable ({reason}), falling back to notification");
                    let text = utterance.text.clone();
                    if let Err(e) = tokio::task::spawn_blocking(move || fallback.notify_blocking(&text)).await {
                        crate::speech_log!(Error, "Notification task failed: {e}");
                    }
                }
                Err(e) => {
                    crate::speech_log!(Error, "{e}");
                }
            }
            speaking.store(false, Ordering::Release);
        });
    }
}

/// Exclusive hold on a [`SpeechGate`]. Either spend it on one utterance or
/// drop it to release the gate.
pub struct SpeechClaim {
    gate: SpeechGate,
    handed_off: bool,
}

impl SpeechClaim {
    pub fn speak(mut self, utterance: Utterance) {
        self.handed_off = true;
        self.gate.play(utterance);
    }
}

impl Drop for SpeechClaim {
    fn drop(&mut self) {
        if !self.handed_off {
            self.gate.speaking.store(false, Ordering::Release);
        }
    }
}
