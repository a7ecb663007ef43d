use std::io::{ErrorKind, Write};
use async_trait::async_trait;
use tokio::process::Command;

use crate::speech::{Speaker, SpeechError, Utterance};

const BASE_WORDS_PER_MINUTE: f32 = 175.0;
const BASE_PITCH: f32 = 50.0;
const BASE_AMPLITUDE: f32 = 100.0;

/// Speaks through an external espeak-compatible program.
pub struct CommandSpeaker {
    program: String,
}

impl CommandSpeaker {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    fn args(utterance: &Utterance) -> Vec<String> {
        let wpm = (BASE_WORDS_PER_MINUTE * utterance.rate).round().clamp(80.0, 450.0);
        let pitch = (BASE_PITCH * utterance.pitch).round().clamp(0.0, 99.0);
        let amplitude = (BASE_AMPLITUDE * utterance.volume).round().clamp(0.0, 200.0);
        vec![
            "-s".to_string(),
            format!("{wpm}"),
            "-p".to_string(),
            format!("{pitch}"),
            "-a".to_string(),
            format!("{amplitude}"),
            utterance.text.clone(),
        ]
    }
}

#[async_trait]
impl Speaker for CommandSpeaker {
    async fn speak(&self, utterance: &Utterance) -> Result<(), SpeechError> {
        let status = Command::new(&self.program)
            .args(Self::args(utterance))
            .status()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                    SpeechError::Unavailable(format!("{}: {e}", self.program))
                }
                _ => SpeechError::Failed(format!("{}: {e}", self.program)),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(SpeechError::Failed(format!("{} exited with {status}", self.program)))
        }
    }
}

/// Terminal bell plus a line on stderr. Used when no speech program is
/// configured and as the fallback when one is missing.
#[derive(Debug, Clone, Default)]
pub struct NotifySpeaker;

impl NotifySpeaker {
    pub fn notify_blocking(&self, text: &str) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "\x07[ALERT] {text}");
        let _ = stderr.flush();
    }
}

#[async_trait]
impl Speaker for NotifySpeaker {
    async fn speak(&self, utterance: &Utterance) -> Result<(), SpeechError> {
        let notifier = self.clone();
        let text = utterance.text.clone();
        tokio::task::spawn_blocking(move || notifier.notify_blocking(&text))
            .await
            .map_err(|e| SpeechError::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_utterance_maps_to_espeak_defaults() {
        let args = CommandSpeaker::args(&Utterance::new("Slow down"));
        assert_eq!(args, vec!["-s", "175", "-p", "50", "-a", "100", "Slow down"]);
    }

    #[test]
    fn extreme_values_are_clamped() {
        let u = Utterance::new("x").with_rate(10.0).with_pitch(3.0).with_volume(0.0);
        let args = CommandSpeaker::args(&u);
        assert_eq!(&args[..6], &["-s", "450", "-p", "99", "-a", "0"]);
    }

    #[tokio::test]
    async fn missing_program_reports_unavailable() {
        let speaker = CommandSpeaker::new("definitely-not-a-speech-program-7c1e");
        let err = speaker.speak(&Utterance::new("hello")).await.unwrap_err();
        assert!(matches!(err, SpeechError::Unavailable(_)));
    }
}
