//! Voice output bridge: fire-and-forget speech synthesis.

use std::sync::Arc;

use beacon_core::types::Locale;

use crate::error::VoiceError;

/// Platform text-to-speech capability.
pub trait SpeechSynthesizer: Send + Sync {
    fn is_supported(&self) -> bool;

    /// Queue `text` for playback in the voice matching `language`. Must not
    /// wait for playback to finish.
    fn speak(&self, text: &str, language: &Locale) -> Result<(), VoiceError>;
}

/// Speaks assistant replies without ever failing the caller.
#[derive(Clone)]
pub struct VoiceOutputBridge {
    synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl std::fmt::Debug for VoiceOutputBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceOutputBridge")
            .field("supported", &self.synthesizer.is_supported())
            .finish()
    }
}

impl VoiceOutputBridge {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        Self { synthesizer }
    }

    pub fn is_supported(&self) -> bool {
        self.synthesizer.is_supported()
    }

    /// Request synthesis. Missing capability is a silent no-op and platform
    /// errors are only logged.
    pub fn speak(&self, text: &str, language: &Locale) {
        if text.trim().is_empty() || !self.synthesizer.is_supported() {
            return;
        }
        match self.synthesizer.speak(text, language) {
            Ok(()) => tracing::debug!(language = %language, chars = text.len(), "Speech queued"),
            Err(e) => tracing::warn!(error = %e, "Speech synthesis failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSynthesizer {
        supported: bool,
        fail: bool,
        spoken: Mutex<Vec<(String, String)>>,
    }

    impl RecordingSynthesizer {
        fn new(supported: bool, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                supported,
                fail,
                spoken: Mutex::new(Vec::new()),
            })
        }
    }

    impl SpeechSynthesizer for RecordingSynthesizer {
        fn is_supported(&self) -> bool {
            self.supported
        }

        fn speak(&self, text: &str, language: &Locale) -> Result<(), VoiceError> {
            if self.fail {
                return Err(VoiceError::Platform("audio device lost".to_string()));
            }
            self.spoken
                .lock()
                .unwrap()
                .push((text.to_string(), language.to_string()));
            Ok(())
        }
    }

    #[test]
    fn test_speak_forwards_text_and_language() {
        let synth = RecordingSynthesizer::new(true, false);
        let bridge = VoiceOutputBridge::new(synth.clone());
        bridge.speak("Stay calm", &Locale::new("fr").unwrap());
        assert_eq!(
            *synth.spoken.lock().unwrap(),
            vec![("Stay calm".to_string(), "fr".to_string())]
        );
    }

    #[test]
    fn test_unsupported_is_silent_noop() {
        let synth = RecordingSynthesizer::new(false, false);
        let bridge = VoiceOutputBridge::new(synth.clone());
        assert!(!bridge.is_supported());
        bridge.speak("Stay calm", &Locale::default());
        assert!(synth.spoken.lock().unwrap().is_empty());
    }

    #[test]
    fn test_platform_error_is_swallowed() {
        let bridge = VoiceOutputBridge::new(RecordingSynthesizer::new(true, true));
        bridge.speak("Stay calm", &Locale::default());
    }

    #[test]
    fn test_blank_text_not_spoken() {
        let synth = RecordingSynthesizer::new(true, false);
        let bridge = VoiceOutputBridge::new(synth.clone());
        bridge.speak("   ", &Locale::default());
        assert!(synth.spoken.lock().unwrap().is_empty());
    }
}
