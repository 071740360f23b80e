//! Speech bridges backed by external commands.
//!
//! A terminal host has no built-in speech stack, so recognition and
//! synthesis are delegated to configurable programs (e.g. a whisper wrapper
//! that prints one transcript, or `espeak-ng`). `{lang}` in any argument is
//! replaced by the active locale.

use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use beacon_core::types::Locale;

use crate::error::VoiceError;
use crate::input::{RecognitionSink, SpeechRecognizer};
use crate::output::SpeechSynthesizer;

const LANG_PLACEHOLDER: &str = "{lang}";

fn build_command(argv: &[String], language: &Locale) -> Result<Command, VoiceError> {
    let (program, args) = argv.split_first().ok_or(VoiceError::Unsupported)?;
    let mut cmd = Command::new(program.replace(LANG_PLACEHOLDER, language.as_str()));
    cmd.args(args.iter().map(|a| a.replace(LANG_PLACEHOLDER, language.as_str())));
    cmd.kill_on_drop(true);
    Ok(cmd)
}

fn runtime() -> Result<Handle, VoiceError> {
    Handle::try_current()
        .map_err(|e| VoiceError::Platform(format!("no async runtime available: {}", e)))
}

// =============================================================================
// Recognition
// =============================================================================

/// Recognizer for platforms without speech-to-text.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedRecognizer;

impl SpeechRecognizer for UnsupportedRecognizer {
    fn is_supported(&self) -> bool {
        false
    }

    fn start(&self, _language: &Locale, _sink: RecognitionSink) -> Result<(), VoiceError> {
        Err(VoiceError::Unsupported)
    }

    fn stop(&self) {}
}

/// Runs one external process per utterance; its trimmed stdout is the
/// transcript.
#[derive(Debug)]
pub struct CommandRecognizer {
    argv: Vec<String>,
    timeout: Duration,
    cancel: Mutex<Option<oneshot::Sender<()>>>,
}

impl CommandRecognizer {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self {
            argv,
            timeout,
            cancel: Mutex::new(None),
        }
    }
}

impl SpeechRecognizer for CommandRecognizer {
    fn is_supported(&self) -> bool {
        !self.argv.is_empty()
    }

    fn start(&self, language: &Locale, sink: RecognitionSink) -> Result<(), VoiceError> {
        let handle = runtime()?;
        let mut cmd = build_command(&self.argv, language)?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        // Entering the runtime lets `spawn` register the child with its reactor.
        let child = {
            let _guard = handle.enter();
            cmd.spawn()
                .map_err(|e| VoiceError::Platform(format!("failed to launch recognizer: {}", e)))?
        };

        let (cancel_tx, cancel_rx) = oneshot::channel();
        if let Some(previous) = self
            .cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(cancel_tx)
        {
            let _ = previous.send(());
        }

        let timeout = self.timeout;
        handle.spawn(async move {
            tokio::select! {
                result = tokio::time::timeout(timeout, child.wait_with_output()) => match result {
                    Ok(Ok(output)) if output.status.success() => {
                        let transcript = String::from_utf8_lossy(&output.stdout).trim().to_string();
                        if !transcript.is_empty() {
                            sink.transcript(transcript);
                        }
                        sink.end();
                    }
                    Ok(Ok(output)) => {
                        let code = output
                            .status
                            .code()
                            .map(|c| c.to_string())
                            .unwrap_or_else(|| "signal".to_string());
                        sink.error(format!("recognizer exited with status {}", code));
                    }
                    Ok(Err(e)) => sink.error(format!("recognizer failed: {}", e)),
                    Err(_) => sink.error("recognition timed out"),
                },
                // Dropping the pending wait kills the child.
                _ = cancel_rx => sink.end(),
            }
        });
        Ok(())
    }

    fn stop(&self) {
        if let Some(cancel) = self
            .cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            let _ = cancel.send(());
        }
    }
}

// =============================================================================
// Synthesis
// =============================================================================

/// Synthesizer for platforms without text-to-speech.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSynthesizer;

impl SpeechSynthesizer for SilentSynthesizer {
    fn is_supported(&self) -> bool {
        false
    }

    fn speak(&self, _text: &str, _language: &Locale) -> Result<(), VoiceError> {
        Ok(())
    }
}

/// Pipes the text into an external TTS program and does not wait for it.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    argv: Vec<String>,
}

impl CommandSynthesizer {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

impl SpeechSynthesizer for CommandSynthesizer {
    fn is_supported(&self) -> bool {
        !self.argv.is_empty()
    }

    fn speak(&self, text: &str, language: &Locale) -> Result<(), VoiceError> {
        let handle = runtime()?;
        let mut cmd = build_command(&self.argv, language)?;
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);

        let mut child = {
            let _guard = handle.enter();
            cmd.spawn()
                .map_err(|e| VoiceError::Platform(format!("failed to launch synthesizer: {}", e)))?
        };

        let text = text.to_string();
        handle.spawn(async move {
            if let Some(mut stdin) = child.stdin.take() {
                if let Err(e) = stdin.write_all(text.as_bytes()).await {
                    tracing::warn!(error = %e, "Failed to write text to synthesizer");
                }
            }
            match child.wait().await {
                Ok(status) if !status.success() => {
                    tracing::warn!(status = %status, "Synthesizer exited with failure");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Synthesizer wait failed"),
            }
        });
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
