use crate::capability::Recognizer;
use crate::error::{CapabilityError, Stage};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Maximum audio input size for recognition (10 MiB). Prevents OOM from
/// oversized payloads.
const MAX_STT_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Speech recognition via a whisper.cpp binary.
///
/// The binary reads audio from stdin (`-f -`) and writes the transcript to
/// stdout. Timeouts are the pipeline's responsibility, not this adapter's.
#[derive(Debug, Clone)]
pub struct WhisperRecognizer {
    binary_path: PathBuf,
    model_path: PathBuf,
}

impl WhisperRecognizer {
    pub fn new(binary_path: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            model_path: model_path.into(),
        }
    }
}

#[async_trait]
impl Recognizer for WhisperRecognizer {
    async fn recognize(&self, audio: &[u8], language: &str) -> Result<String, CapabilityError> {
        if audio.len() > MAX_STT_INPUT_BYTES {
            return Err(CapabilityError::Recognize(format!(
                "audio data exceeds maximum size: {} bytes (limit: {} bytes)",
                audio.len(),
                MAX_STT_INPUT_BYTES
            )));
        }

        let mut command = Command::new(&self.binary_path);
        command
            .arg("-m")
            .arg(&self.model_path)
            .arg("-l")
            .arg(language)
            .arg("-f")
            .arg("-") // read from stdin
            .arg("-nt") // no timestamps, stdout carries the bare transcript
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            // A stage timeout drops this future mid-flight; the child must
            // die with it, not run on unbounded.
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            CapabilityError::Recognize(format!("failed to spawn recognizer binary: {}", e))
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| CapabilityError::Recognize("failed to open stdin".to_string()))?;

        stdin
            .write_all(audio)
            .await
            .map_err(|e| CapabilityError::Recognize(format!("failed to write to stdin: {}", e)))?;
        drop(stdin); // Close stdin to signal EOF

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CapabilityError::Recognize(format!("failed to read stdout: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CapabilityError::Recognize(format!(
                "recognizer binary failed: {}",
                stderr
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn oversized_audio_is_rejected_before_spawn() {
        let recognizer = WhisperRecognizer::new("whisper-does-not-exist", "model.bin");
        let audio = vec![0u8; MAX_STT_INPUT_BYTES + 1];

        let err = recognizer
            .recognize(&audio, "tr")
            .await
            .expect_err("oversized input must fail");
        assert_eq!(err.stage(), Stage::Recognize);
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn missing_binary_is_a_recognize_error() {
        let recognizer = WhisperRecognizer::new("/nonexistent/whisper", "model.bin");
        let err = recognizer
            .recognize(&[0u8; 16], "tr")
            .await
            .expect_err("missing binary must fail");
        assert!(matches!(err, CapabilityError::Recognize(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn abandoned_invocation_does_not_leave_the_child_running() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        // Stand-in binary: sleeps past the timeout, then leaves a marker.
        // If the child survives the dropped invocation, the marker appears.
        let dir = tempfile::tempdir().expect("tempdir creation failed");
        let marker = dir.path().join("still-alive");
        let script = dir.path().join("slow-recognizer.sh");
        std::fs::write(
            &script,
            format!("#!/bin/sh\nsleep 2\ntouch {}\n", marker.display()),
        )
        .expect("script write failed");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
            .expect("chmod failed");

        let recognizer = WhisperRecognizer::new(&script, "model.bin");
        let invocation = tokio::time::timeout(
            Duration::from_millis(200),
            recognizer.recognize(&[0u8; 16], "tr"),
        )
        .await;
        assert!(invocation.is_err(), "the stand-in must outlast the timeout");

        // Give a surviving child ample time to reach the marker step.
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(
            !marker.exists(),
            "recognizer child must be killed when its invocation is dropped"
        );
    }
}
