use crate::capability::Synthesizer;
use crate::error::CapabilityError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Maximum text input size for synthesis (64 KiB). Prevents resource
/// exhaustion from oversized synthesis requests.
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Speech synthesis via a piper binary.
///
/// One voice model per target language: `<voices_dir>/<language>.onnx`.
/// The binary reads text from stdin and writes raw PCM (s16le) to stdout.
#[derive(Debug, Clone)]
pub struct PiperSynthesizer {
    binary_path: PathBuf,
    voices_dir: PathBuf,
}

impl PiperSynthesizer {
    pub fn new(binary_path: impl AsRef<Path>, voices_dir: impl AsRef<Path>) -> Self {
        Self {
            binary_path: binary_path.as_ref().to_path_buf(),
            voices_dir: voices_dir.as_ref().to_path_buf(),
        }
    }

    fn model_path(&self, language: &str) -> PathBuf {
        self.voices_dir.join(format!("{}.onnx", language))
    }
}

#[async_trait]
impl Synthesizer for PiperSynthesizer {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, CapabilityError> {
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(CapabilityError::Synthesize(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }

        let model_path = self.model_path(language);
        if !model_path.exists() {
            return Err(CapabilityError::Synthesize(format!(
                "no voice model for language '{}': {:?}",
                language, model_path
            )));
        }

        let mut child = Command::new(&self.binary_path)
            .arg("--model")
            .arg(&model_path)
            .arg("--output_raw")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A stage timeout drops this future mid-flight; the child must
            // die with it, not run on unbounded.
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CapabilityError::Synthesize(format!("failed to spawn piper: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| CapabilityError::Synthesize("failed to open stdin".to_string()))?;

        stdin
            .write_all(text.as_bytes())
            .await
            .map_err(|e| CapabilityError::Synthesize(format!("failed to write to stdin: {}", e)))?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CapabilityError::Synthesize(format!("failed to read stdout: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CapabilityError::Synthesize(format!(
                "piper failed: {}",
                stderr
            )));
        }

        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_voice_model_is_a_synthesize_error() {
        let synthesizer = PiperSynthesizer::new("piper", "/nonexistent/voices");
        let err = synthesizer
            .synthesize("hello", "en")
            .await
            .expect_err("missing model must fail");
        assert!(matches!(err, CapabilityError::Synthesize(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn model_path_is_keyed_by_language_tag() {
        let synthesizer = PiperSynthesizer::new("piper", "/voices");
        assert_eq!(
            synthesizer.model_path("en"),
            PathBuf::from("/voices/en.onnx")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn abandoned_invocation_does_not_leave_the_child_running() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        let dir = tempfile::tempdir().expect("tempdir creation failed");
        // A voice model must exist for the adapter to spawn at all.
        std::fs::write(dir.path().join("en.onnx"), b"stub").expect("model write failed");

        let marker = dir.path().join("still-alive");
        let script = dir.path().join("slow-piper.sh");
        std::fs::write(
            &script,
            format!("#!/bin/sh\nsleep 2\ntouch {}\n", marker.display()),
        )
        .expect("script write failed");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
            .expect("chmod failed");

        let synthesizer = PiperSynthesizer::new(&script, dir.path());
        let invocation = tokio::time::timeout(
            Duration::from_millis(200),
            synthesizer.synthesize("hello", "en"),
        )
        .await;
        assert!(invocation.is_err(), "the stand-in must outlast the timeout");

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(
            !marker.exists(),
            "piper child must be killed when its invocation is dropped"
        );
    }
}
