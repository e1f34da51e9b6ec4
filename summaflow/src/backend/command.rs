//! Backend that delegates to an external program.
//!
//! Each call spawns `<program> <args...> <verb>`, writes the request as JSON to
//! stdin and parses the last non-empty stdout line as the JSON response. The
//! verbs are `train`, `score` and `summarize`. A non-zero exit status is a
//! failure and the tail of stderr becomes the error message.

use super::{ScoreRequest, SummarizationBackend, SummarizeRequest, TrainingJob};
use crate::config::BackendConfig;
use crate::core::RougeScores;
use crate::errors::{Result, SummaflowError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

const BACKEND_NAME: &str = "command";
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    summary: String,
}

#[derive(Debug, Deserialize)]
struct TrainResponse {
    #[serde(default)]
    status: Option<String>,
}

/// Runs an external program per request.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    config: BackendConfig,
}

impl CommandBackend {
    /// Creates a backend from configuration.
    #[must_use]
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }

    async fn call<Req, Resp>(&self, verb: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_vec(request)?;

        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .arg(verb)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        debug!(program = %self.config.program, verb = %verb, "spawning backend");
        let mut child = command.spawn().map_err(|e| {
            SummaflowError::backend(
                BACKEND_NAME,
                format!("cannot start '{}': {e}", self.config.program),
            )
        })?;

        // Feed stdin while stdout and stderr are drained, so neither side
        // blocks on a full pipe.
        let writer = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                match stdin.write_all(&payload).await {
                    // The program may exit without reading its input.
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                    other => other,
                }
            })
        });

        let output = child.wait_with_output().await?;
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(SummaflowError::backend(
                BACKEND_NAME,
                format!("'{verb}' exited with {}: {}", output.status, tail(&stderr)),
            ));
        }

        if let Some(writer) = writer {
            writer.await.map_err(|e| {
                SummaflowError::backend(BACKEND_NAME, format!("stdin writer failed: {e}"))
            })??;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| {
                SummaflowError::backend(BACKEND_NAME, format!("'{verb}' produced no output"))
            })?;

        serde_json::from_str(line).map_err(|e| {
            SummaflowError::backend(
                BACKEND_NAME,
                format!("invalid '{verb}' response: {e}"),
            )
        })
    }
}

fn tail(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[async_trait]
impl SummarizationBackend for CommandBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn train(&self, job: &TrainingJob) -> Result<()> {
        info!(model_ckpt = %job.model_ckpt, output_dir = %job.output_dir.display(), "starting training");
        let response: TrainResponse = self.call("train", job).await?;
        info!(status = ?response.status, "training finished");
        Ok(())
    }

    async fn score(&self, request: &ScoreRequest) -> Result<RougeScores> {
        self.call("score", request).await
    }

    async fn summarize(&self, request: &SummarizeRequest) -> Result<String> {
        let response: SummaryResponse = self.call("summarize", request).await?;
        Ok(response.summary)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::backend::GenerationParams;
    use std::path::PathBuf;

    fn shell_backend(script: &str) -> CommandBackend {
        CommandBackend::new(BackendConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            ..BackendConfig::default()
        })
    }

    fn summarize_request() -> SummarizeRequest {
        SummarizeRequest {
            model_dir: PathBuf::from("/models/model"),
            tokenizer_dir: PathBuf::from("/models/tokenizer"),
            text: "Amanda: I baked cookies.".to_string(),
            generation: GenerationParams::default(),
        }
    }

    #[tokio::test]
    async fn test_summarize_reads_last_stdout_line() {
        let backend = shell_backend(
            r#"cat > /dev/null; echo "loading model"; echo '{"summary": "Amanda baked cookies."}'"#,
        );

        let summary = backend.summarize(&summarize_request()).await.unwrap();
        assert_eq!(summary, "Amanda baked cookies.");
    }

    #[tokio::test]
    async fn test_verb_is_passed_as_argument() {
        // With `sh -c`, the first trailing argument becomes $0.
        let backend = shell_backend(r#"cat > /dev/null; printf '{"summary": "%s"}\n' "$0""#);

        let summary = backend.summarize(&summarize_request()).await.unwrap();
        assert_eq!(summary, "summarize");
    }

    #[tokio::test]
    async fn test_score_parses_rouge_names() {
        let backend = shell_backend(
            r#"cat > /dev/null; echo '{"rouge1": 0.4, "rouge2": 0.2, "rougeL": 0.3, "rougeLsum": 0.3}'"#,
        );
        let request = ScoreRequest {
            model_dir: PathBuf::from("/m"),
            tokenizer_dir: PathBuf::from("/t"),
            samples: Vec::new(),
            batch_size: 2,
            max_input_length: 1024,
            generation: GenerationParams::default(),
        };

        let scores = backend.score(&request).await.unwrap();
        assert!((scores.average() - 0.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_non_zero_exit_reports_stderr() {
        let backend = shell_backend("cat > /dev/null; echo 'CUDA out of memory' >&2; exit 3");

        let err = backend.summarize(&summarize_request()).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("CUDA out of memory"), "{message}");
        assert!(matches!(err, SummaflowError::Backend { .. }));
    }

    #[tokio::test]
    async fn test_large_request_with_chatty_stderr() {
        // Fills the stderr pipe before reading stdin.
        let backend = shell_backend(
            r#"head -c 262144 /dev/zero >&2; cat > /dev/null; echo '{"summary": "done"}'"#,
        );
        let request = SummarizeRequest {
            text: "Amanda: I baked cookies. ".repeat(20_000),
            ..summarize_request()
        };

        let summary = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            backend.summarize(&request),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(summary, "done");
    }

    #[tokio::test]
    async fn test_missing_program() {
        let backend = CommandBackend::new(BackendConfig {
            program: "/nonexistent/summaflow-backend".to_string(),
            args: Vec::new(),
            ..BackendConfig::default()
        });

        let err = backend.summarize(&summarize_request()).await.unwrap_err();
        assert!(err.to_string().contains("cannot start"));
    }

    #[tokio::test]
    async fn test_empty_output_is_an_error() {
        let backend = shell_backend("cat > /dev/null");
        let err = backend.summarize(&summarize_request()).await.unwrap_err();
        assert!(err.to_string().contains("produced no output"));
    }
}
