use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tokio::process::Command;

/// What a speech-to-text engine returns for one file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub text: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub model_used: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, path: &Path, language: Option<&str>) -> Result<Transcript>;
}

/// Runs an external engine once per file: `program [args..] [--language L] <path>`.
/// The program must print a JSON [`Transcript`] on stdout.
#[derive(Clone)]
pub struct CommandTranscriber {
    program: String,
    args: Vec<String>,
}

impl fmt::Debug for CommandTranscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTranscriber")
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

impl CommandTranscriber {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from an argv list such as `["whisper-json", "--model", "base"]`.
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("transcriber command is empty"))?;
        Ok(Self::new(program.clone(), args.to_vec()))
    }
}

#[async_trait]
impl Transcriber for CommandTranscriber {
    async fn transcribe(&self, path: &Path, language: Option<&str>) -> Result<Transcript> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(lang) = language {
            cmd.arg("--language").arg(lang);
        }
        let output = cmd
            .arg(path.as_os_str())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to spawn {}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "{} exited with status {} for {}: {}",
                self.program,
                output.status,
                path.display(),
                stderr.trim()
            ));
        }
        serde_json::from_slice(&output.stdout)
            .with_context(|| format!("{} printed an invalid transcript", self.program))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_json_from_stdout() {
        let t = CommandTranscriber::new(
            "sh",
            vec![
                "-c".into(),
                r#"echo '{"text":"hello there","durationMs":1500,"modelUsed":"base"}'"#.into(),
                "engine".into(),
            ],
        );
        let out = t.transcribe(Path::new("/tmp/a.wav"), None).await.unwrap();
        assert_eq!(out.text, "hello there");
        assert_eq!(out.duration_ms, 1500);
        assert_eq!(out.model_used.as_deref(), Some("base"));
        assert_eq!(out.language, None);
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let t = CommandTranscriber::new(
            "sh",
            vec!["-c".into(), "echo 'no such model' >&2; exit 3".into(), "engine".into()],
        );
        let err = t.transcribe(Path::new("/tmp/a.wav"), Some("en")).await.unwrap_err();
        assert!(err.to_string().contains("no such model"));
    }

    #[test]
    fn empty_argv_is_rejected() {
        assert!(CommandTranscriber::from_argv(&[]).is_err());
        let t = CommandTranscriber::from_argv(&["engine".into(), "-q".into()]).unwrap();
        assert_eq!(t.program, "engine");
        assert_eq!(t.args, vec!["-q".to_string()]);
    }
}
