//! Generation engine interface and the subprocess adapter

use std::fs;
use std::process::Command;

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Engine error: {0}")]
    Engine(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Engine produced no output")]
    EmptyResponse,
}

/// Black-box music generation engine.
///
/// One operation: continue a prompt MIDI blob for up to `horizon_s` seconds
/// of musical output at the reference tempo. Implementations block; callers
/// run them on a worker thread.
pub trait ModelEngine: Send + Sync {
    fn generate(
        &self,
        prompt_midi: &[u8],
        horizon_s: f32,
        temperature: f32,
        top_p: f32,
    ) -> Result<Vec<u8>, ModelError>;
}

/// Runs an external generation command with prompt and output temp files.
///
/// The configured command line is split on whitespace; the adapter appends
/// `--prompt <file> --out <file> --horizon <s> --temperature <t> --top-p <p>`
/// and reads the output file back after a zero exit.
pub struct CommandEngine {
    program: String,
    base_args: Vec<String>,
}

impl CommandEngine {
    pub fn new(command_line: &str) -> Result<Self, ModelError> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| ModelError::Engine("empty model command".into()))?;
        Ok(Self { program, base_args: parts.collect() })
    }
}

impl ModelEngine for CommandEngine {
    fn generate(
        &self,
        prompt_midi: &[u8],
        horizon_s: f32,
        temperature: f32,
        top_p: f32,
    ) -> Result<Vec<u8>, ModelError> {
        let dir = tempfile::tempdir()?;
        let prompt_path = dir.path().join("prompt.mid");
        let out_path = dir.path().join("continuation.mid");
        fs::write(&prompt_path, prompt_midi)?;

        debug!(program = %self.program, horizon_s, temperature, top_p, "invoking model command");

        let status = Command::new(&self.program)
            .args(&self.base_args)
            .arg("--prompt")
            .arg(&prompt_path)
            .arg("--out")
            .arg(&out_path)
            .arg("--horizon")
            .arg(horizon_s.to_string())
            .arg("--temperature")
            .arg(temperature.to_string())
            .arg("--top-p")
            .arg(top_p.to_string())
            .status()?;

        if !status.success() {
            return Err(ModelError::Engine(format!("model command exited with {status}")));
        }

        let blob = fs::read(&out_path)?;
        if blob.is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_command_line() {
        assert!(CommandEngine::new("   ").is_err());
    }

    #[test]
    fn splits_program_and_args() {
        let engine = CommandEngine::new("python generate.py --device cuda").unwrap();
        assert_eq!(engine.program, "python");
        assert_eq!(engine.base_args, vec!["generate.py", "--device", "cuda"]);
    }
}
