use crate::error::VoiceError;
use tokio::process::Command;

/// Speech-to-text hook backed by an external command.
///
/// The command prints recognised speech on stdout; the first non-empty line
/// is the transcript. With no command configured the hook is unsupported and
/// the voice action stays disabled.
#[derive(Debug, Clone)]
pub enum VoiceInput {
    Unsupported,
    Command { program: String, args: Vec<String> },
}

impl VoiceInput {
    /// Build from the configured argv; `{lang}` in any argument becomes `lang`
    pub fn detect(command: Option<&[String]>, lang: &str) -> Self {
        let Some((program, args)) = command.and_then(|argv| argv.split_first()) else {
            return VoiceInput::Unsupported;
        };
        if program.trim().is_empty() {
            return VoiceInput::Unsupported;
        }

        VoiceInput::Command {
            program: program.clone(),
            args: args.iter().map(|arg| arg.replace("{lang}", lang)).collect(),
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, VoiceInput::Command { .. })
    }

    pub async fn listen(&self) -> Result<String, VoiceError> {
        let VoiceInput::Command { program, args } = self else {
            return Err(VoiceError::Unsupported);
        };

        tracing::info!(%program, "starting speech-to-text");
        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(VoiceError::Failed { status: output.status });
        }

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or(VoiceError::NoTranscript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn missing_command_is_unsupported() {
        assert!(!VoiceInput::detect(None, "en-US").is_supported());
        assert!(!VoiceInput::detect(Some(Vec::<String>::new().as_slice()), "en-US").is_supported());
        assert!(!VoiceInput::detect(Some(argv(&["  "]).as_slice()), "en-US").is_supported());
    }

    #[test]
    fn lang_placeholder_is_substituted() {
        let voice = VoiceInput::detect(Some(argv(&["stt", "--lang={lang}"]).as_slice()), "en-US");
        match voice {
            VoiceInput::Command { program, args } => {
                assert_eq!(program, "stt");
                assert_eq!(args, vec!["--lang=en-US"]);
            }
            VoiceInput::Unsupported => panic!("expected a command"),
        }
    }

    #[tokio::test]
    async fn unsupported_listen_errors() {
        let err = VoiceInput::Unsupported.listen().await.unwrap_err();
        assert!(matches!(err, VoiceError::Unsupported));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn first_non_empty_line_is_the_transcript() {
        let voice = VoiceInput::detect(
            Some(argv(&["sh", "-c", "printf '\\n  research zoom  \\nsecond guess\\n'"]).as_slice()),
            "en-US",
        );
        assert_eq!(voice.listen().await.unwrap(), "research zoom");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_reports_status() {
        let voice = VoiceInput::detect(Some(argv(&["sh", "-c", "exit 3"]).as_slice()), "en-US");
        assert!(matches!(voice.listen().await, Err(VoiceError::Failed { .. })));
    }
}
