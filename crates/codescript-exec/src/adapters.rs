use std::ffi::OsString;
use std::process::Command;
use std::process::Stdio;
use std::sync::OnceLock;

use codescript_core::decoder::extract_json_payload;
use codescript_core::state::Role;
use regex::Regex;
use serde_json::Value;

use crate::contracts::CompletionRequest;
use crate::contracts::FileSnapshot;
use crate::contracts::PlanRequest;
use crate::error::ExecError;
use crate::executor::ModelClient;

pub const TRUNCATION_MARKER: &str = "\n... (truncated)";

const FILE_SEPARATOR: &str = "\n\n---\n\n";

const ASSISTANT_PREAMBLE: &str = "You are CodeScript AI, a senior software engineer and coding specialist. \
You excel at debugging, refactoring, and architecting complex systems.";

const PLAN_SCHEMA: &str = r#"{
  "explanation": "one or two sentences describing the change",
  "actions": [
    {
      "kind": "CREATE | UPDATE | DELETE",
      "targetName": "path/of/file.ext",
      "content": "full new file content (CREATE and UPDATE only)",
      "rationale": "why this file changes"
    }
  ]
}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    Gemini,
    Codex,
}

impl Provider {
    /// Unknown names fall back to the local ollama runtime.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" => Self::Gemini,
            "codex" => Self::Codex,
            _ => Self::Ollama,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Ollama => "Ollama",
            Self::Gemini => "Gemini",
            Self::Codex => "Codex",
        }
    }

    pub fn program(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Gemini => "gemini",
            Self::Codex => "codex",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::Ollama => "phi3:mini-128k",
            Self::Gemini => "gemini-2.5-pro",
            Self::Codex => "gpt-5",
        }
    }

    fn args(self, model: &str, prompt: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        match self {
            Self::Ollama => {
                args.push("run".into());
                args.push("--nowordwrap".into());
                args.push(model.into());
            }
            Self::Gemini => {
                args.push("-m".into());
                args.push(model.into());
                args.push("-p".into());
            }
            Self::Codex => {
                args.push("exec".into());
                args.push("--skip-git-repo-check".into());
                args.push("-m".into());
                args.push(model.into());
            }
        }
        args.push(prompt.into());
        args
    }
}

/// Renders workspace files the way both prompts embed them, cut off at
/// `max_chars` characters.
pub fn build_file_context(files: &[FileSnapshot], max_chars: usize) -> String {
    let context = files
        .iter()
        .map(|file| {
            format!(
                "File: {}\nLanguage: {}\nContent:\n```{}\n{}\n```",
                file.name, file.language, file.language, file.content
            )
        })
        .collect::<Vec<_>>()
        .join(FILE_SEPARATOR);

    match context.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &context[..cut]),
        None => context,
    }
}

pub fn build_completion_prompt(request: &CompletionRequest, max_context_chars: usize) -> String {
    let mut prompt = String::new();
    prompt.push_str("System:\n");
    prompt.push_str(ASSISTANT_PREAMBLE);
    prompt.push_str("\n\n");

    if request.files.is_empty() {
        prompt.push_str("The user's workspace is empty.\n\n");
    } else {
        prompt.push_str("The user has the following files in their workspace:\n");
        prompt.push_str(&build_file_context(&request.files, max_context_chars));
        prompt.push_str("\n\n");
    }

    prompt.push_str(
        "When providing code snippets, always use Markdown blocks with the correct language tag.\n\
Be concise, technical, and helpful. If code is requested, prioritize correctness and efficiency.\n\n",
    );

    for turn in &request.history {
        let speaker = match turn.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        prompt.push_str(speaker);
        prompt.push_str(": ");
        prompt.push_str(&turn.content);
        prompt.push('\n');
    }
    prompt.push_str("Assistant:");
    prompt
}

pub fn build_plan_prompt(request: &PlanRequest, max_context_chars: usize) -> String {
    let mut prompt = String::new();
    prompt.push_str("System:\n");
    prompt.push_str(ASSISTANT_PREAMBLE);
    prompt.push_str(
        "\nYou edit the user's workspace by returning a list of file actions. \
Each action names exactly one file. UPDATE and CREATE carry the complete new content, never a diff.\n\n",
    );

    prompt.push_str("Workspace:\n");
    if request.files.is_empty() {
        prompt.push_str("(no files)");
    } else {
        prompt.push_str(&build_file_context(&request.files, max_context_chars));
    }
    prompt.push_str("\n\n");

    prompt.push_str("Respond with a single JSON object and nothing else, shaped like:\n");
    prompt.push_str(PLAN_SCHEMA);
    prompt.push_str("\n\nInstruction: ");
    prompt.push_str(&request.instruction);
    prompt
}

fn ansi_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b[@-_]|\r").ok())
        .as_ref()
}

pub fn strip_ansi_sequences(input: &str) -> String {
    match ansi_regex() {
        Some(re) => re.replace_all(input, "").into_owned(),
        None => input.replace('\r', ""),
    }
}

/// Talks to a locally installed provider CLI, one process per request.
#[derive(Debug, Clone)]
pub struct CommandModelClient {
    provider: Provider,
    program: String,
    max_context_chars: usize,
}

impl CommandModelClient {
    pub fn new(provider: Provider, max_context_chars: usize) -> Self {
        Self {
            provider,
            program: provider.program().to_string(),
            max_context_chars,
        }
    }

    /// Runs `program` with the provider's argument layout.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    fn model<'a>(&self, requested: &'a str) -> &'a str {
        if requested.trim().is_empty() {
            self.provider.default_model()
        } else {
            requested
        }
    }

    fn run(&self, model: &str, prompt: &str) -> Result<String, ExecError> {
        tracing::debug!(
            provider = self.provider.label(),
            model,
            prompt_chars = prompt.len(),
            "running provider CLI"
        );
        let output = Command::new(&self.program)
            .args(self.provider.args(model, prompt))
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ExecError::Spawn {
                provider: self.provider.label().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = strip_ansi_sequences(&String::from_utf8_lossy(&output.stderr))
                .trim()
                .to_string();
            let stderr = if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr
            };
            return Err(ExecError::Provider {
                provider: self.provider.label().to_string(),
                stderr,
            });
        }

        let text = strip_ansi_sequences(&String::from_utf8_lossy(&output.stdout))
            .trim()
            .to_string();
        if text.is_empty() {
            return Err(ExecError::EmptyOutput);
        }
        Ok(text)
    }
}

impl ModelClient for CommandModelClient {
    fn name(&self) -> &str {
        self.provider.label()
    }

    fn complete(&self, request: &CompletionRequest) -> Result<String, ExecError> {
        let prompt = build_completion_prompt(request, self.max_context_chars);
        match self.run(self.model(&request.model), &prompt) {
            Err(ExecError::EmptyOutput) => Ok(String::new()),
            other => other,
        }
    }

    fn plan_edits(&self, request: &PlanRequest) -> Result<Value, ExecError> {
        let prompt = build_plan_prompt(request, self.max_context_chars);
        let text = self.run(self.model(&request.model), &prompt)?;
        let payload = extract_json_payload(&text).ok_or(ExecError::NoJson)?;
        Ok(serde_json::from_str(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use codescript_core::state::Message;
    use codescript_core::state::WorkspaceFile;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::executor::complete_or_fallback;
    use crate::executor::EMPTY_REPLY_FALLBACK;

    fn snapshot(name: &str, content: &str) -> FileSnapshot {
        FileSnapshot::from(&WorkspaceFile::new(name, content))
    }

    #[test]
    fn file_context_uses_fenced_blocks_and_separators() {
        let files = vec![snapshot("main.py", "print(1)"), snapshot("notes", "todo")];

        let context = build_file_context(&files, 10_000);

        assert_eq!(
            context,
            "File: main.py\nLanguage: python\nContent:\n```python\nprint(1)\n```\
\n\n---\n\n\
File: notes\nLanguage: plaintext\nContent:\n```plaintext\ntodo\n```"
        );
    }

    #[test]
    fn file_context_is_truncated_at_char_budget() {
        let files = vec![snapshot("big.txt", &"é".repeat(500))];

        let context = build_file_context(&files, 40);

        assert!(context.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            context.trim_end_matches(TRUNCATION_MARKER).chars().count(),
            40
        );
    }

    #[test]
    fn completion_prompt_carries_history_in_order() {
        let history = vec![
            Message::new(Role::User, "hi"),
            Message::new(Role::Assistant, "hello"),
            Message::new(Role::User, "fix main.py"),
        ];
        let request = CompletionRequest::new(
            &history,
            &[WorkspaceFile::new("main.py", "print(1)")],
            "m",
        );

        let prompt = build_completion_prompt(&request, 1_000);

        assert!(prompt.contains("File: main.py"));
        assert!(prompt.ends_with("User: hi\nAssistant: hello\nUser: fix main.py\nAssistant:"));
    }

    #[test]
    fn plan_prompt_includes_schema_and_instruction() {
        let request = PlanRequest::new("add a README", &[], "m");

        let prompt = build_plan_prompt(&request, 1_000);

        assert!(prompt.contains("(no files)"));
        assert!(prompt.contains("\"targetName\""));
        assert!(prompt.ends_with("Instruction: add a README"));
    }

    #[test]
    fn ansi_sequences_and_carriage_returns_are_stripped() {
        let raw = "\u{1b}[1m\u{1b}[32mdone\u{1b}[0m\r\nnext\u{1b}[?25h";
        assert_eq!(strip_ansi_sequences(raw), "done\nnext");
    }

    #[test]
    fn provider_names_resolve_case_insensitively() {
        assert_eq!(Provider::parse("Gemini"), Provider::Gemini);
        assert_eq!(Provider::parse(" codex "), Provider::Codex);
        assert_eq!(Provider::parse("something-else"), Provider::Ollama);
        assert_eq!(Provider::Codex.default_model(), "gpt-5");
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let client = CommandModelClient::new(Provider::Gemini, 100)
            .with_program("codescript-no-such-provider-binary");
        let err = client
            .complete(&CompletionRequest::new(&[], &[], ""))
            .expect_err("should fail");
        assert!(matches!(err, ExecError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_a_provider_error() {
        // `sh run ...` fails because there is no script named `run`.
        let client = CommandModelClient::new(Provider::Ollama, 100).with_program("sh");
        let err = client
            .complete(&CompletionRequest::new(&[], &[], "m"))
            .expect_err("should fail");
        match err {
            ExecError::Provider { provider, stderr } => {
                assert_eq!(provider, "Ollama");
                assert!(!stderr.is_empty());
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn stdout_is_the_completion() {
        let client = CommandModelClient::new(Provider::Gemini, 100).with_program("echo");
        let reply = complete_or_fallback(&client, &CompletionRequest::new(&[], &[], "m"))
            .expect("echo should succeed");
        assert!(reply.starts_with("-m m -p System:"));
        assert_ne!(reply, EMPTY_REPLY_FALLBACK);
    }
}
