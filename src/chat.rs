//! The conversation boundary with the rewriting agent.
//!
//! The protocol only ever needs one operation from the model: send the
//! conversation so far, get the next reply. The transcript is an
//! immutable value; appending a turn returns a new transcript, so a
//! protocol state is never mutated behind the caller's back.

use std::collections::VecDeque;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Mutex;

use thiserror::Error;

/// Who said a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    fn tag(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn of the conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// An append-only conversation transcript.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new transcript with one more turn appended.
    #[must_use]
    pub fn push(&self, role: Role, text: impl Into<String>) -> Self {
        let mut turns = self.turns.clone();
        turns.push(Turn {
            role,
            text: text.into(),
        });
        Self { turns }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Serialize the transcript in the role-tagged wire form consumed
    /// by [`PipeClient`] subprocesses.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for turn in &self.turns {
            out.push_str("### ");
            out.push_str(turn.role.tag());
            out.push('\n');
            out.push_str(&turn.text);
            if !turn.text.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }
}

/// Transport failure talking to the model. Always fatal to the current
/// optimization attempt.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to launch agent command '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("i/o error talking to agent: {0}")]
    Io(#[from] std::io::Error),

    #[error("agent command exited with {status}")]
    Exit { status: std::process::ExitStatus },

    #[error("scripted client ran out of replies after {0}")]
    ScriptExhausted(usize),
}

/// The one operation the protocol needs from a model.
pub trait ModelClient {
    /// Send the conversation so far and block until the full reply
    /// text is available.
    fn send(&self, transcript: &Transcript) -> Result<String, ClientError>;
}

/// Client that shells out to an external command per round, writing the
/// rendered transcript to its stdin and reading the reply from its
/// stdout. This keeps the completion transport (HTTP, local model,
/// wrapper script) entirely outside the core.
pub struct PipeClient {
    command: String,
}

impl PipeClient {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl ModelClient for PipeClient {
    fn send(&self, transcript: &Transcript) -> Result<String, ClientError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| ClientError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        // Feed stdin from its own thread: a child that streams output
        // while still reading would deadlock against a full pipe once
        // the transcript outgrows the buffer.
        let mut stdin = child.stdin.take().expect("stdin was piped");
        let rendered = transcript.render();
        let (sent, output) = std::thread::scope(|scope| {
            let writer = scope.spawn(move || stdin.write_all(rendered.as_bytes()));
            let output = child.wait_with_output();
            (writer.join(), output)
        });
        match sent {
            Ok(Ok(())) => {}
            // The child may close stdin early once it has read enough.
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(err)) => return Err(ClientError::Io(err)),
            Err(_) => {
                return Err(ClientError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "transcript writer panicked",
                )))
            }
        }

        let output = output?;
        if !output.status.success() {
            return Err(ClientError::Exit {
                status: output.status,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Client that replays a fixed script of replies. Used by the protocol
/// tests, where each entry stands in for one model response.
pub struct ScriptClient {
    replies: Mutex<VecDeque<String>>,
    total: usize,
}

impl ScriptClient {
    pub fn new<S: Into<String>, I: IntoIterator<Item = S>>(replies: I) -> Self {
        let replies: VecDeque<String> = replies.into_iter().map(Into::into).collect();
        let total = replies.len();
        Self {
            replies: Mutex::new(replies),
            total,
        }
    }
}

impl ModelClient for ScriptClient {
    fn send(&self, _transcript: &Transcript) -> Result<String, ClientError> {
        let mut replies = match self.replies.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        replies
            .pop_front()
            .ok_or(ClientError::ScriptExhausted(self.total))
    }
}
