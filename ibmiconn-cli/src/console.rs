//! Terminal implementations of the UI collaborators

use std::io::Write as _;

use async_trait::async_trait;
use ibmiconn_core::{ErrorCode, MessageKind, ProgressUpdate, UserPrompter};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Prompts on stdin, reports on stderr
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsolePrompter {
    /// Answer every question with its default instead of asking
    pub non_interactive: bool,
}

impl ConsolePrompter {
    async fn confirm(&self, question: &str) -> bool {
        if self.non_interactive {
            return false;
        }
        eprint!("{question} [y/N] ");
        let _ = std::io::stderr().flush();

        let mut line = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        match stdin.read_line(&mut line).await {
            Ok(0) | Err(_) => false,
            Ok(_) => parse_answer(&line),
        }
    }
}

#[async_trait]
impl UserPrompter for ConsolePrompter {
    async fn confirm_reconnect(&self, connection_name: &str) -> bool {
        self.confirm(&format!("Connection to {connection_name} lost. Reconnect?"))
            .await
    }

    async fn confirm_retry(&self, connection_name: &str, detail: &str) -> bool {
        self.confirm(&format!(
            "Could not connect to {connection_name}: {detail}. Try again?"
        ))
        .await
    }

    async fn blocking_notice(&self, text: &str) {
        eprintln!("! {text}");
    }

    async fn message(&self, kind: MessageKind, text: &str) {
        eprintln!("[{kind}] {text}");
    }

    async fn progress(&self, update: ProgressUpdate) {
        eprintln!("  {}", update.message);
    }

    async fn handle_error(&self, code: &ErrorCode, data: &str) -> bool {
        eprintln!("[{code}] {data}");
        false
    }
}

/// Returns true for a yes answer
fn parse_answer(line: &str) -> bool {
    matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
}
