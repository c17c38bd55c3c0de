//! CLI adapter — interactive and single-command console interface.
//!
//! Hosts the command dispatcher on stdin/stdout for local use: each input
//! line becomes one command invocation, and the notification is printed.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;

use crate::dispatcher::{CommandDispatcher, Notifier};
use crate::oauth::User;
use crate::Result;

/// Notifier printing to stdout
pub struct StdoutNotifier;

#[async_trait]
impl Notifier for StdoutNotifier {
    async fn notify(&self, _user: &User, text: &str) -> Result<()> {
        println!("\n{}", text);
        Ok(())
    }
}

/// CLI channel for console sessions.
pub struct CliChannel {
    dispatcher: CommandDispatcher,
    user: User,
}

impl CliChannel {
    /// Create a new CLI channel acting as the given user.
    pub fn new(dispatcher: CommandDispatcher, user: User) -> Self {
        Self { dispatcher, user }
    }

    /// Dispatch a single command line.
    pub async fn run_once(&self, line: &str) {
        let args: Vec<String> = line.split_whitespace().map(String::from).collect();
        self.dispatcher.dispatch(&self.user, &args, &StdoutNotifier).await;
    }

    /// Run interactive REPL loop.
    pub async fn run_interactive(&self) -> Result<()> {
        println!("Commands: token | refresh | revoke | mail | <empty for authorize URL>");

        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            print!("\noauth> ");
            stdout.flush()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                // EOF
                break;
            }

            let input = line.trim();

            // Check for exit commands
            if matches!(input.to_lowercase().as_str(), "exit" | "quit" | "q") {
                println!("Goodbye! 👋");
                break;
            }

            self.run_once(input).await;
        }

        Ok(())
    }
}
