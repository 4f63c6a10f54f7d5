use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use eyre::{Result, bail, eyre};

use super::{Pending, Session};

/// Session that answers each command line from a fixed table. Unknown
/// commands produce no output, just the prompt.
pub struct ScriptedSession {
    prompt: String,
    responses: HashMap<String, String>,
    sent: Vec<String>,
    pending: Pending,
    connected: bool,
}

impl ScriptedSession {
    pub fn new(prompt: &str) -> Self {
        Self {
            prompt: prompt.to_owned(),
            responses: HashMap::new(),
            sent: Vec::new(),
            pending: Pending::default(),
            connected: false,
        }
    }

    pub fn respond(mut self, command: &str, output: &str) -> Self {
        self.responses.insert(command.to_owned(), output.to_owned());
        self
    }

    /// Every line sent so far, in order.
    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

#[async_trait]
impl Session for ScriptedSession {
    async fn connect(&mut self) -> Result<()> {
        self.connected = true;
        self.pending.push(self.prompt.as_bytes());
        self.read_until_prompt(Duration::ZERO).await?;
        Ok(())
    }

    async fn send_line(&mut self, text: &str) -> Result<()> {
        if !self.connected {
            bail!("scripted session not connected");
        }
        self.sent.push(text.to_owned());
        if let Some(output) = self.responses.get(text) {
            self.pending.push(output.as_bytes());
            if !output.ends_with('\n') {
                self.pending.push(b"\n");
            }
        }
        self.pending.push(self.prompt.as_bytes());
        Ok(())
    }

    async fn expect(&mut self, pattern: &str, _timeout: Duration) -> Result<String> {
        self.pending
            .take_until(pattern)
            .ok_or_else(|| eyre!("{pattern:?} never appears in scripted output"))
    }

    fn prompt(&self) -> &str {
        &self.prompt
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.send_line("exit").await?;
        self.connected = false;
        Ok(())
    }
}
