//! Line-oriented script interpreter for one test case
//!
//! Lines run strictly in order with no look-ahead. SQL and echoed text go to
//! the transcript uppercased; the first failing line stops the case.

use crate::client::ProtocolClient;
use crate::parser::{ScriptLine, parse_line};
use crate::registry::{ConnectionRegistry, DEFAULT_CONNECTION};
use obtest_core::transcript::Transcript;
use obtest_core::{CommandError, Endpoint, Result};
use std::time::Duration;
use tracing::{debug, error};

pub struct CommandInterpreter {
    endpoint: Endpoint,
    receive_timeout: Duration,
    clients: ConnectionRegistry,
    current: String,
    transcript: Transcript,
}

impl CommandInterpreter {
    /// Open the implicit "default" connection and make it current.
    pub async fn connect(endpoint: &Endpoint, receive_timeout: Duration) -> Result<Self> {
        let client = ProtocolClient::connect_with_timeout(endpoint, receive_timeout).await?;
        let mut clients = ConnectionRegistry::new();
        clients.insert(DEFAULT_CONNECTION, client)?;

        Ok(Self {
            endpoint: endpoint.clone(),
            receive_timeout,
            clients,
            current: DEFAULT_CONNECTION.to_owned(),
            transcript: Transcript::new(),
        })
    }

    /// Run every line in order, stopping at the first failure.
    pub async fn run_lines<S: AsRef<str>>(&mut self, lines: &[S]) -> Result<()> {
        for line in lines {
            let line = line.as_ref();
            if let Err(e) = self.run_line(line).await {
                error!("Failed to run command '{}': {}", line.trim(), e);
                return Err(e);
            }
        }
        Ok(())
    }

    pub async fn run_line(&mut self, line: &str) -> Result<()> {
        match parse_line(line) {
            // An empty script line becomes an empty transcript line.
            ScriptLine::Blank => self.transcript.write_line(""),
            ScriptLine::Comment => {}
            ScriptLine::Echo(text) => self.transcript.write_line(&text),
            ScriptLine::Connect(name) => self.run_connect(&name).await?,
            ScriptLine::Connection(name) => self.run_connection(&name)?,
            ScriptLine::Sort(sql) => self.run_sort(&sql).await?,
            ScriptLine::Sql(sql) => self.run_sql(&sql).await?,
            ScriptLine::Unknown(verb) => {
                return Err(CommandError::UnknownCommand(verb).into());
            }
        }
        Ok(())
    }

    async fn run_connect(&mut self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(CommandError::EmptyName.into());
        }
        if self.clients.contains(name) {
            return Err(CommandError::DuplicateConnection(name.to_owned()).into());
        }

        let client = ProtocolClient::connect_with_timeout(&self.endpoint, self.receive_timeout).await?;
        self.clients.insert(name, client)?;
        debug!("connection {} opened", name);
        Ok(())
    }

    fn run_connection(&mut self, name: &str) -> Result<()> {
        if !self.clients.contains(name) {
            return Err(CommandError::UnknownConnection(name.to_owned()).into());
        }
        self.current = name.to_owned();
        Ok(())
    }

    async fn run_sql(&mut self, sql: &str) -> Result<()> {
        self.transcript.write_line(sql);
        let response = self.active_client()?.roundtrip(sql).await?;
        self.transcript.write(&response);
        Ok(())
    }

    async fn run_sort(&mut self, sql: &str) -> Result<()> {
        self.transcript.write_line(sql);
        let response = self.active_client()?.roundtrip(sql).await?;
        self.transcript.write(&sort_response(&response));
        Ok(())
    }

    fn active_client(&mut self) -> Result<&mut ProtocolClient> {
        self.clients.get_mut(&self.current)
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn current_connection(&self) -> &str {
        &self.current
    }

    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }

    /// Close every connection. Also happens on drop.
    pub fn close(&mut self) {
        self.clients.close_all();
    }

    /// Close every connection and hand back whatever was recorded.
    pub fn into_transcript(mut self) -> Transcript {
        self.close();
        self.transcript
    }
}

/// Sort response rows so fixtures do not depend on server row order.
pub fn sort_response(response: &str) -> String {
    let mut rows: Vec<String> = response.trim().split('\n').map(str::to_uppercase).collect();
    rows.sort();

    let mut sorted = rows.join("\n");
    sorted.push('\n');
    sorted
}
