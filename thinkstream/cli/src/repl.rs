//! Line-oriented chat loop
//!
//! Reads one prompt per line from stdin. While a request is outstanding only
//! commands are accepted; status lines and the live duration are printed
//! until the session finalizes.
//!
//! Commands: `/expand` unfolds (or folds) the last timeline, `/reconnect`
//! resumes a push channel that gave up, `/quit` exits.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin, Stdout};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use thinkstream_core::{
    ChatClient, ClientError, ConnectionState, CorrelatorOutputs, DurationTick, RequestId,
    Session, SessionUpdate,
};

use crate::render::{self, RenderOptions, CLEAR_LINE};

/// What the user typed
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Quit,
    Expand,
    Reconnect,
    Blank,
    Message(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    match line.trim() {
        "/quit" | "/exit" => Input::Quit,
        "/expand" => Input::Expand,
        "/reconnect" => Input::Reconnect,
        "" => Input::Blank,
        text => Input::Message(text),
    }
}

/// Why waiting for an answer stopped
enum Outcome {
    Answered(Session),
    Interrupted,
}

struct Terminal {
    stdout: Stdout,
    options: RenderOptions,
}

impl Terminal {
    async fn write(&mut self, text: &str) -> Result<()> {
        self.stdout.write_all(text.as_bytes()).await?;
        self.stdout.flush().await?;
        Ok(())
    }

    async fn prompt(&mut self) -> Result<()> {
        self.write("> ").await
    }

    async fn session(&mut self, client: &ChatClient, session: &Session) -> Result<()> {
        if self.options.json {
            let line = render::render_session_json(session)?;
            return self.write(&line).await;
        }
        let text = render::render_session(session, client.correlator().now(), self.options.expand);
        self.write(&format!("{CLEAR_LINE}{text}")).await
    }
}

/// Run the chat loop until EOF, `/quit` or Ctrl-C
pub async fn run(
    client: ChatClient,
    mut outputs: CorrelatorOutputs,
    options: RenderOptions,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut terminal = Terminal {
        stdout: tokio::io::stdout(),
        options,
    };
    let (ticker, mut ticks) = client.spawn_ticker();
    let mut state = client.transport().watch_state();
    let mut last: Option<RequestId> = None;

    terminal.prompt().await?;
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match parse_input(&line) {
            Input::Quit => break,
            Input::Blank => {}
            Input::Reconnect => {
                if client.transport().reconnect() {
                    terminal.write("reconnecting…\n").await?;
                } else {
                    let current = client.transport().state();
                    terminal
                        .write(&format!("push channel is {current}, nothing to do\n"))
                        .await?;
                }
            }
            Input::Expand => match &last {
                Some(id) => {
                    client.correlator().toggle_collapsed(id)?;
                    if let Some(session) = client.correlator().session(id) {
                        terminal.session(&client, &session).await?;
                    }
                }
                None => terminal.write("nothing to expand yet\n").await?,
            },
            Input::Message(text) => match client.send(text).await {
                Ok(sent) => {
                    debug!(request_id = %sent.request_id, "Waiting for answer");
                    let mut waiting = Waiting {
                        client: &client,
                        lines: &mut lines,
                        outputs: &mut outputs,
                        ticks: &mut ticks,
                        state: &mut state,
                        terminal: &mut terminal,
                    };
                    let outcome = waiting.until_answered(&sent.request_id).await?;
                    match outcome {
                        Outcome::Answered(session) => {
                            terminal.session(&client, &session).await?;
                            last = Some(session.request_id);
                        }
                        Outcome::Interrupted => break,
                    }
                }
                Err(ClientError::EmptyMessage) => {}
                Err(e) => {
                    warn!(error = %e, "Send failed");
                    terminal.write(&format!("request failed: {e}\n")).await?;
                }
            },
        }

        terminal.prompt().await?;
    }

    terminal.write("\n").await?;
    ticker.abort();
    client.shutdown().await;
    Ok(())
}

/// Everything the loop needs while a request is in flight
struct Waiting<'a> {
    client: &'a ChatClient,
    lines: &'a mut Lines<BufReader<Stdin>>,
    outputs: &'a mut CorrelatorOutputs,
    ticks: &'a mut mpsc::Receiver<DurationTick>,
    state: &'a mut watch::Receiver<ConnectionState>,
    terminal: &'a mut Terminal,
}

impl Waiting<'_> {
    /// Print progress until the answer for `request_id` arrives
    async fn until_answered(&mut self, request_id: &RequestId) -> Result<Outcome> {
        let mut stdin_open = true;

        loop {
            tokio::select! {
                update = self.outputs.sessions.recv() => match update {
                    Some(SessionUpdate::Finalized(session)) if &session.request_id == request_id => {
                        return Ok(Outcome::Answered(session));
                    }
                    Some(_) => {}
                    None => return Ok(Outcome::Interrupted),
                },
                Some(status) = self.outputs.status.recv() => {
                    self.terminal.write(&render::render_status(&status)).await?;
                }
                Some(tick) = self.ticks.recv() => {
                    if !self.terminal.options.json {
                        self.terminal.write(&render::render_tick(&tick)).await?;
                    }
                }
                Ok(()) = self.state.changed() => {
                    let current = *self.state.borrow_and_update();
                    if current == ConnectionState::GaveUp {
                        self.terminal
                            .write(&format!("{CLEAR_LINE}push channel lost; type /reconnect\n"))
                            .await?;
                    }
                }
                line = self.lines.next_line(), if stdin_open => {
                    match line.context("Failed to read stdin")? {
                        None => stdin_open = false,
                        Some(line) => match parse_input(&line) {
                            Input::Quit => return Ok(Outcome::Interrupted),
                            Input::Reconnect => {
                                if self.client.transport().reconnect() {
                                    self.terminal.write(&format!("{CLEAR_LINE}reconnecting…\n")).await?;
                                }
                            }
                            Input::Blank => {}
                            Input::Expand | Input::Message(_) => {
                                self.terminal
                                    .write(&format!("{CLEAR_LINE}still waiting for the previous answer\n"))
                                    .await?;
                            }
                        },
                    }
                }
                _ = tokio::signal::ctrl_c() => return Ok(Outcome::Interrupted),
            }
        }
    }
}
