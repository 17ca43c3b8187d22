/// Tor control protocol framing
///
/// Commands are single CRLF-terminated lines. Replies are one or more lines
/// of the form `CODE SEP TEXT` where SEP is `-` (more lines follow), `+`
/// (a dot-terminated data block follows) or a space (final line).
/// Asynchronous events use code 650 and may arrive interleaved with
/// replies; they are queued until asked for.

use anonshare_core::{ControlEvent, ServiceStream, TransportError};
use std::collections::VecDeque;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

/// Reply code for asynchronous events
const EVENT_CODE: u16 = 650;

/// Commands whose arguments must never reach the log
const SECRET_COMMANDS: &[&str] = &["AUTHENTICATE", "ADD_ONION"];

/// A complete reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Values of `KEY=value` reply lines
    pub fn value(&self, key: &str) -> Option<&str> {
        self.lines
            .iter()
            .find_map(|line| line.strip_prefix(key)?.strip_prefix('='))
    }

    fn into_event(self) -> ControlEvent {
        let text = self.lines.join("\n");
        match text.split_once(' ') {
            Some((kind, body)) => ControlEvent::new(kind, body),
            None => ControlEvent::new(text, ""),
        }
    }

    fn into_error(self) -> TransportError {
        TransportError::Rejected {
            code: self.code,
            message: self.lines.join(" "),
        }
    }
}

/// Line-oriented control socket
pub struct ControlSocket {
    stream: BufReader<Box<dyn ServiceStream>>,
    events: VecDeque<ControlEvent>,
}

impl ControlSocket {
    pub fn new(stream: Box<dyn ServiceStream>) -> Self {
        Self {
            stream: BufReader::new(stream),
            events: VecDeque::new(),
        }
    }

    /// Send a command and wait for its reply. Non-2xx replies are errors.
    pub async fn command(&mut self, line: &str) -> Result<Reply, TransportError> {
        debug!("Control <- {}", redact(line));
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await?;

        loop {
            let reply = self.read_reply().await?;
            if reply.code == EVENT_CODE {
                self.events.push_back(reply.into_event());
                continue;
            }

            return if reply.is_ok() {
                Ok(reply)
            } else {
                Err(reply.into_error())
            };
        }
    }

    /// Next asynchronous event, queued or read from the socket
    pub async fn next_event(&mut self) -> Result<ControlEvent, TransportError> {
        if let Some(event) = self.events.pop_front() {
            return Ok(event);
        }

        loop {
            let reply = self.read_reply().await?;
            if reply.code == EVENT_CODE {
                return Ok(reply.into_event());
            }
            debug!("Ignoring unsolicited reply {}", reply.code);
        }
    }

    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.stream.shutdown().await?;
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<Reply, TransportError> {
        let mut lines = Vec::new();

        loop {
            let line = self.read_line().await?;
            let (code, separator, text) = split_reply_line(&line)?;

            match separator {
                ' ' => {
                    lines.push(text.to_string());
                    return Ok(Reply { code, lines });
                }
                '-' => lines.push(text.to_string()),
                '+' => {
                    let mut data = text.to_string();
                    loop {
                        let line = self.read_line().await?;
                        if line == "." {
                            break;
                        }
                        data.push('\n');
                        data.push_str(line.strip_prefix('.').unwrap_or(&line));
                    }
                    lines.push(data);
                }
                other => {
                    return Err(TransportError::Protocol(format!(
                        "unexpected separator {:?}",
                        other
                    )))
                }
            }
        }
    }

    async fn read_line(&mut self) -> Result<String, TransportError> {
        let mut line = String::new();
        if self.stream.read_line(&mut line).await? == 0 {
            return Err(TransportError::Closed);
        }

        let line = line.trim_end_matches(['\r', '\n']).to_string();
        debug!("Control -> {}", line);
        Ok(line)
    }
}

fn split_reply_line(line: &str) -> Result<(u16, char, &str), TransportError> {
    let malformed = || TransportError::Protocol(format!("malformed reply line: {}", line));

    let code = line
        .get(..3)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(malformed)?;
    let separator = line[3..].chars().next().ok_or_else(malformed)?;
    let text = line.get(4..).unwrap_or_default();

    Ok((code, separator, text))
}

fn redact(line: &str) -> String {
    match line.split_once(' ') {
        Some((command, _)) if SECRET_COMMANDS.contains(&command) => {
            format!("{} [redacted]", command)
        }
        _ => line.to_string(),
    }
}

/// Quote a string argument
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Unquote a `"..."` value, or return it as is
pub fn unquote(value: &str) -> String {
    let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) else {
        return value.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}
