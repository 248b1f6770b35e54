//! Minimal blocking IMAP client over rustls.
//!
//! Speaks just enough IMAP4rev1 for the automations: LOGIN, SELECT,
//! UID SEARCH, UID FETCH, UID STORE, UID COPY, EXPUNGE, LOGOUT. Run it
//! inside `spawn_blocking`.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::MailError;

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Read timeout for every IMAP round trip.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// One fetched message: UID, flags, raw RFC 822 bytes.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    pub uid: u32,
    pub flags: Vec<String>,
    pub raw: Vec<u8>,
}

impl FetchedMessage {
    pub fn is_seen(&self) -> bool {
        self.flags.iter().any(|f| f.eq_ignore_ascii_case("\\Seen"))
    }
}

/// An authenticated IMAP session.
pub struct ImapSession {
    host: String,
    stream: TlsStream,
    tag_counter: u32,
}

fn protocol(command: &str, reason: impl ToString) -> MailError {
    MailError::Protocol {
        command: command.to_string(),
        reason: reason.to_string(),
    }
}

impl ImapSession {
    /// Connect, negotiate TLS, read the greeting and log in.
    pub fn connect(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
    ) -> Result<Self, MailError> {
        let connection_error = |e: &dyn std::fmt::Display| MailError::Connection {
            host: host.to_string(),
            reason: e.to_string(),
        };

        let tcp = TcpStream::connect((host, port)).map_err(|e| connection_error(&e))?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))
            .map_err(|e| connection_error(&e))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls_pki_types::ServerName::try_from(host.to_string())
            .map_err(|e| connection_error(&e))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| connection_error(&e))?;

        let mut session = Self {
            host: host.to_string(),
            stream: rustls::StreamOwned::new(conn, tcp),
            tag_counter: 0,
        };

        let greeting = session.read_line()?;
        if !greeting.starts_with("* OK") {
            return Err(connection_error(&format!("unexpected greeting: {}", greeting.trim())));
        }

        session.command(&format!(
            "LOGIN {} {}",
            quote(username),
            quote(password)
        ))?;
        debug!(host = %session.host, "IMAP login succeeded");
        Ok(session)
    }

    pub fn select(&mut self, mailbox: &str) -> Result<(), MailError> {
        self.command(&format!("SELECT {}", quote(mailbox)))?;
        Ok(())
    }

    /// `UID SEARCH <criteria>` → matching UIDs in ascending order.
    pub fn uid_search(&mut self, criteria: &str) -> Result<Vec<u32>, MailError> {
        let response = self.command(&format!("UID SEARCH {criteria}"))?;
        let mut uids = Vec::new();
        for line in &response.lines {
            if let Some(rest) = line.strip_prefix("* SEARCH") {
                uids.extend(rest.split_whitespace().filter_map(|s| s.parse::<u32>().ok()));
            }
        }
        uids.sort_unstable();
        Ok(uids)
    }

    /// Fetch flags and the full message without setting `\Seen`.
    pub fn uid_fetch(&mut self, uid: u32) -> Result<Option<FetchedMessage>, MailError> {
        let response = self.command(&format!("UID FETCH {uid} (FLAGS BODY.PEEK[])"))?;
        let Some(raw) = response.literals.into_iter().next() else {
            return Ok(None);
        };
        let flags = response
            .lines
            .iter()
            .find_map(|l| parse_flags(l))
            .unwrap_or_default();
        Ok(Some(FetchedMessage { uid, flags, raw }))
    }

    /// Add flags or keywords, e.g. `uid_add_flags(7, "AutoResponded")`.
    pub fn uid_add_flags(&mut self, uid: u32, flags: &str) -> Result<(), MailError> {
        self.command(&format!("UID STORE {uid} +FLAGS.SILENT ({flags})"))?;
        Ok(())
    }

    pub fn uid_copy(&mut self, uid: u32, mailbox: &str) -> Result<(), MailError> {
        self.command(&format!("UID COPY {uid} {}", quote(mailbox)))?;
        Ok(())
    }

    pub fn expunge(&mut self) -> Result<(), MailError> {
        self.command("EXPUNGE")?;
        Ok(())
    }

    pub fn logout(mut self) {
        let _ = self.command("LOGOUT");
    }

    // ── Wire helpers ────────────────────────────────────────────────

    fn next_tag(&mut self) -> String {
        self.tag_counter += 1;
        format!("A{}", self.tag_counter)
    }

    fn read_line(&mut self) -> Result<String, MailError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.stream.read(&mut byte) {
                Ok(0) => return Err(protocol("read", "connection closed")),
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).to_string());
                    }
                }
                Err(e) => return Err(protocol("read", e)),
            }
        }
    }

    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, MailError> {
        let mut buf = vec![0u8; len];
        self.stream
            .read_exact(&mut buf)
            .map_err(|e| protocol("read", e))?;
        Ok(buf)
    }

    /// Send a tagged command and collect untagged lines and literals until
    /// the tagged completion. Non-`OK` completions become errors.
    fn command(&mut self, cmd: &str) -> Result<Response, MailError> {
        let tag = self.next_tag();
        let verb = cmd.split_whitespace().next().unwrap_or(cmd).to_string();
        self.stream
            .write_all(format!("{tag} {cmd}\r\n").as_bytes())
            .and_then(|()| self.stream.flush())
            .map_err(|e| protocol(&verb, e))?;

        let mut response = Response::default();
        loop {
            let line = self.read_line()?;
            if let Some(len) = literal_length(&line) {
                let literal = self.read_exact(len)?;
                response.literals.push(literal);
                response.lines.push(line);
                continue;
            }
            if let Some(status) = line.strip_prefix(&format!("{tag} ")) {
                if status.starts_with("OK") {
                    return Ok(response);
                }
                return Err(protocol(&verb, status.trim()));
            }
            response.lines.push(line);
        }
    }
}

#[derive(Debug, Default)]
struct Response {
    lines: Vec<String>,
    literals: Vec<Vec<u8>>,
}

/// IMAP quoted string.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// `{1234}\r\n` at the end of a line announces a literal of that many bytes.
fn literal_length(line: &str) -> Option<usize> {
    let trimmed = line.trim_end_matches("\r\n");
    let open = trimmed.rfind('{')?;
    let inner = trimmed[open + 1..].strip_suffix('}')?;
    inner.parse().ok()
}

/// Flags from a `FETCH` response line, e.g. `* 3 FETCH (UID 9 FLAGS (\Seen Foo) ...`.
fn parse_flags(line: &str) -> Option<Vec<String>> {
    let start = line.find("FLAGS (")? + "FLAGS (".len();
    let end = line[start..].find(')')? + start;
    Some(
        line[start..end]
            .split_whitespace()
            .map(String::from)
            .collect(),
    )
}

/// Search criteria for a quoted string argument.
pub fn search_string(value: &str) -> String {
    quote(value)
}
