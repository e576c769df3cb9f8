//! Minimal async NNTP client.
//!
//! Implements exactly the conversation the news gateway needs: greeting,
//! optional `AUTHINFO` authentication, `POST` with a dot-stuffed article,
//! and `QUIT`. Responses are the single-line, three-digit kind; nothing
//! here reads multi-line article responses because nothing here fetches
//! articles.

use std::io;

use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
};

/// Errors that can occur when talking to a news server.
#[derive(Debug, Error)]
pub enum NntpError {
    /// IO error during network operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Connection was closed unexpectedly.
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// Failed to parse a response from the server.
    #[error("Failed to parse NNTP response: {0}")]
    Parse(String),

    /// The server refused a command.
    #[error("NNTP error: {code} - {message}")]
    Rejected { code: u16, message: String },
}

/// Specialized `Result` type for NNTP client operations.
pub type Result<T> = std::result::Result<T, NntpError>;

/// One NNTP status response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The three-digit status code.
    pub code: u16,
    /// The text following the status code.
    pub message: String,
}

impl Response {
    /// Parse a response line like `240 Article received OK`.
    ///
    /// # Errors
    /// If the line is shorter than a status code or the code is not
    /// numeric.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.len() < 3 {
            return Err(NntpError::Parse(format!("Response line too short: {line:?}")));
        }
        // get(..3) rather than slicing: byte 3 may fall inside a
        // multibyte character on a garbage line.
        let code = line
            .get(..3)
            .and_then(|digits| digits.parse::<u16>().ok())
            .ok_or_else(|| NntpError::Parse(format!("Invalid status code: {line:?}")))?;
        let message = line.get(4..).unwrap_or("").to_string();
        Ok(Self { code, message })
    }

    /// 2xx: command completed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// 3xx: command accepted, server expects more input.
    #[must_use]
    pub const fn is_continue(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    fn expect(self, wanted: u16) -> Result<Self> {
        if self.code == wanted {
            Ok(self)
        } else {
            Err(NntpError::Rejected {
                code: self.code,
                message: self.message,
            })
        }
    }
}

/// A connected NNTP client.
#[derive(Debug)]
pub struct NntpClient {
    stream: BufReader<TcpStream>,
}

impl NntpClient {
    /// Connect and consume the server greeting. Both 200 (posting
    /// allowed) and 201 (no posting) greetings are accepted here; a 201
    /// server will refuse the `POST` itself.
    ///
    /// # Errors
    /// If the connection or greeting fails.
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let mut client = Self {
            stream: BufReader::new(stream),
        };

        let greeting = client.read_response().await?;
        if !greeting.is_success() {
            return Err(NntpError::Rejected {
                code: greeting.code,
                message: greeting.message,
            });
        }

        Ok(client)
    }

    /// `AUTHINFO USER`/`AUTHINFO PASS` authentication.
    ///
    /// # Errors
    /// If either step is refused.
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<()> {
        let response = self.command(&format!("AUTHINFO USER {username}")).await?;
        match response.code {
            // Already authenticated by the user name alone.
            281 => Ok(()),
            381 => {
                self.command(&format!("AUTHINFO PASS {password}"))
                    .await?
                    .expect(281)?;
                Ok(())
            }
            code => Err(NntpError::Rejected {
                code,
                message: response.message,
            }),
        }
    }

    /// Post one article: `POST`, dot-stuffed body, terminating dot.
    ///
    /// # Errors
    /// If the server refuses the posting offer (340 expected) or the
    /// article itself (240 expected).
    pub async fn post(&mut self, article: &[u8]) -> Result<()> {
        self.command("POST").await?.expect(340)?;

        let stuffed = dot_stuff(article);
        self.stream.write_all(&stuffed).await?;
        self.stream.write_all(b".\r\n").await?;
        self.stream.flush().await?;

        self.read_response().await?.expect(240)?;
        Ok(())
    }

    /// Polite hangup. Failures are ignored; the conversation is over
    /// either way.
    pub async fn quit(&mut self) {
        let _ = self.command("QUIT").await;
    }

    async fn command(&mut self, command: &str) -> Result<Response> {
        self.stream
            .write_all(format!("{command}\r\n").as_bytes())
            .await?;
        self.stream.flush().await?;
        self.read_response().await
    }

    async fn read_response(&mut self) -> Result<Response> {
        let mut line = String::new();
        let n = self.stream.read_line(&mut line).await?;
        if n == 0 {
            return Err(NntpError::ConnectionClosed);
        }
        Response::parse(&line)
    }
}

/// Prepare article bytes for the data phase: normalize line endings to
/// CRLF, double leading dots, and guarantee a trailing CRLF so the
/// terminating dot stands on its own line.
pub(crate) fn dot_stuff(article: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(article.len() + 2);

    for line in split_lines(article) {
        if line.first() == Some(&b'.') {
            out.push(b'.');
        }
        out.extend_from_slice(line);
        out.extend_from_slice(b"\r\n");
    }

    out
}

/// Split on LF, tolerating both CRLF and bare LF input, dropping the
/// line terminators. A trailing newline does not produce an empty
/// final line.
fn split_lines(bytes: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut rest = bytes;

    while !rest.is_empty() {
        if let Some(i) = rest.iter().position(|b| *b == b'\n') {
            let line = &rest[..i];
            lines.push(line.strip_suffix(b"\r").unwrap_or(line));
            rest = &rest[i + 1..];
        } else {
            lines.push(rest);
            rest = &[];
        }
    }

    lines
}
