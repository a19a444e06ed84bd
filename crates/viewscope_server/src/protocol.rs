//! Wire protocol: one newline-terminated request line per connection.
//!
//! ```text
//! <COMMAND> [PARAMETER]\n
//! ```
//!
//! The response is the raw hierarchy text; its end is signalled by the server
//! closing the connection.

use std::io::{BufRead, BufReader, Read};

use crate::{Grammar, ProtocolError};

/// Command that dumps the focused hierarchy.
pub const PRINT_COMMAND: &str = "print";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    PrintHierarchy,
    Unknown(String),
}

impl Command {
    /// Case-insensitive lookup.
    pub fn parse(name: &str) -> Self {
        if name.eq_ignore_ascii_case(PRINT_COMMAND) {
            Command::PrintHierarchy
        } else {
            Command::Unknown(name.to_string())
        }
    }
}

/// A parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    /// Everything after the first space; empty when absent.
    pub parameters: String,
    pub grammar: Grammar,
}

impl Request {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(ProtocolError::EmptyRequest);
        }

        let (command, parameters) = line.split_once(' ').unwrap_or((line, ""));
        Ok(Self {
            command: Command::parse(command),
            parameters: parameters.to_string(),
            grammar: Grammar::from_parameter(parameters),
        })
    }

    /// Read and parse exactly one request line of at most `limit` bytes.
    ///
    /// Anything after the newline is ignored.
    pub fn read_from(reader: impl Read, limit: usize) -> Result<Self, ProtocolError> {
        let mut reader = BufReader::new(reader.take(limit as u64 + 1));
        let mut line = Vec::new();
        reader.read_until(b'\n', &mut line)?;

        if line.last() == Some(&b'\n') {
            line.pop();
        } else if line.len() > limit {
            return Err(ProtocolError::RequestTooLong { limit });
        }

        let line = String::from_utf8(line).map_err(|_| ProtocolError::InvalidEncoding)?;
        Self::parse(&line)
    }
}

/// The request line a client sends for `command`.
pub fn request_line(command: &str, grammar: Grammar) -> String {
    match grammar {
        Grammar::Object => format!("{command} {}\n", crate::grammar::OBJECT_GRAMMAR_PARAMETER),
        Grammar::Tag => format!("{command}\n"),
    }
}
