//! Command-stream parsing.
//!
//! A script is a whitespace-separated token stream. Two operations are
//! recognized: `alloc:` followed by an unsigned byte count, and `dealloc`
//! (no operand, always LIFO). Every other token is skipped.

use std::fmt;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

/// Token introducing an allocation.
pub const ALLOC_TOKEN: &str = "alloc:";

/// Token requesting a LIFO deallocation.
pub const DEALLOC_TOKEN: &str = "dealloc";

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("token {token_index}: `alloc:` is missing its byte count")]
    MissingOperand { token_index: usize },
    #[error("token {token_index}: invalid byte count '{operand}'")]
    InvalidOperand { token_index: usize, operand: String },
}

/// One script operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Command {
    Alloc { bytes: usize },
    Dealloc,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alloc { bytes } => write!(f, "{ALLOC_TOKEN} {bytes}"),
            Self::Dealloc => f.write_str(DEALLOC_TOKEN),
        }
    }
}

/// A parsed script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    pub commands: Vec<Command>,
    /// Tokens that were neither operations nor operands.
    pub ignored_tokens: usize,
}

impl Script {
    /// Parses a script from text.
    pub fn parse(text: &str) -> Result<Self, ScriptError> {
        let mut script = Self::default();
        let mut tokens = text.split_whitespace().enumerate();
        while let Some((token_index, token)) = tokens.next() {
            match token {
                ALLOC_TOKEN => {
                    let Some((_, operand)) = tokens.next() else {
                        return Err(ScriptError::MissingOperand { token_index });
                    };
                    let bytes =
                        operand
                            .parse::<usize>()
                            .map_err(|_| ScriptError::InvalidOperand {
                                token_index: token_index + 1,
                                operand: operand.to_string(),
                            })?;
                    script.commands.push(Command::Alloc { bytes });
                }
                DEALLOC_TOKEN => script.commands.push(Command::Dealloc),
                _ => script.ignored_tokens += 1,
            }
        }
        Ok(script)
    }

    /// Reads and parses a script file.
    pub fn from_file(path: &Path) -> Result<Self, ScriptError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
