//! Wire vocabulary shared by the game server and its peers.
//!
//! Holds the protocol constants, the identifiers and colour codes exchanged on
//! the wire, the peg-matching feedback function, and the request/response
//! types of both the datagram and the stream channel.

pub mod feedback;
pub mod protocol;
pub mod stream;

pub use feedback::{evaluate, Feedback};
pub use protocol::{Request, Response, Status};
pub use stream::{FrameHeader, StreamRequest};

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 58054;
pub const DEFAULT_COLORS: &str = "RGBYOP";
pub const COLOR_SEQUENCE_LEN: usize = 4;
pub const MAX_TRIALS: u32 = 8;
pub const MAX_PLAYTIME: u32 = 600;
pub const MAX_BUFFER_SIZE: usize = 1024;
pub const PLID_LEN: usize = 6;

/// Syntax errors raised while decoding anything that came off the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty request")]
    Empty,
    #[error("unknown verb: {0}")]
    UnknownVerb(String),
    #[error("{verb}: expected {expected} fields, got {got}")]
    FieldCount {
        verb: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("invalid player id: {0:?}")]
    PlayerId(String),
    #[error("invalid color token: {0:?}")]
    Color(String),
    #[error("invalid play time: {0:?}")]
    PlayTime(String),
    #[error("invalid trial number: {0:?}")]
    TrialNumber(String),
    #[error("invalid alphabet: {0}")]
    Alphabet(String),
    #[error("malformed line: {0:?}")]
    Malformed(String),
}

/// Six ASCII digits identifying a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId([u8; PLID_LEN]);

impl PlayerId {
    pub fn as_str(&self) -> &str {
        // Only ASCII digits are ever stored.
        std::str::from_utf8(&self.0).unwrap_or("??????")
    }
}

impl FromStr for PlayerId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != PLID_LEN || !bytes.iter().all(u8::is_ascii_digit) {
            return Err(ParseError::PlayerId(s.to_string()));
        }
        let mut id = [0u8; PLID_LEN];
        id.copy_from_slice(bytes);
        Ok(PlayerId(id))
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of colour symbols a code may be drawn from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet(Vec<char>);

impl Alphabet {
    /// Builds an alphabet from a string of distinct, non-whitespace symbols.
    pub fn new(symbols: &str) -> Result<Self, ParseError> {
        let chars: Vec<char> = symbols.chars().collect();
        if chars.len() < 2 {
            return Err(ParseError::Alphabet(format!(
                "need at least two symbols, got {:?}",
                symbols
            )));
        }
        for (i, c) in chars.iter().enumerate() {
            if c.is_whitespace() {
                return Err(ParseError::Alphabet("whitespace is not a color".into()));
            }
            if chars[..i].contains(c) {
                return Err(ParseError::Alphabet(format!("duplicate symbol {:?}", c)));
            }
        }
        Ok(Alphabet(chars))
    }

    pub fn contains(&self, symbol: char) -> bool {
        self.0.contains(&symbol)
    }

    pub fn symbols(&self) -> &[char] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Alphabet {
    fn default() -> Self {
        Alphabet(DEFAULT_COLORS.chars().collect())
    }
}

/// An ordered sequence of colour symbols: a secret or a guess.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Code(Vec<char>);

impl Code {
    pub fn new(symbols: Vec<char>) -> Self {
        Code(symbols)
    }

    /// Parses the compact form (`RGBY`) used in transcripts and score records.
    pub fn parse_compact(s: &str, rules: &GameConfig) -> Result<Self, ParseError> {
        let symbols: Vec<char> = s.chars().collect();
        if symbols.len() != rules.code_len || !symbols.iter().all(|c| rules.alphabet.contains(*c)) {
            return Err(ParseError::Color(s.to_string()));
        }
        Ok(Code(symbols))
    }

    /// Parses one single-symbol token per position, as sent on the wire.
    pub fn parse_tokens(tokens: &[&str], alphabet: &Alphabet) -> Result<Self, ParseError> {
        tokens
            .iter()
            .map(|token| {
                let mut chars = token.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if alphabet.contains(c) => Ok(c),
                    _ => Err(ParseError::Color(token.to_string())),
                }
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Code)
    }

    pub fn symbols(&self) -> &[char] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Space separated form used in protocol replies (`R G B Y`).
    pub fn spaced(&self) -> String {
        let mut out = String::with_capacity(self.0.len() * 2);
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push(*c);
        }
        out
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in &self.0 {
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameMode {
    Play,
    Debug,
}

impl GameMode {
    /// One-letter tag written in transcript headers.
    pub fn tag(&self) -> char {
        match self {
            GameMode::Play => 'P',
            GameMode::Debug => 'D',
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "P" => Some(GameMode::Play),
            "D" => Some(GameMode::Debug),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GameMode::Play => "PLAY",
            GameMode::Debug => "DEBUG",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "PLAY" => Some(GameMode::Play),
            "DEBUG" => Some(GameMode::Debug),
            _ => None,
        }
    }
}

/// How a game left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndStatus {
    Win,
    Fail,
    Quit,
    Timeout,
}

impl EndStatus {
    pub fn code(&self) -> char {
        match self {
            EndStatus::Win => 'W',
            EndStatus::Fail => 'F',
            EndStatus::Quit => 'Q',
            EndStatus::Timeout => 'T',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'W' => Some(EndStatus::Win),
            'F' => Some(EndStatus::Fail),
            'Q' => Some(EndStatus::Quit),
            'T' => Some(EndStatus::Timeout),
            _ => None,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            EndStatus::Win => "WIN",
            EndStatus::Fail => "FAIL",
            EndStatus::Quit => "QUIT",
            EndStatus::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for EndStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Game rules that shape both parsing and play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameConfig {
    pub max_trials: u32,
    /// Upper bound for a game's time budget, in seconds.
    pub max_playtime: u32,
    pub alphabet: Alphabet,
    pub code_len: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_trials: MAX_TRIALS,
            max_playtime: MAX_PLAYTIME,
            alphabet: Alphabet::default(),
            code_len: COLOR_SEQUENCE_LEN,
        }
    }
}
