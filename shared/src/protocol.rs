//! Datagram channel: request parsing and reply formatting.
//!
//! Requests are whitespace separated ASCII tokens, one request per datagram.
//! Every reply is a single line terminated by `\n`.

use crate::{Code, Feedback, GameConfig, ParseError, PlayerId};
use std::fmt;

/// Request verbs accepted on the datagram channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Start,
    Try,
    Quit,
    Debug,
}

impl Verb {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "SNG" => Some(Verb::Start),
            "TRY" => Some(Verb::Try),
            "QUT" => Some(Verb::Quit),
            "DBG" => Some(Verb::Debug),
            _ => None,
        }
    }

    pub fn request_token(&self) -> &'static str {
        match self {
            Verb::Start => "SNG",
            Verb::Try => "TRY",
            Verb::Quit => "QUT",
            Verb::Debug => "DBG",
        }
    }

    pub fn reply_token(&self) -> &'static str {
        match self {
            Verb::Start => "RSG",
            Verb::Try => "RTR",
            Verb::Quit => "RQT",
            Verb::Debug => "RDB",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Start {
        plid: PlayerId,
        time: u32,
    },
    Try {
        plid: PlayerId,
        guess: Code,
        trial: u32,
    },
    Quit {
        plid: PlayerId,
    },
    Debug {
        plid: PlayerId,
        time: u32,
        secret: Code,
    },
}

/// A request that could not be decoded, remembering the verb when one was
/// recognised so the reply can carry the matching `ERR`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestError {
    pub verb: Option<Verb>,
    pub error: ParseError,
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.verb {
            Some(verb) => write!(f, "{}: {}", verb.request_token(), self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for RequestError {}

impl Request {
    pub fn verb(&self) -> Verb {
        match self {
            Request::Start { .. } => Verb::Start,
            Request::Try { .. } => Verb::Try,
            Request::Quit { .. } => Verb::Quit,
            Request::Debug { .. } => Verb::Debug,
        }
    }

    pub fn plid(&self) -> PlayerId {
        match self {
            Request::Start { plid, .. }
            | Request::Try { plid, .. }
            | Request::Quit { plid }
            | Request::Debug { plid, .. } => *plid,
        }
    }

    /// Decodes one datagram payload under the given game rules.
    pub fn parse(line: &str, rules: &GameConfig) -> Result<Self, RequestError> {
        let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
        let head = tokens.first().ok_or(RequestError {
            verb: None,
            error: ParseError::Empty,
        })?;
        let verb = Verb::from_token(head).ok_or_else(|| RequestError {
            verb: None,
            error: ParseError::UnknownVerb(head.to_string()),
        })?;

        Self::parse_fields(verb, &tokens[1..], rules).map_err(|error| RequestError {
            verb: Some(verb),
            error,
        })
    }

    fn parse_fields(verb: Verb, fields: &[&str], rules: &GameConfig) -> Result<Self, ParseError> {
        let len = rules.code_len;
        let expected = match verb {
            Verb::Start => 2,
            Verb::Try => 2 + len,
            Verb::Quit => 1,
            Verb::Debug => 2 + len,
        };
        if fields.len() != expected {
            return Err(ParseError::FieldCount {
                verb: verb.request_token(),
                expected,
                got: fields.len(),
            });
        }

        let plid: PlayerId = fields[0].parse()?;
        let request = match verb {
            Verb::Start => Request::Start {
                plid,
                time: parse_play_time(fields[1], rules)?,
            },
            Verb::Try => Request::Try {
                plid,
                guess: Code::parse_tokens(&fields[1..1 + len], &rules.alphabet)?,
                trial: parse_trial(fields[1 + len], rules)?,
            },
            Verb::Quit => Request::Quit { plid },
            Verb::Debug => Request::Debug {
                plid,
                time: parse_play_time(fields[1], rules)?,
                secret: Code::parse_tokens(&fields[2..2 + len], &rules.alphabet)?,
            },
        };
        Ok(request)
    }
}

fn parse_bounded(token: &str, max: u32) -> Option<u32> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse::<u32>().ok().filter(|v| (1..=max).contains(v))
}

fn parse_play_time(token: &str, rules: &GameConfig) -> Result<u32, ParseError> {
    parse_bounded(token, rules.max_playtime).ok_or_else(|| ParseError::PlayTime(token.to_string()))
}

fn parse_trial(token: &str, rules: &GameConfig) -> Result<u32, ParseError> {
    parse_bounded(token, rules.max_trials).ok_or_else(|| ParseError::TrialNumber(token.to_string()))
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = self.verb().request_token();
        match self {
            Request::Start { plid, time } => writeln!(f, "{} {} {}", verb, plid, time),
            Request::Try { plid, guess, trial } => {
                writeln!(f, "{} {} {} {}", verb, plid, guess.spaced(), trial)
            }
            Request::Quit { plid } => writeln!(f, "{} {}", verb, plid),
            Request::Debug { plid, time, secret } => {
                writeln!(f, "{} {} {} {}", verb, plid, time, secret.spaced())
            }
        }
    }
}

/// Status token carried by every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Nok,
    Err,
    Dup,
    Inv,
    Ent,
    Etm,
}

impl Status {
    pub fn token(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Nok => "NOK",
            Status::Err => "ERR",
            Status::Dup => "DUP",
            Status::Inv => "INV",
            Status::Ent => "ENT",
            Status::Etm => "ETM",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `RSG`, `RDB`, or a bare `RTR`/`RQT` status.
    Status(Verb, Status),
    /// `RTR OK nT nB nW`
    Scored { trial: u32, feedback: Feedback },
    /// `RTR ENT|ETM C1..Cn` or `RQT OK C1..Cn`
    Reveal { verb: Verb, status: Status, secret: Code },
    /// Bare `ERR` for anything that is not a known verb.
    Unknown,
}

impl Response {
    /// The reply for a request that failed to decode.
    pub fn syntax_error(verb: Option<Verb>) -> Self {
        match verb {
            Some(verb) => Response::Status(verb, Status::Err),
            None => Response::Unknown,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Response::Status(_, status) | Response::Reveal { status, .. } => *status,
            Response::Scored { .. } => Status::Ok,
            Response::Unknown => Status::Err,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Status(verb, status) => writeln!(f, "{} {}", verb.reply_token(), status),
            Response::Scored { trial, feedback } => writeln!(
                f,
                "{} {} {} {} {}",
                Verb::Try.reply_token(),
                Status::Ok,
                trial,
                feedback.black,
                feedback.white
            ),
            Response::Reveal {
                verb,
                status,
                secret,
            } => writeln!(f, "{} {} {}", verb.reply_token(), status, secret.spaced()),
            Response::Unknown => writeln!(f, "ERR"),
        }
    }
}
