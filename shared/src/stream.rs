//! Stream channel: transcript and scoreboard transfer requests.
//!
//! A reply is one header line, `<TAG> <status> [<name> <size>]`, followed by
//! exactly `size` payload bytes when a file is announced.

use crate::{ParseError, PlayerId};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    ShowTrials,
    Scoreboard,
}

impl StreamKind {
    pub fn request_token(&self) -> &'static str {
        match self {
            StreamKind::ShowTrials => "STR",
            StreamKind::Scoreboard => "SSB",
        }
    }

    pub fn reply_token(&self) -> &'static str {
        match self {
            StreamKind::ShowTrials => "RST",
            StreamKind::Scoreboard => "RSS",
        }
    }

    fn from_reply_token(token: &str) -> Option<Self> {
        match token {
            "RST" => Some(StreamKind::ShowTrials),
            "RSS" => Some(StreamKind::Scoreboard),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamRequest {
    ShowTrials { plid: PlayerId },
    Scoreboard,
}

impl StreamRequest {
    /// Decodes a request line. On failure the recognised kind, if any, is
    /// returned so the reply can carry the matching tag.
    pub fn parse(line: &str) -> Result<Self, (Option<StreamKind>, ParseError)> {
        let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
        match tokens.as_slice() {
            [] => Err((None, ParseError::Empty)),
            ["STR", plid] => plid
                .parse()
                .map(|plid| StreamRequest::ShowTrials { plid })
                .map_err(|e| (Some(StreamKind::ShowTrials), e)),
            ["STR", rest @ ..] => Err((
                Some(StreamKind::ShowTrials),
                ParseError::FieldCount {
                    verb: "STR",
                    expected: 1,
                    got: rest.len(),
                },
            )),
            ["SSB"] => Ok(StreamRequest::Scoreboard),
            ["SSB", rest @ ..] => Err((
                Some(StreamKind::Scoreboard),
                ParseError::FieldCount {
                    verb: "SSB",
                    expected: 0,
                    got: rest.len(),
                },
            )),
            [verb, ..] => Err((None, ParseError::UnknownVerb(verb.to_string()))),
        }
    }

    pub fn kind(&self) -> StreamKind {
        match self {
            StreamRequest::ShowTrials { .. } => StreamKind::ShowTrials,
            StreamRequest::Scoreboard => StreamKind::Scoreboard,
        }
    }
}

impl fmt::Display for StreamRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamRequest::ShowTrials { plid } => writeln!(f, "STR {}", plid),
            StreamRequest::Scoreboard => writeln!(f, "SSB"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Live transcript of an active game.
    Act,
    /// Archived transcript of a finished game.
    Fin,
    Ok,
    Empty,
    Nok,
    Err,
}

impl TransferStatus {
    pub fn token(&self) -> &'static str {
        match self {
            TransferStatus::Act => "ACT",
            TransferStatus::Fin => "FIN",
            TransferStatus::Ok => "OK",
            TransferStatus::Empty => "EMPTY",
            TransferStatus::Nok => "NOK",
            TransferStatus::Err => "ERR",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "ACT" => Some(TransferStatus::Act),
            "FIN" => Some(TransferStatus::Fin),
            "OK" => Some(TransferStatus::Ok),
            "EMPTY" => Some(TransferStatus::Empty),
            "NOK" => Some(TransferStatus::Nok),
            "ERR" => Some(TransferStatus::Err),
            _ => None,
        }
    }
}

/// Name and byte length of the payload following a header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// `None` for the bare `ERR` sent to unrecognised requests.
    pub kind: Option<StreamKind>,
    pub status: TransferStatus,
    pub file: Option<FileInfo>,
}

impl FrameHeader {
    pub fn bare(kind: Option<StreamKind>, status: TransferStatus) -> Self {
        Self {
            kind,
            status,
            file: None,
        }
    }

    pub fn with_file(kind: StreamKind, status: TransferStatus, name: String, size: usize) -> Self {
        Self {
            kind: Some(kind),
            status,
            file: Some(FileInfo { name, size }),
        }
    }

    /// Payload length announced by this header (zero when none).
    pub fn payload_len(&self) -> usize {
        self.file.as_ref().map_or(0, |file| file.size)
    }

    /// Decodes a header line as received by a peer.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let malformed = || ParseError::Malformed(line.to_string());
        let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
        match tokens.as_slice() {
            ["ERR"] => Ok(FrameHeader::bare(None, TransferStatus::Err)),
            [tag, status] => {
                let kind = StreamKind::from_reply_token(tag).ok_or_else(malformed)?;
                let status = TransferStatus::from_token(status).ok_or_else(malformed)?;
                Ok(FrameHeader::bare(Some(kind), status))
            }
            [tag, status, name, size] => {
                let kind = StreamKind::from_reply_token(tag).ok_or_else(malformed)?;
                let status = TransferStatus::from_token(status).ok_or_else(malformed)?;
                let size = size.parse::<usize>().map_err(|_| malformed())?;
                Ok(FrameHeader::with_file(kind, status, name.to_string(), size))
            }
            _ => Err(malformed()),
        }
    }
}

impl fmt::Display for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            None => f.write_str(self.status.token())?,
            Some(kind) => write!(f, "{} {}", kind.reply_token(), self.status.token())?,
        }
        if let Some(file) = &self.file {
            write!(f, " {} {}", file.name, file.size)?;
        }
        writeln!(f)
    }
}
