//! Durable game records: live transcripts, archives and score records.
//!
//! The registry talks to storage only through [`GameStore`]. Two backends are
//! provided: [`FileStore`] keeps the human-readable flat-file layout on disk,
//! [`MemoryStore`] keeps everything in maps and is used by tests and by the
//! `--in-memory` server mode.
//!
//! Transcript text format, one record per line:
//!
//! ```text
//! <PLID> <P|D> <CCCC> <budget> <YYYY-MM-DD> <HH:MM:SS> <unix>   header
//! T: <CCCC> <black> <white> <elapsed>                          one per trial
//! <YYYY-MM-DD> <HH:MM:SS> <duration>                           end of game
//! ```

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::scoring::ScoreRecord;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use shared::{Code, EndStatus, Feedback, GameMode, PlayerId};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        source: io::Error,
    },
    #[error("corrupt record in {origin}: {detail}")]
    Corrupt { origin: String, detail: String },
    #[error("no live transcript for player {0}")]
    MissingTranscript(PlayerId),
    #[error("archival of {} rolled back: {reason}", .path.display())]
    ArchiveRolledBack { path: PathBuf, reason: String },
    #[error("store is refusing writes")]
    Unavailable,
}

impl StoreError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            action,
            path: path.into(),
            source,
        }
    }

    fn corrupt(origin: &str, detail: impl Into<String>) -> Self {
        StoreError::Corrupt {
            origin: origin.to_string(),
            detail: detail.into(),
        }
    }
}

/// First line of every transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptHeader {
    pub plid: PlayerId,
    pub mode: GameMode,
    pub secret: Code,
    pub budget_secs: u32,
    pub started_at: DateTime<Local>,
}

/// One accepted guess. Never rewritten once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialRecord {
    pub guess: Code,
    pub feedback: Feedback,
    /// Seconds of play consumed when the guess was scored.
    pub elapsed_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndRecord {
    pub ended_at: DateTime<Local>,
    pub duration_secs: u32,
    pub status: EndStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub header: TranscriptHeader,
    pub trials: Vec<TrialRecord>,
    /// Present once the game has been archived.
    pub end: Option<EndRecord>,
}

impl Transcript {
    pub fn new(header: TranscriptHeader) -> Self {
        Self {
            header,
            trials: Vec::new(),
            end: None,
        }
    }

    /// Decodes transcript text. `status` comes from the archive key and is
    /// required for the end line to be accepted.
    pub fn parse(text: &str, status: Option<EndStatus>, origin: &str) -> Result<Self, StoreError> {
        let mut lines = text.lines().filter(|line| !line.trim().is_empty());
        let header = lines
            .next()
            .ok_or_else(|| StoreError::corrupt(origin, "empty transcript"))
            .and_then(|line| TranscriptHeader::parse_line(line, origin))?;
        let mut transcript = Transcript::new(header);

        for line in lines {
            if transcript.end.is_some() {
                return Err(StoreError::corrupt(origin, "record after end of game"));
            }
            if line.starts_with("T:") {
                transcript.trials.push(TrialRecord::parse_line(line, origin)?);
                continue;
            }
            match status {
                Some(status) => transcript.end = Some(EndRecord::parse_line(line, status, origin)?),
                None => return Err(StoreError::corrupt(origin, "end record in a live transcript")),
            }
        }
        Ok(transcript)
    }

    pub fn to_text(&self) -> String {
        let mut text = self.header.to_line();
        for trial in &self.trials {
            text.push_str(&trial.to_line());
        }
        if let Some(end) = &self.end {
            text.push_str(&end.to_line());
        }
        text
    }
}

fn parse_code(token: &str, origin: &str) -> Result<Code, StoreError> {
    if token.is_empty() {
        return Err(StoreError::corrupt(origin, "empty color code"));
    }
    Ok(Code::new(token.chars().collect()))
}

fn parse_number<T: std::str::FromStr>(
    token: &str,
    what: &str,
    origin: &str,
) -> Result<T, StoreError> {
    token
        .parse()
        .map_err(|_| StoreError::corrupt(origin, format!("bad {}: {:?}", what, token)))
}

fn parse_local(date: &str, time: &str, origin: &str) -> Result<DateTime<Local>, StoreError> {
    let naive = NaiveDateTime::parse_from_str(&format!("{} {}", date, time), DATE_TIME_FORMAT)
        .map_err(|e| StoreError::corrupt(origin, format!("bad timestamp: {}", e)))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| StoreError::corrupt(origin, "nonexistent local time"))
}

impl TranscriptHeader {
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {} {} {}\n",
            self.plid,
            self.mode.tag(),
            self.secret,
            self.budget_secs,
            self.started_at.format(DATE_TIME_FORMAT),
            self.started_at.timestamp()
        )
    }

    fn parse_line(line: &str, origin: &str) -> Result<Self, StoreError> {
        let fields: Vec<&str> = line.split_ascii_whitespace().collect();
        let [plid, mode, secret, budget, _date, _time, unix] = fields.as_slice() else {
            return Err(StoreError::corrupt(origin, format!("bad header: {:?}", line)));
        };
        let unix: i64 = parse_number(unix, "start timestamp", origin)?;
        Ok(Self {
            plid: plid
                .parse::<PlayerId>()
                .map_err(|e| StoreError::corrupt(origin, format!("{}", e)))?,
            mode: GameMode::from_tag(mode)
                .ok_or_else(|| StoreError::corrupt(origin, format!("bad mode: {:?}", mode)))?,
            secret: parse_code(secret, origin)?,
            budget_secs: parse_number(budget, "budget", origin)?,
            started_at: Local
                .timestamp_opt(unix, 0)
                .single()
                .ok_or_else(|| StoreError::corrupt(origin, "start timestamp out of range"))?,
        })
    }
}

impl TrialRecord {
    pub fn to_line(&self) -> String {
        format!(
            "T: {} {} {} {}\n",
            self.guess, self.feedback.black, self.feedback.white, self.elapsed_secs
        )
    }

    fn parse_line(line: &str, origin: &str) -> Result<Self, StoreError> {
        let fields: Vec<&str> = line.split_ascii_whitespace().collect();
        let ["T:", guess, black, white, elapsed] = fields.as_slice() else {
            return Err(StoreError::corrupt(origin, format!("bad trial: {:?}", line)));
        };
        Ok(Self {
            guess: parse_code(guess, origin)?,
            feedback: Feedback {
                black: parse_number(black, "black count", origin)?,
                white: parse_number(white, "white count", origin)?,
            },
            elapsed_secs: parse_number(elapsed, "elapsed time", origin)?,
        })
    }
}

impl EndRecord {
    pub fn to_line(&self) -> String {
        format!(
            "{} {}\n",
            self.ended_at.format(DATE_TIME_FORMAT),
            self.duration_secs
        )
    }

    fn parse_line(line: &str, status: EndStatus, origin: &str) -> Result<Self, StoreError> {
        let fields: Vec<&str> = line.split_ascii_whitespace().collect();
        let [date, time, duration] = fields.as_slice() else {
            return Err(StoreError::corrupt(origin, format!("bad end record: {:?}", line)));
        };
        Ok(Self {
            ended_at: parse_local(date, time, origin)?,
            duration_secs: parse_number(duration, "duration", origin)?,
            status,
        })
    }
}

/// Durable storage for transcripts and score records, keyed by player id.
///
/// Every method is called from the registry owner only, so implementations
/// never see concurrent access for the same key.
pub trait GameStore: Send {
    /// Starts a fresh live transcript, replacing any stale one.
    fn open_transcript(&mut self, header: &TranscriptHeader) -> Result<(), StoreError>;

    fn append_trial(&mut self, plid: PlayerId, trial: &TrialRecord) -> Result<(), StoreError>;

    fn live_transcript(&self, plid: PlayerId) -> Result<Option<Transcript>, StoreError>;

    /// Closes the live transcript with `end` and moves it into the archive.
    ///
    /// Either the transcript ends up archived and readable, or it is left
    /// exactly where and as it was and an error is returned.
    fn archive(&mut self, plid: PlayerId, end: &EndRecord) -> Result<Transcript, StoreError>;

    /// Most recently archived game for `plid`.
    fn latest_archive(&self, plid: PlayerId) -> Result<Option<Transcript>, StoreError>;

    fn record_score(&mut self, record: &ScoreRecord) -> Result<(), StoreError>;

    fn load_scores(&self) -> Result<Vec<ScoreRecord>, StoreError>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use shared::GameConfig;

    pub fn at(secs: i64) -> DateTime<Local> {
        Local.timestamp_opt(1_760_000_000 + secs, 0).unwrap()
    }

    pub fn code(s: &str) -> Code {
        Code::parse_compact(s, &GameConfig::default()).unwrap()
    }

    pub fn plid(s: &str) -> PlayerId {
        s.parse().unwrap()
    }

    pub fn header(id: &str, secret: &str) -> TranscriptHeader {
        TranscriptHeader {
            plid: plid(id),
            mode: GameMode::Play,
            secret: code(secret),
            budget_secs: 120,
            started_at: at(0),
        }
    }

    pub fn trial(guess: &str, black: u32, white: u32, elapsed_secs: u32) -> TrialRecord {
        TrialRecord {
            guess: code(guess),
            feedback: Feedback { black, white },
            elapsed_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_transcript_text_format() {
        let mut transcript = Transcript::new(header("103274", "RGBY"));
        transcript.trials.push(trial("RRRR", 1, 0, 4));
        transcript.trials.push(trial("YBGR", 0, 4, 17));

        let text = transcript.to_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("103274 P RGBY 120 "));
        assert!(lines[0].ends_with(&at(0).timestamp().to_string()));
        assert_eq!(lines[1], "T: RRRR 1 0 4");
        assert_eq!(lines[2], "T: YBGR 0 4 17");

        assert_eq!(Transcript::parse(&text, None, "test").unwrap(), transcript);
    }

    #[test]
    fn test_archived_transcript_needs_status() {
        let mut transcript = Transcript::new(header("103274", "RGBY"));
        transcript.trials.push(trial("RGBY", 4, 0, 9));
        transcript.end = Some(EndRecord {
            ended_at: at(9),
            duration_secs: 9,
            status: EndStatus::Win,
        });
        let text = transcript.to_text();

        let parsed = Transcript::parse(&text, Some(EndStatus::Win), "test").unwrap();
        assert_eq!(parsed, transcript);
        assert!(Transcript::parse(&text, None, "test").is_err());
    }

    #[test]
    fn test_corrupt_transcripts() {
        assert!(Transcript::parse("", None, "test").is_err());
        assert!(Transcript::parse("103274 P RGBY 120\n", None, "test").is_err());
        let text = format!("{}T: RGBY four 0 1\n", header("103274", "RGBY").to_line());
        assert!(Transcript::parse(&text, None, "test").is_err());
    }
}
