//! Flat-file store.
//!
//! ```text
//! <root>/GAMES/GAME_<PLID>.txt                         live transcript
//! <root>/GAMES/<PLID>/<YYYYMMDD>_<HHMMSS>_<W|F|Q|T>.txt  archived transcripts
//! <root>/SCORES/<SSS>_<PLID>_<DDMMYYYY>_<HHMMSS>.txt     score records
//! ```
//!
//! A second file for the same second gets a `_<n>` suffix before `.txt`.
//! Archive suffixes count every game closed in that second, whatever its
//! status, so `(timestamp, n)` orders a player's archive.

use super::{EndRecord, GameStore, StoreError, Transcript, TranscriptHeader, TrialRecord};
use crate::scoring::ScoreRecord;
use chrono::{Local, NaiveDateTime, TimeZone};
use log::{debug, warn};
use shared::{Code, EndStatus, GameMode, PlayerId};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const GAMES_DIR: &str = "GAMES";
const SCORES_DIR: &str = "SCORES";

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Opens a store rooted at `root`, creating the directory layout if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self { root: root.into() };
        for dir in [store.games_dir(), store.scores_dir()] {
            fs::create_dir_all(&dir).map_err(|e| StoreError::io("create", dir, e))?;
        }
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn games_dir(&self) -> PathBuf {
        self.root.join(GAMES_DIR)
    }

    fn scores_dir(&self) -> PathBuf {
        self.root.join(SCORES_DIR)
    }

    fn live_path(&self, plid: PlayerId) -> PathBuf {
        self.games_dir().join(format!("GAME_{}.txt", plid))
    }

    fn archive_dir(&self, plid: PlayerId) -> PathBuf {
        self.games_dir().join(plid.as_str())
    }

    /// Archive path for `end`, numbered after every game already closed in
    /// the same second.
    fn archive_path(&self, plid: PlayerId, end: &EndRecord) -> PathBuf {
        let stamp = end.ended_at.format("%Y%m%d_%H%M%S").to_string();
        let dir = self.archive_dir(plid);

        let taken = fs::read_dir(&dir)
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .filter_map(|entry| archive_entry(&entry.file_name().to_string_lossy()))
                    .filter(|entry| entry.stamp == stamp)
                    .map(|entry| entry.seq)
                    .max()
            })
            .unwrap_or(None);

        let stem = format!("{}_{}", stamp, end.status.code());
        let mut seq = taken.map_or(0, |n| n + 1);
        loop {
            let path = match seq {
                0 => dir.join(format!("{}.txt", stem)),
                n => dir.join(format!("{}_{}.txt", stem, n)),
            };
            if !path.exists() {
                return path;
            }
            seq += 1;
        }
    }

    fn read_transcript(path: &Path, status: Option<EndStatus>) -> Result<Transcript, StoreError> {
        let text = fs::read_to_string(path).map_err(|e| StoreError::io("read", path, e))?;
        Transcript::parse(&text, status, &path.display().to_string())
    }

    fn append_line(path: &Path, line: &str) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|e| StoreError::io("open", path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| StoreError::io("append to", path, e))
    }

    /// Moves the closed transcript into the archive and reads it back.
    fn move_to_archive(
        &self,
        live: &Path,
        target: &Path,
        status: EndStatus,
    ) -> Result<Transcript, String> {
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir).map_err(|e| format!("create {}: {}", dir.display(), e))?;
        }
        fs::rename(live, target).map_err(|e| format!("rename: {}", e))?;

        match Self::read_transcript(target, Some(status)) {
            Ok(transcript) => Ok(transcript),
            Err(e) => {
                if let Err(undo) = fs::rename(target, live) {
                    warn!(
                        "Could not move {} back to {}: {}",
                        target.display(),
                        live.display(),
                        undo
                    );
                }
                Err(format!("read back: {}", e))
            }
        }
    }
}

/// Name fields of an archived transcript (`..._W.txt`, `..._Q_2.txt`).
#[derive(Debug, PartialEq, Eq)]
struct ArchiveEntry {
    stamp: String,
    seq: u32,
    status: EndStatus,
}

fn archive_entry(name: &str) -> Option<ArchiveEntry> {
    let stem = name.strip_suffix(".txt")?;
    let parts: Vec<&str> = stem.split('_').collect();
    let (date, time, code, seq) = match parts.as_slice() {
        [date, time, code] => (date, time, code, 0),
        [date, time, code, seq] => (date, time, code, parse_seq(seq)?),
        _ => return None,
    };
    let mut chars = code.chars();
    let status = match (chars.next(), chars.next()) {
        (Some(c), None) => EndStatus::from_code(c)?,
        _ => return None,
    };
    Some(ArchiveEntry {
        stamp: format!("{}_{}", date, time),
        seq,
        status,
    })
}

fn parse_seq(token: &str) -> Option<u32> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok().filter(|n| *n > 0)
}

fn parse_score_file(name: &str, text: &str) -> Option<ScoreRecord> {
    let stem = name.strip_suffix(".txt")?;
    let name_parts: Vec<&str> = stem.split('_').collect();
    let (date, time) = match name_parts.as_slice() {
        [_, _, date, time] => (date, time),
        [_, _, date, time, seq] => {
            parse_seq(seq)?;
            (date, time)
        }
        _ => return None,
    };
    let naive = NaiveDateTime::parse_from_str(&format!("{}{}", date, time), "%d%m%Y%H%M%S").ok()?;
    let completed_at = Local.from_local_datetime(&naive).earliest()?;

    let fields: Vec<&str> = text.split_ascii_whitespace().collect();
    let [score, plid, secret, trials, mode] = fields.as_slice() else {
        return None;
    };
    Some(ScoreRecord {
        score: score.parse::<u32>().ok().filter(|s| *s <= 100)?,
        plid: plid.parse::<PlayerId>().ok()?,
        secret: Code::new(secret.chars().collect()),
        trials: trials.parse::<u32>().ok()?,
        mode: GameMode::from_name(mode)?,
        completed_at,
    })
}

impl GameStore for FileStore {
    fn open_transcript(&mut self, header: &TranscriptHeader) -> Result<(), StoreError> {
        let path = self.live_path(header.plid);
        fs::write(&path, header.to_line()).map_err(|e| StoreError::io("write", &path, e))?;
        debug!("Opened transcript {}", path.display());
        Ok(())
    }

    fn append_trial(&mut self, plid: PlayerId, trial: &TrialRecord) -> Result<(), StoreError> {
        let path = self.live_path(plid);
        if !path.exists() {
            return Err(StoreError::MissingTranscript(plid));
        }
        Self::append_line(&path, &trial.to_line())
    }

    fn live_transcript(&self, plid: PlayerId) -> Result<Option<Transcript>, StoreError> {
        let path = self.live_path(plid);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_transcript(&path, None).map(Some)
    }

    fn archive(&mut self, plid: PlayerId, end: &EndRecord) -> Result<Transcript, StoreError> {
        let live = self.live_path(plid);
        let original_len = fs::metadata(&live)
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => StoreError::MissingTranscript(plid),
                _ => StoreError::io("stat", &live, e),
            })?
            .len();

        Self::append_line(&live, &end.to_line())?;

        let target = self.archive_path(plid, end);
        match self.move_to_archive(&live, &target, end.status) {
            Ok(transcript) => {
                debug!("Archived {} as {}", live.display(), target.display());
                Ok(transcript)
            }
            Err(reason) => {
                // Drop the end line again so the live file is as it was.
                let restored = OpenOptions::new()
                    .write(true)
                    .open(&live)
                    .and_then(|file| file.set_len(original_len));
                if let Err(e) = restored {
                    warn!("Could not restore {}: {}", live.display(), e);
                }
                Err(StoreError::ArchiveRolledBack { path: live, reason })
            }
        }
    }

    fn latest_archive(&self, plid: PlayerId) -> Result<Option<Transcript>, StoreError> {
        let dir = self.archive_dir(plid);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io("list", dir, e)),
        };

        let latest = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                archive_entry(&name).map(|parsed| (name, parsed))
            })
            .max_by(|(_, a), (_, b)| (&a.stamp, a.seq).cmp(&(&b.stamp, b.seq)));

        match latest {
            Some((name, parsed)) => {
                Self::read_transcript(&dir.join(name), Some(parsed.status)).map(Some)
            }
            None => Ok(None),
        }
    }

    fn record_score(&mut self, record: &ScoreRecord) -> Result<(), StoreError> {
        let stem = format!(
            "{:03}_{}_{}",
            record.score,
            record.plid,
            record.completed_at.format("%d%m%Y_%H%M%S")
        );
        let line = format!(
            "{:03} {} {} {} {}",
            record.score,
            record.plid,
            record.secret,
            record.trials,
            record.mode.name()
        );

        let dir = self.scores_dir();
        let mut seq = 0u32;
        loop {
            let path = match seq {
                0 => dir.join(format!("{}.txt", stem)),
                n => dir.join(format!("{}_{}.txt", stem, n)),
            };
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(line.as_bytes())
                        .map_err(|e| StoreError::io("write", &path, e))?;
                    debug!("Score file created: {}", path.display());
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => seq += 1,
                Err(e) => return Err(StoreError::io("create", path, e)),
            }
        }
    }

    fn load_scores(&self) -> Result<Vec<ScoreRecord>, StoreError> {
        let dir = self.scores_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io("list", dir, e)),
        };

        let mut records = Vec::new();
        for entry in entries.filter_map(|entry| entry.ok()) {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let parsed = fs::read_to_string(entry.path())
                .ok()
                .and_then(|text| parse_score_file(&name, &text));
            match parsed {
                Some(record) => records.push(record),
                None => warn!("Skipping unreadable score file {}", entry.path().display()),
            }
        }
        Ok(records)
    }
}
