//! Volatile store with the same semantics as the flat-file one.

use super::{EndRecord, GameStore, StoreError, TranscriptHeader, TrialRecord, Transcript};
use crate::scoring::ScoreRecord;
use shared::PlayerId;
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    live: HashMap<PlayerId, Transcript>,
    archives: HashMap<PlayerId, Vec<Transcript>>,
    scores: Vec<ScoreRecord>,
    refuse_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with [`StoreError::Unavailable`],
    /// standing in for a full or read-only disk.
    pub fn refuse_writes(&mut self, refuse: bool) {
        self.refuse_writes = refuse;
    }

    /// Number of archived games for `plid`.
    pub fn archive_count(&self, plid: PlayerId) -> usize {
        self.archives.get(&plid).map_or(0, Vec::len)
    }

    pub fn score_count(&self) -> usize {
        self.scores.len()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.refuse_writes {
            Err(StoreError::Unavailable)
        } else {
            Ok(())
        }
    }
}

impl GameStore for MemoryStore {
    fn open_transcript(&mut self, header: &TranscriptHeader) -> Result<(), StoreError> {
        self.check_writable()?;
        self.live.insert(header.plid, Transcript::new(header.clone()));
        Ok(())
    }

    fn append_trial(&mut self, plid: PlayerId, trial: &TrialRecord) -> Result<(), StoreError> {
        self.check_writable()?;
        let transcript = self
            .live
            .get_mut(&plid)
            .ok_or(StoreError::MissingTranscript(plid))?;
        transcript.trials.push(trial.clone());
        Ok(())
    }

    fn live_transcript(&self, plid: PlayerId) -> Result<Option<Transcript>, StoreError> {
        Ok(self.live.get(&plid).cloned())
    }

    fn archive(&mut self, plid: PlayerId, end: &EndRecord) -> Result<Transcript, StoreError> {
        self.check_writable()?;
        let mut transcript = self
            .live
            .remove(&plid)
            .ok_or(StoreError::MissingTranscript(plid))?;
        transcript.end = Some(end.clone());
        self.archives
            .entry(plid)
            .or_default()
            .push(transcript.clone());
        Ok(transcript)
    }

    fn latest_archive(&self, plid: PlayerId) -> Result<Option<Transcript>, StoreError> {
        Ok(self
            .archives
            .get(&plid)
            .and_then(|archived| archived.last())
            .cloned())
    }

    fn record_score(&mut self, record: &ScoreRecord) -> Result<(), StoreError> {
        self.check_writable()?;
        self.scores.push(record.clone());
        Ok(())
    }

    fn load_scores(&self) -> Result<Vec<ScoreRecord>, StoreError> {
        Ok(self.scores.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::*;
    use shared::EndStatus;

    #[test]
    fn test_archive_is_all_or_nothing() {
        let mut store = MemoryStore::new();
        let id = plid("103274");
        store.open_transcript(&header("103274", "RGBY")).unwrap();
        store.append_trial(id, &trial("RRRR", 1, 0, 2)).unwrap();

        let end = EndRecord {
            ended_at: at(30),
            duration_secs: 30,
            status: EndStatus::Quit,
        };

        store.refuse_writes(true);
        assert!(store.archive(id, &end).is_err());
        assert!(store.live_transcript(id).unwrap().is_some());
        assert_eq!(store.archive_count(id), 0);

        store.refuse_writes(false);
        let archived = store.archive(id, &end).unwrap();
        assert_eq!(archived.trials.len(), 1);
        assert!(store.live_transcript(id).unwrap().is_none());
        assert_eq!(store.latest_archive(id).unwrap(), Some(archived));
    }

    #[test]
    fn test_missing_transcript() {
        let mut store = MemoryStore::new();
        let id = plid("103274");
        assert!(matches!(
            store.append_trial(id, &trial("RRRR", 1, 0, 2)),
            Err(StoreError::MissingTranscript(_))
        ));
        assert!(store.latest_archive(id).unwrap().is_none());
    }
}
