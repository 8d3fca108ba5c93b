//! Stream channel: transcript and scoreboard transfers
//!
//! A transfer is answered with one header line and, when the header announces
//! a file, exactly that many payload bytes. Replies are built by the owner of
//! the engine and handed to the connection task fully formed.

use crate::engine::Engine;
use crate::registry::Reconcile;
use crate::scoring::rank_leaderboard;
use crate::store::{GameStore, Transcript};
use chrono::{DateTime, Local};
use log::{debug, error};
use shared::stream::{StreamKind, TransferStatus};
use shared::{FrameHeader, PlayerId, StreamRequest};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A complete reply to a stream request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReply {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl TransferReply {
    fn bare(kind: Option<StreamKind>, status: TransferStatus) -> Self {
        Self {
            header: FrameHeader::bare(kind, status),
            payload: Vec::new(),
        }
    }

    fn file(kind: StreamKind, status: TransferStatus, name: String, body: String) -> Self {
        let payload = body.into_bytes();
        Self {
            header: FrameHeader::with_file(kind, status, name, payload.len()),
            payload,
        }
    }

    /// Header line followed by the payload, as written to the connection
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.header.to_string().into_bytes();
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

impl<S: GameStore> Engine<S> {
    /// Answers one stream request line
    pub fn handle_stream(&mut self, line: &str, now: DateTime<Local>) -> TransferReply {
        match StreamRequest::parse(line) {
            Ok(StreamRequest::ShowTrials { plid }) => self.show_trials(plid, now),
            Ok(StreamRequest::Scoreboard) => self.scoreboard(),
            Err((kind, e)) => {
                debug!("Rejected stream request {:?}: {}", line.trim_end(), e);
                TransferReply::bare(kind, TransferStatus::Err)
            }
        }
    }

    fn show_trials(&mut self, plid: PlayerId, now: DateTime<Local>) -> TransferReply {
        let kind = StreamKind::ShowTrials;
        let name = format!("STATE_{}.txt", plid);

        if let Reconcile::Active = self.registry.reconcile_time(plid, now) {
            if let Some(session) = self.registry.get(plid) {
                let transcript = match self.registry.store().live_transcript(plid) {
                    Ok(Some(transcript)) => transcript,
                    Ok(None) => Transcript::new(session.header()),
                    Err(e) => {
                        error!("Failed to read live transcript of {}: {}", plid, e);
                        Transcript::new(session.header())
                    }
                };
                let body = trial_report(&transcript, Some(session.remaining_secs));
                return TransferReply::file(kind, TransferStatus::Act, name, body);
            }
        }

        match self.registry.store().latest_archive(plid) {
            Ok(Some(transcript)) => {
                let body = trial_report(&transcript, None);
                TransferReply::file(kind, TransferStatus::Fin, name, body)
            }
            Ok(None) => TransferReply::bare(Some(kind), TransferStatus::Nok),
            Err(e) => {
                error!("Failed to read archive of {}: {}", plid, e);
                TransferReply::bare(Some(kind), TransferStatus::Nok)
            }
        }
    }

    fn scoreboard(&mut self) -> TransferReply {
        let kind = StreamKind::Scoreboard;
        let records = self.registry.store().load_scores().unwrap_or_else(|e| {
            error!("Failed to load scores: {}", e);
            Vec::new()
        });

        let ranked = rank_leaderboard(records);
        if ranked.is_empty() {
            return TransferReply::bare(Some(kind), TransferStatus::Empty);
        }

        let mut body = String::new();
        for (rank, record) in ranked.iter().enumerate() {
            body.push_str(&format!(
                "{} {:03} {} {} {} {}\n",
                rank + 1,
                record.score,
                record.plid,
                record.secret,
                record.trials,
                record.mode.name()
            ));
        }

        self.scoreboards_served += 1;
        let name = format!("TOPSCORES_{:07}.txt", self.scoreboards_served);
        TransferReply::file(kind, TransferStatus::Ok, name, body)
    }
}

/// Human readable report of a game
///
/// A live game shows its remaining seconds; a finished one reveals its secret
/// and how it ended.
fn trial_report(transcript: &Transcript, remaining_secs: Option<i64>) -> String {
    let header = &transcript.header;
    let mut report = String::new();

    let state = if remaining_secs.is_some() { "Active" } else { "Last finished" };
    report.push_str(&format!(
        "{} game of player {} ({} mode)\n",
        state,
        header.plid,
        header.mode.name()
    ));
    report.push_str(&format!(
        "Started {}, budget {} s\n",
        header.started_at.format(TIMESTAMP_FORMAT),
        header.budget_secs
    ));
    if remaining_secs.is_none() {
        report.push_str(&format!("Secret: {}\n", header.secret));
    }

    if transcript.trials.is_empty() {
        report.push_str("No trials yet\n");
    } else {
        report.push_str(&format!("Trials ({}):\n", transcript.trials.len()));
        for (i, trial) in transcript.trials.iter().enumerate() {
            report.push_str(&format!(
                "{} {} nB={} nW={} at {} s\n",
                i + 1,
                trial.guess,
                trial.feedback.black,
                trial.feedback.white,
                trial.elapsed_secs
            ));
        }
    }

    match (remaining_secs, &transcript.end) {
        (Some(remaining), _) => {
            report.push_str(&format!("{} seconds remaining\n", remaining.max(0)));
        }
        (None, Some(end)) => {
            report.push_str(&format!(
                "Ended {} after {} s: {}\n",
                end.ended_at.format(TIMESTAMP_FORMAT),
                end.duration_secs,
                end.status
            ));
        }
        (None, None) => {}
    }
    report
}

/// Reads one framed reply: the header line, then exactly the announced
/// number of payload bytes however many reads they take
pub async fn read_framed<R>(reader: &mut R) -> io::Result<(FrameHeader, Vec<u8>)>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed before header",
        ));
    }

    let header =
        FrameHeader::parse(&line).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut payload = vec![0u8; header.payload_len()];
    reader.read_exact(&mut payload).await?;
    Ok((header, payload))
}
