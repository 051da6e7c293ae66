//! # Outcome Ledger - Append-Only System of Record
//!
//! ## Purpose
//! One JSON record per line, ordered by resolution time, never rewritten in
//! place; crash-safe by construction. Replayed on startup to rebuild the
//! write-once guard and aggregate stats, so a restarted tracker never writes
//! a second record for an order it already judged.

use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use types::{Outcome, OutcomeResult, OrderId};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("ledger writer poisoned")]
    Poisoned,
}

/// Aggregates derived purely from ledger records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerStats {
    pub total: u64,
    pub wins: u64,
    pub losses: u64,
    pub breakeven: u64,
    pub unresolved: u64,
    pub by_pattern: HashMap<String, PatternStats>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternStats {
    pub total: u64,
    pub wins: u64,
    pub losses: u64,
}

impl LedgerStats {
    fn absorb(&mut self, outcome: &Outcome) {
        self.total += 1;
        match outcome.result {
            OutcomeResult::Win => self.wins += 1,
            OutcomeResult::Loss => self.losses += 1,
            OutcomeResult::Breakeven => self.breakeven += 1,
            OutcomeResult::Unresolved => self.unresolved += 1,
        }
        let pattern = self.by_pattern.entry(outcome.pattern.clone()).or_default();
        pattern.total += 1;
        match outcome.result {
            OutcomeResult::Win => pattern.wins += 1,
            OutcomeResult::Loss => pattern.losses += 1,
            _ => {}
        }
    }

    /// Win rate over resolved, non-breakeven outcomes.
    pub fn win_rate(&self) -> Option<f64> {
        let decided = self.wins + self.losses;
        if decided == 0 {
            return None;
        }
        Some(self.wins as f64 / decided as f64)
    }
}

impl fmt::Display for LedgerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LedgerStats {{ total: {}, W/L/BE: {}/{}/{}, unresolved: {}, win_rate: {} }}",
            self.total,
            self.wins,
            self.losses,
            self.breakeven,
            self.unresolved,
            self.win_rate()
                .map(|r| format!("{:.1}%", r * 100.0))
                .unwrap_or_else(|| "n/a".to_string()),
        )
    }
}

/// Append-only JSONL writer with a replay-built write-once guard.
pub struct OutcomeLedger {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    written: DashMap<OrderId, ()>,
    stats: Mutex<LedgerStats>,
}

impl OutcomeLedger {
    /// Open (creating if needed) and replay the ledger at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let written = DashMap::new();
        let mut stats = LedgerStats::default();
        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            let mut replayed = 0u64;
            for (line_no, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Outcome>(&line) {
                    Ok(outcome) => {
                        stats.absorb(&outcome);
                        written.insert(outcome.order_id, ());
                        replayed += 1;
                    }
                    Err(e) => {
                        // A torn final line after a crash is expected; it is
                        // skipped, not fatal.
                        warn!(line = line_no + 1, error = %e, "skipping unreadable ledger line");
                    }
                }
            }
            info!(path = %path.display(), replayed, "outcome ledger replayed");
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        // Heal a torn final line (crash mid-append) so the next record
        // starts on its own line.
        if file.metadata()?.len() > 0 {
            use std::io::{Read, Seek, SeekFrom};
            let mut check = File::open(&path)?;
            check.seek(SeekFrom::End(-1))?;
            let mut last = [0u8; 1];
            check.read_exact(&mut last)?;
            if last[0] != b'\n' {
                file.write_all(b"\n")?;
            }
        }

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
            written,
            stats: Mutex::new(stats),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether an outcome was already written for this order.
    pub fn contains(&self, order_id: OrderId) -> bool {
        self.written.contains_key(&order_id)
    }

    /// Append one outcome. Returns false (writing nothing) when a record for
    /// the order already exists — the write-once invariant.
    pub fn append(&self, outcome: &Outcome) -> Result<bool, LedgerError> {
        if self.written.insert(outcome.order_id, ()).is_some() {
            return Ok(false);
        }

        let line = serde_json::to_string(outcome)?;
        {
            let mut writer = self.writer.lock().map_err(|_| LedgerError::Poisoned)?;
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
            // Flush per record: an outcome is either durably on disk or the
            // append reports failure.
            writer.flush()?;
        }
        self.stats
            .lock()
            .map_err(|_| LedgerError::Poisoned)?
            .absorb(outcome);
        Ok(true)
    }

    pub fn stats(&self) -> LedgerStats {
        self.stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use types::{Direction, EntryQuality, UserId};

    fn outcome(result: OutcomeResult, pattern: &str) -> Outcome {
        Outcome {
            order_id: OrderId::new(),
            user_id: UserId::new("user-1"),
            symbol: "EURUSD".into(),
            direction: Direction::Buy,
            pattern: pattern.into(),
            result,
            exit_price: Some(1.0900),
            pips: 25.0,
            duration_secs: 300,
            max_adverse_excursion: 3.0,
            max_favorable_excursion: 25.0,
            entry_quality: Some(EntryQuality::Perfect),
            resolved_at: Utc::now(),
        }
    }

    #[test]
    fn append_is_write_once_per_order() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = OutcomeLedger::open(dir.path().join("outcomes.jsonl")).unwrap();

        let first = outcome(OutcomeResult::Win, "momentum-break");
        assert!(ledger.append(&first).unwrap());
        assert!(!ledger.append(&first).unwrap());
        assert!(ledger.contains(first.order_id));
        assert_eq!(ledger.stats().total, 1);
    }

    #[test]
    fn replay_rebuilds_the_guard_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outcomes.jsonl");

        let win = outcome(OutcomeResult::Win, "momentum-break");
        let loss = outcome(OutcomeResult::Loss, "range-fade");
        {
            let ledger = OutcomeLedger::open(&path).unwrap();
            ledger.append(&win).unwrap();
            ledger.append(&loss).unwrap();
        }

        // A fresh incarnation must refuse to re-judge the same orders.
        let ledger = OutcomeLedger::open(&path).unwrap();
        assert!(ledger.contains(win.order_id));
        assert!(!ledger.append(&loss).unwrap());

        let stats = ledger.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.win_rate(), Some(0.5));
        assert_eq!(stats.by_pattern["momentum-break"].wins, 1);
        assert_eq!(stats.by_pattern["range-fade"].losses, 1);
    }

    #[test]
    fn torn_trailing_line_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outcomes.jsonl");

        let win = outcome(OutcomeResult::Win, "momentum-break");
        {
            let ledger = OutcomeLedger::open(&path).unwrap();
            ledger.append(&win).unwrap();
        }
        // Simulate a crash mid-append.
        {
            use std::io::Write;
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"{\"order_id\":\"trunc").unwrap();
        }

        let ledger = OutcomeLedger::open(&path).unwrap();
        assert_eq!(ledger.stats().total, 1);
        // And the ledger still appends cleanly after the torn line.
        let next = outcome(OutcomeResult::Loss, "range-fade");
        assert!(ledger.append(&next).unwrap());
        drop(ledger);

        // The healed file replays both good records.
        let reopened = OutcomeLedger::open(&path).unwrap();
        assert_eq!(reopened.stats().total, 2);
    }

    #[test]
    fn records_are_one_line_each_in_resolution_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outcomes.jsonl");
        let ledger = OutcomeLedger::open(&path).unwrap();
        for result in [
            OutcomeResult::Win,
            OutcomeResult::Loss,
            OutcomeResult::Breakeven,
        ] {
            ledger.append(&outcome(result, "momentum-break")).unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        let first: Outcome = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.result, OutcomeResult::Win);
    }
}
