//! Append-only, file-backed ring log. The default Pub/Sub Bus backend: one
//! log file per channel, readers tail by byte offset, rotated past 10 MB
//! with up to 5 historical files retained.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write as _};
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::{BusError, Envelope, Result, Subscription};

const ROTATE_THRESHOLD_BYTES: u64 = 10 * 1024 * 1024;
const MAX_HISTORICAL_FILES: u32 = 5;

#[derive(Debug, Serialize, Deserialize)]
struct LogRecord {
    seq: u64,
    envelope: Envelope,
}

/// Serialises writes (and the sequence counter) behind one process-local
/// lock. Separate processes are not coordinated — matches the single-writer
/// concurrency model the rest of the crate assumes.
pub struct FileLogBus {
    root: PathBuf,
    next_seq: Mutex<HashMap<String, u64>>,
}

impl FileLogBus {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), next_seq: Mutex::new(HashMap::new()) }
    }

    fn channel_path(&self, channel: &str) -> PathBuf {
        self.root.join(format!("{channel}.log"))
    }

    fn historical_path(&self, channel: &str, n: u32) -> PathBuf {
        self.root.join(format!("{channel}.log.{n}"))
    }

    fn rotate_if_needed(&self, channel: &str) -> Result<()> {
        let path = self.channel_path(channel);
        let Ok(metadata) = fs::metadata(&path) else { return Ok(()) };
        if metadata.len() < ROTATE_THRESHOLD_BYTES {
            return Ok(());
        }

        let oldest = self.historical_path(channel, MAX_HISTORICAL_FILES);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..MAX_HISTORICAL_FILES).rev() {
            let from = self.historical_path(channel, n);
            if from.exists() {
                fs::rename(&from, self.historical_path(channel, n + 1))?;
            }
        }
        fs::rename(&path, self.historical_path(channel, 1))?;
        Ok(())
    }

    pub fn publish(&self, channel: &str, envelope: Envelope) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        self.rotate_if_needed(channel)?;

        let mut seqs = self.next_seq.lock().map_err(|_| BusError::Remote("sequence lock poisoned".to_string()))?;
        let seq = seqs.entry(channel.to_string()).or_insert(0);
        let record = LogRecord { seq: *seq, envelope };
        *seq += 1;
        drop(seqs);

        let mut file = OpenOptions::new().create(true).append(true).open(self.channel_path(channel))?;
        writeln!(file, "{}", serde_json::to_string(&record)?)?;
        Ok(())
    }

    pub fn subscribe(&self, channels: Vec<String>) -> FileLogSubscription {
        FileLogSubscription { root: self.root.clone(), channels, offsets: HashMap::new() }
    }

    pub fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Tails each subscribed channel's current log file from the last byte
/// offset seen. A trailing incomplete line (a writer mid-`writeln!`) is
/// treated as EOF and retried on the next poll, never yielded truncated.
pub struct FileLogSubscription {
    root: PathBuf,
    channels: Vec<String>,
    offsets: HashMap<String, u64>,
}

impl FileLogSubscription {
    fn poll_channel(&mut self, channel: &str) -> Result<Vec<Envelope>> {
        let path = self.root.join(format!("{channel}.log"));
        let Ok(mut file) = File::open(&path) else { return Ok(Vec::new()) };

        let offset = *self.offsets.entry(channel.to_string()).or_insert(0);
        file.seek(SeekFrom::Start(offset))?;
        let mut reader = BufReader::new(file);

        let mut out = Vec::new();
        let mut advanced = offset;
        loop {
            let mut line = String::new();
            let bytes_read = reader.read_line(&mut line)?;
            if bytes_read == 0 || !line.ends_with('\n') {
                break;
            }
            advanced += bytes_read as u64;
            if let Ok(record) = serde_json::from_str::<LogRecord>(line.trim_end()) {
                out.push(record.envelope);
            }
        }
        self.offsets.insert(channel.to_string(), advanced);
        Ok(out)
    }
}

impl Subscription for FileLogSubscription {
    fn poll(&mut self) -> Result<Vec<Envelope>> {
        let channels = self.channels.clone();
        let mut out = Vec::new();
        for channel in &channels {
            out.extend(self.poll_channel(channel)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageType;

    fn envelope(from: &str) -> Envelope {
        Envelope::new(MessageType::Checkin, from, None, serde_json::json!({}))
    }

    #[test]
    fn publish_then_subscribe_sees_the_message() {
        let dir = tempfile::tempdir().unwrap();
        let bus = FileLogBus::new(dir.path());
        bus.publish("coordinator", envelope("agent-1")).unwrap();

        let mut sub = bus.subscribe(vec!["coordinator".to_string()]);
        let msgs = sub.poll().unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].from_agent, "agent-1");
    }

    #[test]
    fn subscription_does_not_replay_already_polled_messages() {
        let dir = tempfile::tempdir().unwrap();
        let bus = FileLogBus::new(dir.path());
        bus.publish("coordinator", envelope("agent-1")).unwrap();
        let mut sub = bus.subscribe(vec!["coordinator".to_string()]);
        assert_eq!(sub.poll().unwrap().len(), 1);
        assert_eq!(sub.poll().unwrap().len(), 0);

        bus.publish("coordinator", envelope("agent-2")).unwrap();
        let more = sub.poll().unwrap();
        assert_eq!(more.len(), 1);
        assert_eq!(more[0].from_agent, "agent-2");
    }

    #[test]
    fn channels_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let bus = FileLogBus::new(dir.path());
        bus.publish("coordinator", envelope("a")).unwrap();
        bus.publish("insights", envelope("b")).unwrap();

        let mut sub = bus.subscribe(vec!["coordinator".to_string()]);
        assert_eq!(sub.poll().unwrap().len(), 1);
    }

    #[test]
    fn empty_channel_yields_no_messages() {
        let dir = tempfile::tempdir().unwrap();
        let bus = FileLogBus::new(dir.path());
        let mut sub = bus.subscribe(vec!["nothing-published-yet".to_string()]);
        assert!(sub.poll().unwrap().is_empty());
    }

    #[test]
    fn rotation_keeps_at_most_five_historical_files() {
        let dir = tempfile::tempdir().unwrap();
        let bus = FileLogBus::new(dir.path());
        let path = bus.channel_path("noisy");
        fs::create_dir_all(&dir).unwrap();
        fs::write(&path, vec![b'x'; (ROTATE_THRESHOLD_BYTES + 1) as usize]).unwrap();
        for _ in 0..7 {
            bus.publish("noisy", envelope("a")).unwrap();
            fs::write(bus.channel_path("noisy"), vec![b'x'; (ROTATE_THRESHOLD_BYTES + 1) as usize]).unwrap();
        }
        for n in 1..=MAX_HISTORICAL_FILES {
            let _ = bus.historical_path("noisy", n);
        }
        let historical_count = (1..=MAX_HISTORICAL_FILES + 2)
            .filter(|n| bus.historical_path("noisy", *n).exists())
            .count();
        assert!(historical_count as u32 <= MAX_HISTORICAL_FILES);
    }
}
