use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};

use crate::limits::JOURNAL_CHANNEL_CAPACITY;

/// Encode a single record to [len][bincode][crc32] format.
fn encode_record<T: Serialize>(writer: &mut impl Write, record: &T) -> io::Result<()> {
    let payload =
        bincode::serialize(record).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Append-only journal file.
///
/// Format per entry: `[u32: len][bincode: T][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - Truncated last entry (crash) is safely discarded via length-prefix + CRC check.
pub struct Journal {
    writer: BufWriter<File>,
    path: PathBuf,
    /// File length after the last successful `flush_sync`.
    synced_len: u64,
    /// Records buffered since the last `flush_sync`.
    pending: u64,
    appends_since_compact: u64,
}

impl Journal {
    /// Open (or create) the journal file at `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let synced_len = file.metadata()?.len();
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            synced_len,
            pending: 0,
            appends_since_compact: 0,
        })
    }

    /// Append one record and fsync. Production code goes through `JournalWriter`.
    #[cfg(test)]
    pub fn append<T: Serialize>(&mut self, record: &T) -> io::Result<()> {
        self.append_buffered(record)?;
        self.flush_sync()
    }

    /// Append to the BufWriter without flushing or syncing.
    /// Call `flush_sync()` after the batch to durably commit all buffered records.
    pub fn append_buffered<T: Serialize>(&mut self, record: &T) -> io::Result<()> {
        encode_record(&mut self.writer, record)?;
        self.pending += 1;
        Ok(())
    }

    /// Flush the BufWriter and fsync the underlying file.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        let file = self.writer.get_ref();
        file.sync_all()?;
        self.synced_len = file.metadata()?.len();
        self.appends_since_compact += self.pending;
        self.pending = 0;
        Ok(())
    }

    /// Drop everything written since the last successful `flush_sync`, both the
    /// unflushed buffer and any bytes that already reached the file.
    pub fn discard_unsynced(&mut self) -> io::Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        let (stale_file, _unflushed) = stale.into_parts();
        stale_file.set_len(self.synced_len)?;
        stale_file.sync_all()?;
        self.pending = 0;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write compacted records to a temp file and fsync.
    pub fn write_compact_file<T: Serialize>(path: &Path, records: &[T]) -> io::Result<()> {
        let tmp_path = path.with_extension("journal.tmp");
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        for record in records {
            encode_record(&mut writer, record)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Atomic swap: rename temp file over the journal and reopen.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        let tmp_path = self.path.with_extension("journal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.synced_len = file.metadata()?.len();
        self.writer = BufWriter::new(file);
        self.pending = 0;
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact<T: Serialize>(&mut self, records: &[T]) -> io::Result<()> {
        Self::write_compact_file(&self.path, records)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Replay the journal from disk, returning all valid records.
    /// Truncated/corrupt trailing entries are silently discarded.
    pub fn replay<T: DeserializeOwned>(path: &Path) -> io::Result<Vec<T>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();

        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            let len = u32::from_le_bytes(len_buf) as usize;

            let mut payload = vec![0u8; len];
            match reader.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
                Err(e) => return Err(e),
            }

            let mut crc_buf = [0u8; 4];
            match reader.read_exact(&mut crc_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
                Err(e) => return Err(e),
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                tracing::warn!(path = %path.display(), "journal replay stopped at corrupt entry");
                break;
            }

            match bincode::deserialize::<T>(&payload) {
                Ok(record) => records.push(record),
                Err(_) => break, // corrupt payload
            }
        }

        Ok(records)
    }
}

// ── Group-commit writer ──────────────────────────────────

/// Rewrites the full record history into an equivalent, shorter one.
pub type CompactFold<T> = Box<dyn FnOnce(Vec<T>) -> Vec<T> + Send>;

enum JournalCommand<T> {
    Append {
        record: T,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        fold: CompactFold<T>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Handle to a background task that owns a `Journal` and batches appends.
pub struct JournalWriter<T> {
    tx: mpsc::Sender<JournalCommand<T>>,
    _record: PhantomData<fn(T)>,
}

impl<T> Clone for JournalWriter<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned + Send + 'static> JournalWriter<T> {
    /// Spawn the writer task. Must be called inside a tokio runtime.
    pub fn spawn(journal: Journal) -> Self {
        let (tx, rx) = mpsc::channel(JOURNAL_CHANNEL_CAPACITY);
        tokio::spawn(writer_loop(journal, rx));
        Self {
            tx,
            _record: PhantomData,
        }
    }

    /// A writer whose task is gone; every append fails. Used to exercise fault paths.
    #[cfg(test)]
    pub fn closed() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self {
            tx,
            _record: PhantomData,
        }
    }

    /// Durably append one record. Resolves after the batch holding it is fsynced.
    pub async fn append(&self, record: T) -> io::Result<()> {
        let (response, rx) = oneshot::channel();
        self.tx
            .send(JournalCommand::Append { record, response })
            .await
            .map_err(|_| io::Error::other("journal writer shut down"))?;
        rx.await
            .map_err(|_| io::Error::other("journal writer dropped response"))?
    }

    /// Replay the journal inside the writer task, fold it, and swap the result in.
    /// Appends queued behind the compaction land after the new contents.
    pub async fn compact<F>(&self, fold: F) -> io::Result<()>
    where
        F: FnOnce(Vec<T>) -> Vec<T> + Send + 'static,
    {
        let (response, rx) = oneshot::channel();
        self.tx
            .send(JournalCommand::Compact { fold: Box::new(fold), response })
            .await
            .map_err(|_| io::Error::other("journal writer shut down"))?;
        rx.await
            .map_err(|_| io::Error::other("journal writer dropped response"))?
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (response, rx) = oneshot::channel();
        if self
            .tx
            .send(JournalCommand::AppendsSinceCompact { response })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders with the batch result.
async fn writer_loop<T: Serialize + DeserializeOwned>(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand<T>>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            JournalCommand::Append { record, response } => {
                let mut batch = vec![(record, response)];

                loop {
                    match rx.try_recv() {
                        Ok(JournalCommand::Append { record, response }) => {
                            batch.push((record, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut journal, &mut batch);
                            handle_non_append(&mut journal, other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut journal, &mut batch);
                }
            }
            other => handle_non_append(&mut journal, other),
        }
    }
}

fn flush_and_respond<T: Serialize>(
    journal: &mut Journal,
    batch: &mut Vec<(T, oneshot::Sender<io::Result<()>>)>,
) {
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(journal, batch);
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(ref e) = result {
        tracing::error!(path = %journal.path().display(), "journal flush failed: {e}");
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch<T: Serialize>(
    journal: &mut Journal,
    batch: &[(T, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let result = batch
        .iter()
        .try_for_each(|(record, _)| journal.append_buffered(record))
        .and_then(|()| journal.flush_sync());
    // Callers of a failed batch are told it failed, so none of it may replay.
    if result.is_err()
        && let Err(e) = journal.discard_unsynced()
    {
        tracing::error!(path = %journal.path().display(), "could not discard failed batch: {e}");
    }
    result
}

fn handle_non_append<T: Serialize + DeserializeOwned>(journal: &mut Journal, cmd: JournalCommand<T>) {
    match cmd {
        JournalCommand::Compact { fold, response } => {
            let _ = response.send(compact_in_place(journal, fold));
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        JournalCommand::Append { .. } => unreachable!(),
    }
}

fn compact_in_place<T: Serialize + DeserializeOwned>(
    journal: &mut Journal,
    fold: CompactFold<T>,
) -> io::Result<()> {
    let records: Vec<T> = Journal::replay(journal.path())?;
    let compacted = fold(records);
    Journal::write_compact_file(journal.path(), &compacted)?;
    journal.swap_compact_file()
}
