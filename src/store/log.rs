//! Bounded, sequence-numbered history buffers.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// Records that carry a log-assigned sequence number.
pub trait Sequenced {
    fn sequence(&self) -> u64;
    fn assign_sequence(&mut self, seq: u64);
}

struct LogInner<T> {
    entries: VecDeque<T>,
    /// All-time append count. Never decreases, even across `clear`.
    counter: u64,
}

/// Circular buffer whose entries receive strictly increasing sequence numbers.
///
/// The counter lives behind the same lock as the entries so the order numbers
/// are handed out is the order readers observe.
pub struct SequenceLog<T> {
    capacity: usize,
    inner: Mutex<LogInner<T>>,
}

impl<T: Sequenced + Clone> SequenceLog<T> {
    /// Create a log holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(LogInner {
                entries: VecDeque::with_capacity(capacity.min(1024)),
                counter: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Assign the next sequence number to `record` and push it, evicting the
    /// oldest entry when over capacity. Returns the assigned number.
    pub fn append(&self, mut record: T) -> u64 {
        let mut inner = self.inner.lock();
        inner.counter += 1;
        let seq = inner.counter;
        record.assign_sequence(seq);
        inner.entries.push_back(record);
        if inner.entries.len() > self.capacity {
            inner.entries.pop_front();
        }
        seq
    }

    /// Append every record in order under one lock acquisition.
    pub fn extend<I: IntoIterator<Item = T>>(&self, records: I) -> usize {
        let mut inner = self.inner.lock();
        let mut appended = 0;
        for mut record in records {
            inner.counter += 1;
            let seq = inner.counter;
            record.assign_sequence(seq);
            inner.entries.push_back(record);
            if inner.entries.len() > self.capacity {
                inner.entries.pop_front();
            }
            appended += 1;
        }
        appended
    }

    /// The last `min(n, len)` entries in chronological order.
    pub fn get_recent(&self, n: usize) -> Vec<T> {
        let inner = self.inner.lock();
        let skip = inner.entries.len().saturating_sub(n);
        inner.entries.iter().skip(skip).cloned().collect()
    }

    pub fn get_all(&self) -> Vec<T> {
        self.inner.lock().entries.iter().cloned().collect()
    }

    /// Entries whose sequence number is strictly greater than `mark`.
    pub fn since(&self, mark: u64) -> Vec<T> {
        let inner = self.inner.lock();
        // Entries are sorted by sequence, so everything after the first
        // newer entry is newer too.
        let start = inner.entries.partition_point(|e| e.sequence() <= mark);
        inner.entries.iter().skip(start).cloned().collect()
    }

    /// All entries and the counter, read under one lock so the pair is
    /// consistent.
    pub fn snapshot(&self) -> (Vec<T>, u64) {
        let inner = self.inner.lock();
        (inner.entries.iter().cloned().collect(), inner.counter)
    }

    /// Like [`since`](Self::since), also returning the counter at read time.
    pub fn since_with_max(&self, mark: u64) -> (Vec<T>, u64) {
        let inner = self.inner.lock();
        let start = inner.entries.partition_point(|e| e.sequence() <= mark);
        (
            inner.entries.iter().skip(start).cloned().collect(),
            inner.counter,
        )
    }

    /// Drop all entries. The counter keeps its value.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    /// Highest sequence number ever assigned (the all-time append count).
    pub fn max_id(&self) -> u64 {
        self.inner.lock().counter
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

impl<T> std::fmt::Debug for SequenceLog<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SequenceLog")
            .field("capacity", &self.capacity)
            .field("len", &inner.entries.len())
            .field("counter", &inner.counter)
            .finish()
    }
}
