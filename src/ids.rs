use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic id source for submissions.
///
/// Issues ids of the form `sub-<base36>`. The counter is a process-scoped
/// `AtomicU64`, so ids are strictly increasing and never reused within a
/// process; the base36 text simply grows with the integer, so there is no
/// overflow horizon to care about.
#[derive(Debug, Default)]
pub struct AtomicCounter {
    next: AtomicU64,
}

impl AtomicCounter {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(0) }
    }

    /// Returns the next raw counter value.
    pub fn next_value(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the next submission id, e.g. `sub-0`, `sub-a`, `sub-2s`.
    pub fn next_id(&self) -> String {
        format!("sub-{}", to_base36(self.next_value()))
    }
}

pub(crate) fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}

/// A lexicographically sortable id: fixed-width hex millisecond timestamp,
/// a per-generator sequence, and a random suffix.
///
/// Within a single generator and a single millisecond, the sequence field
/// keeps generation order and lexicographic order aligned.
#[derive(Debug)]
pub struct SortableIdGen {
    seq: AtomicU64,
}

/// Decoded form of a sortable id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortableIdParts {
    pub timestamp_ms: i64,
    pub sequence:     u16,
    pub random:       String,
}

impl SortableIdGen {
    pub fn new() -> Self {
        Self { seq: AtomicU64::new(0) }
    }

    /// Generate the next id: `tttttttttttt` (12 hex chars of epoch ms) +
    /// `ssss` (4 hex chars of sequence) + `rrrrrrrr` (8 hex chars random).
    pub fn generate(&self) -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        let seq = (self.seq.fetch_add(1, Ordering::Relaxed) & 0xffff) as u16;
        let rand_bytes = uuid::Uuid::new_v4().into_bytes();
        format!(
            "{:012x}{:04x}{:02x}{:02x}{:02x}{:02x}",
            millis, seq, rand_bytes[0], rand_bytes[1], rand_bytes[2], rand_bytes[3]
        )
    }

    /// Decode an id produced by [`SortableIdGen::generate`].
    pub fn parse(id: &str) -> Option<SortableIdParts> {
        if id.len() != 24 {
            return None;
        }
        let timestamp_ms = i64::from_str_radix(&id[..12], 16).ok()?;
        let sequence = u16::from_str_radix(&id[12..16], 16).ok()?;
        Some(SortableIdParts {
            timestamp_ms,
            sequence,
            random: id[16..].to_string(),
        })
    }
}

impl Default for SortableIdGen {
    fn default() -> Self { Self::new() }
}
