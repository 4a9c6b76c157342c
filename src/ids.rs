//! Default id generation.
use crate::config::IdStrategy;
use chrono::Utc;
use std::sync::atomic::{AtomicU32, Ordering};
use uuid::Uuid;

static COUNTER: AtomicU32 = AtomicU32::new(0);

const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn base36(mut n: u128, width: usize) -> String {
    let mut out = vec![b'0'; width];
    for slot in out.iter_mut().rev() {
        *slot = ALPHABET[(n % 36) as usize];
        n /= 36;
    }
    // ALPHABET is ASCII
    out.into_iter().map(char::from).collect()
}

/// A collision-resistant, roughly time-ordered id: `c`, 8 chars of
/// millisecond timestamp, 4 of a process-wide counter and 12 random.
pub fn cuid() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u128;
    let count = COUNTER.fetch_add(1, Ordering::Relaxed) as u128;
    let random = u128::from_be_bytes(*Uuid::new_v4().as_bytes());
    format!(
        "c{}{}{}",
        base36(millis, 8),
        base36(count, 4),
        base36(random, 12)
    )
}

pub fn generate(strategy: IdStrategy) -> String {
    match strategy {
        IdStrategy::Cuid => cuid(),
        IdStrategy::Uuid => Uuid::new_v4().to_string(),
    }
}
