//! Wall clock backed by the system time.

use dkm_common::crypto;
use std::time::{SystemTime, UNIX_EPOCH};

/// [`crypto::Clock`] implementation based on [`SystemTime`].
#[derive(Default)]
pub struct SystemClock;

impl crypto::Clock for SystemClock {
    fn now(&self) -> crypto::MillisecondsSinceEpoch {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        crypto::MillisecondsSinceEpoch(millis)
    }
}
