//! User-facing notification port

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub count: usize,
}

impl Notification {
    /// Summary shown after a monitor run found new round-ups
    pub fn round_ups_found(count: usize) -> Self {
        let noun = if count == 1 { "round-up" } else { "round-ups" };
        Self {
            title: "Round-ups detected".to_string(),
            message: format!("Found {} new {} ready to invest", count, noun),
            count,
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}
