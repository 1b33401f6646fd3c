use std::sync::Mutex;
use trestle::prelude::*;

/// Per-request audit trail. Registered as scoped, so every request starts
/// with an empty log that every service of that request shares.
#[derive(Injectable, Default)]
pub struct RequestLog {
    entries: Mutex<Vec<String>>,
}

impl RequestLog {
    pub fn record(&self, entry: impl Into<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.into());
        }
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}
