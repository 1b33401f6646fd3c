use dashmap::DashMap;
use trestle::prelude::*;

/// In-memory table store. Key: `table:id`.
#[derive(Injectable, Default)]
pub struct Database {
    storage: DashMap<String, String>,
}

impl Database {
    pub fn insert(&self, table: &str, id: &str, data: String) {
        self.storage.insert(format!("{}:{}", table, id), data);
    }

    pub fn get(&self, table: &str, id: &str) -> Option<String> {
        self.storage
            .get(&format!("{}:{}", table, id))
            .map(|entry| entry.value().clone())
    }

    pub fn scan(&self, table: &str) -> Vec<String> {
        let prefix = format!("{}:", table);
        self.storage
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .map(|entry| entry.value().clone())
            .collect()
    }
}
