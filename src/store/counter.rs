use std::collections::HashMap;
use std::path::PathBuf;

use super::JsonStore;
use crate::error::StoreError;

/// Deal numbers continue from this value when `deals.json` is absent.
pub const DEAL_COUNTER_START: u64 = 1041;

/// A persisted, strictly increasing number stored as `{"<field>": n}`.
pub struct Counter {
    store: JsonStore<HashMap<String, u64>>,
    field: &'static str,
    start: u64,
}

impl Counter {
    pub async fn open(path: impl Into<PathBuf>, field: &'static str, start: u64) -> Self {
        Self {
            store: JsonStore::open(path).await,
            field,
            start,
        }
    }

    /// `deals.json` / `deal_number`, starting after 1041.
    pub async fn deals(path: impl Into<PathBuf>) -> Self {
        Self::open(path, "deal_number", DEAL_COUNTER_START).await
    }

    /// `punishment_cases.json` / `case_number`, starting after 0.
    pub async fn cases(path: impl Into<PathBuf>) -> Self {
        Self::open(path, "case_number", 0).await
    }

    #[cfg(test)]
    pub async fn current(&self) -> u64 {
        self.store
            .read(|doc| doc.get(self.field).copied().unwrap_or(self.start))
            .await
    }

    pub async fn next(&self) -> Result<u64, StoreError> {
        let field = self.field;
        let start = self.start;
        self.store
            .update(|doc| {
                let next = doc.get(field).copied().unwrap_or(start) + 1;
                doc.insert(field.to_string(), next);
                Ok(next)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn deal_numbers_start_after_1041() {
        let dir = tempfile::tempdir().unwrap();
        let counter = Counter::deals(dir.path().join("deals.json")).await;

        let issued: Vec<u64> = {
            let mut out = Vec::new();
            for _ in 0..5 {
                out.push(counter.next().await.unwrap());
            }
            out
        };
        assert_eq!(issued, vec![1042, 1043, 1044, 1045, 1046]);
        assert_eq!(counter.current().await, 1046);
    }

    #[tokio::test]
    async fn resumes_from_persisted_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deals.json");
        std::fs::write(&path, br#"{"deal_number": 2000}"#).unwrap();

        let counter = Counter::deals(&path).await;
        assert_eq!(counter.next().await.unwrap(), 2001);

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["deal_number"], 2001);
    }

    #[tokio::test]
    async fn case_numbers_start_at_one() {
        let dir = tempfile::tempdir().unwrap();
        let counter = Counter::cases(dir.path().join("punishment_cases.json")).await;
        assert_eq!(counter.next().await.unwrap(), 1);
        assert_eq!(counter.next().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn concurrent_allocations_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let counter = Arc::new(Counter::deals(dir.path().join("deals.json")).await);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move { counter.next().await.unwrap() }));
        }

        let mut issued = Vec::new();
        for handle in handles {
            issued.push(handle.await.unwrap());
        }
        issued.sort_unstable();
        assert_eq!(issued, (1042..1062).collect::<Vec<_>>());
    }
}
