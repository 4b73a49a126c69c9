use std::sync::RwLock;

use futures::future::{ready, BoxFuture, FutureExt};
use time::OffsetDateTime;

use crate::db::Db;
use crate::errors::BackendError;
use crate::recording::{Id, NewRecording, Recording};

/// A recording store kept in memory, for tests and local runs. IDs are
/// assigned sequentially starting at 1.
#[derive(Default)]
pub struct MemoryDb {
    table: RwLock<Table>,
}

#[derive(Default)]
struct Table {
    last_id: Id,
    rows: Vec<Recording>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_table<T>(&self, f: impl FnOnce(&mut Table) -> T) -> T {
        f(&mut self.table.write().unwrap())
    }
}

impl Db for MemoryDb {
    fn count_all(&self) -> BoxFuture<Result<i64, BackendError>> {
        let count = self.with_table(|table| table.rows.len() as i64);

        ready(Ok(count)).boxed()
    }

    fn delete(&self, id: Id) -> BoxFuture<Result<(), BackendError>> {
        let result = self.with_table(|table| {
            let before = table.rows.len();
            table.rows.retain(|r| r.id != id);

            if table.rows.len() == before {
                Err(BackendError::NonExistentId(id))
            } else {
                Ok(())
            }
        });

        ready(result).boxed()
    }

    fn insert(&self, recording: NewRecording) -> BoxFuture<Result<Recording, BackendError>> {
        let recording = self.with_table(|table| {
            table.last_id += 1;

            let recording = Recording::new(table.last_id, recording, OffsetDateTime::now_utc());
            table.rows.push(recording.clone());

            recording
        });

        ready(Ok(recording)).boxed()
    }

    fn list(&self) -> BoxFuture<Result<Vec<Recording>, BackendError>> {
        let mut rows = self.with_table(|table| table.rows.clone());

        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        ready(Ok(rows)).boxed()
    }

    fn retrieve(&self, id: Id) -> BoxFuture<Result<Option<Recording>, BackendError>> {
        let recording = self.with_table(|table| table.rows.iter().find(|r| r.id == id).cloned());

        ready(Ok(recording)).boxed()
    }

    fn update(
        &self,
        id: Id,
        recording: NewRecording,
    ) -> BoxFuture<Result<Recording, BackendError>> {
        let result = self.with_table(|table| {
            let row = table
                .rows
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or(BackendError::NonExistentId(id))?;

            *row = Recording::new(id, recording, row.created_at);

            Ok(row.clone())
        });

        ready(result).boxed()
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;

    fn new_recording(title: &str) -> NewRecording {
        NewRecording {
            title: title.to_owned(),
            description: String::new(),
            date: "2020-10-19".to_owned(),
            duration: "5:24".to_owned(),
            url: Url::parse(&format!("https://blobs.example.com/{}.mp3", title)).unwrap(),
        }
    }

    #[tokio::test]
    async fn lists_most_recent_first() {
        let db = MemoryDb::new();

        for title in &["first", "second", "third"] {
            db.insert(new_recording(title)).await.expect("insert");
        }

        let titles = db
            .list()
            .await
            .expect("list")
            .into_iter()
            .map(|r| r.title)
            .collect::<Vec<_>>();

        assert_eq!(titles, vec!["third", "second", "first"]);
        assert_eq!(db.count_all().await.expect("count"), 3);
    }

    #[tokio::test]
    async fn missing_ids_are_errors() {
        let db = MemoryDb::new();

        assert!(matches!(
            db.delete(42).await,
            Err(BackendError::NonExistentId(42))
        ));
        assert!(matches!(
            db.update(42, new_recording("nowhere")).await,
            Err(BackendError::NonExistentId(42))
        ));
        assert!(db.retrieve(42).await.expect("retrieve").is_none());
    }
}
