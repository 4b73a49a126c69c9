use futures::future::BoxFuture;

use crate::errors::BackendError;
use crate::recording::{Id, NewRecording, Recording};

pub mod memory;

/// The recording store: the single source of truth for recordings.
pub trait Db {
    /// Returns the number of recordings.
    fn count_all(&self) -> BoxFuture<Result<i64, BackendError>>;

    /// Deletes a recording, failing with `NonExistentId` if it isn't there.
    fn delete(&self, id: Id) -> BoxFuture<Result<(), BackendError>>;

    /// Stores a new recording and returns it with its assigned ID.
    fn insert(&self, recording: NewRecording) -> BoxFuture<Result<Recording, BackendError>>;

    /// Returns every recording, most recent first.
    fn list(&self) -> BoxFuture<Result<Vec<Recording>, BackendError>>;

    fn retrieve(&self, id: Id) -> BoxFuture<Result<Option<Recording>, BackendError>>;

    /// Replaces every field of a recording, failing with `NonExistentId`
    /// if it isn't there.
    fn update(&self, id: Id, recording: NewRecording)
        -> BoxFuture<Result<Recording, BackendError>>;
}

pub use self::postgres::*;

mod postgres {
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use sqlx::{
        self,
        postgres::{PgPool, PgRow},
    };
    use time::OffsetDateTime;
    use url::Url;

    use crate::errors::{BackendError, ValidationError};
    use crate::recording::{Id, NewRecording, Recording};

    const RECORDINGS_TITLE_CONSTRAINT: &str = "recordings_title_not_blank";
    const RECORDINGS_URL_CONSTRAINT: &str = "recordings_url_not_blank";

    pub struct PgDb {
        pool: PgPool,
    }

    impl PgDb {
        pub fn new(pool: PgPool) -> Self {
            PgDb { pool }
        }
    }

    // these can be simplified once async functions in traits are stabilized
    impl super::Db for PgDb {
        fn count_all(&self) -> BoxFuture<Result<i64, BackendError>> {
            async move {
                let query = sqlx::query_as::<_, (i64,)>(include_str!("queries/count.sql"));

                let (count,) = query.fetch_one(&self.pool).await.map_err(map_sqlx_error)?;

                Ok(count)
            }
            .boxed()
        }

        fn delete(&self, id: Id) -> BoxFuture<Result<(), BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/delete.sql"));

                let count = query
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                if count == 0 {
                    Err(BackendError::NonExistentId(id))
                } else {
                    Ok(())
                }
            }
            .boxed()
        }

        fn insert(&self, recording: NewRecording) -> BoxFuture<Result<Recording, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/create.sql"));

                let recording = query
                    .bind(&recording.title)
                    .bind(&recording.description)
                    .bind(&recording.date)
                    .bind(&recording.duration)
                    .bind(recording.url.as_str())
                    .try_map(|row: PgRow| recording_from_row(&row))
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(recording)
            }
            .boxed()
        }

        fn list(&self) -> BoxFuture<Result<Vec<Recording>, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/list.sql"));

                let recordings = query
                    .try_map(|row: PgRow| recording_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(recordings)
            }
            .boxed()
        }

        fn retrieve(&self, id: Id) -> BoxFuture<Result<Option<Recording>, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/retrieve.sql"));

                let recording = query
                    .bind(id)
                    .try_map(|row: PgRow| recording_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(recording)
            }
            .boxed()
        }

        fn update(
            &self,
            id: Id,
            recording: NewRecording,
        ) -> BoxFuture<Result<Recording, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/update.sql"));

                let recording = query
                    .bind(id)
                    .bind(&recording.title)
                    .bind(&recording.description)
                    .bind(&recording.date)
                    .bind(&recording.duration)
                    .bind(recording.url.as_str())
                    .try_map(|row: PgRow| recording_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                recording.ok_or(BackendError::NonExistentId(id))
            }
            .boxed()
        }
    }

    fn recording_from_row(row: &PgRow) -> Result<Recording, sqlx::Error> {
        use sqlx::Row;

        let url: String = row.try_get("url")?;
        let url = Url::parse(&url).map_err(|source| {
            // the insert path only accepts parsed URLs, so this means
            // someone edited the table by hand
            sqlx::Error::Decode(Box::new(ValidationError::InvalidUrl { url, source }))
        })?;

        let created_at: OffsetDateTime = row.try_get("created_at")?;

        Ok(Recording {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            date: row.try_get("date")?,
            duration: row.try_get("duration")?,
            url,
            created_at,
        })
    }

    fn map_sqlx_error(error: sqlx::Error) -> BackendError {
        use sqlx::Error;

        match error {
            Error::Database(ref e) if e.constraint() == Some(RECORDINGS_TITLE_CONSTRAINT) => {
                ValidationError::MissingTitle.into()
            }
            Error::Database(ref e) if e.constraint() == Some(RECORDINGS_URL_CONSTRAINT) => {
                ValidationError::MissingUrl.into()
            }
            _ => BackendError::Sqlx { source: error },
        }
    }
}
