use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::db::Db;
use crate::errors::{BackendError, ValidationError};
use crate::io::{chunked, Progress, FILE_FIELD};
use crate::recording::{Id, NewRecording, Recording};
use crate::store::Store;
use crate::urls::Urls;

#[derive(Deserialize)]
struct CountResponse {
    count: i64,
}

#[derive(Deserialize)]
struct UploadResponse {
    url: Url,
}

#[derive(Default, Deserialize)]
struct ErrorResponse {
    message: String,
    #[serde(default)]
    limit: Option<u64>,
}

/// The recording store, reached through the server's HTTP API.
#[derive(Clone)]
pub struct RemoteDb {
    client: Client,
    urls: Arc<Urls>,
}

impl RemoteDb {
    pub fn new(client: Client, urls: Arc<Urls>) -> Self {
        RemoteDb { client, urls }
    }
}

impl Db for RemoteDb {
    fn count_all(&self) -> BoxFuture<Result<i64, BackendError>> {
        async move {
            let response = self.client.get(self.urls.count()).send().await?;
            let CountResponse { count } = check(response).await?.json().await?;

            Ok(count)
        }
        .boxed()
    }

    fn delete(&self, id: Id) -> BoxFuture<Result<(), BackendError>> {
        async move {
            let response = self.client.delete(self.urls.recording(id)).send().await?;

            if response.status() == StatusCode::NOT_FOUND {
                return Err(BackendError::NonExistentId(id));
            }

            check(response).await?;

            Ok(())
        }
        .boxed()
    }

    fn insert(&self, recording: NewRecording) -> BoxFuture<Result<Recording, BackendError>> {
        async move {
            let response = self
                .client
                .post(self.urls.recordings())
                .json(&recording)
                .send()
                .await?;

            Ok(check(response).await?.json().await?)
        }
        .boxed()
    }

    fn list(&self) -> BoxFuture<Result<Vec<Recording>, BackendError>> {
        async move {
            let response = self.client.get(self.urls.recordings()).send().await?;

            Ok(check(response).await?.json().await?)
        }
        .boxed()
    }

    fn retrieve(&self, id: Id) -> BoxFuture<Result<Option<Recording>, BackendError>> {
        async move {
            let response = self.client.get(self.urls.recording(id)).send().await?;

            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }

            Ok(Some(check(response).await?.json().await?))
        }
        .boxed()
    }

    fn update(
        &self,
        id: Id,
        recording: NewRecording,
    ) -> BoxFuture<Result<Recording, BackendError>> {
        async move {
            let response = self
                .client
                .put(self.urls.recording(id))
                .json(&recording)
                .send()
                .await?;

            if response.status() == StatusCode::NOT_FOUND {
                return Err(BackendError::NonExistentId(id));
            }

            Ok(check(response).await?.json().await?)
        }
        .boxed()
    }
}

/// The blob store, reached through the server's upload endpoint.
#[derive(Clone)]
pub struct RemoteStore {
    client: Client,
    urls: Arc<Urls>,
}

impl RemoteStore {
    pub fn new(client: Client, urls: Arc<Urls>) -> Self {
        RemoteStore { client, urls }
    }
}

impl Store for RemoteStore {
    fn delete(&self, url: &Url) -> BoxFuture<Result<(), BackendError>> {
        let url = url.clone();

        async move {
            let response = self
                .client
                .delete(self.urls.upload())
                .query(&[("url", url.as_str())])
                .send()
                .await?;

            check(response).await?;

            Ok(())
        }
        .boxed()
    }

    fn save(
        &self,
        key: &str,
        content_type: &str,
        raw: Vec<u8>,
        progress: Progress,
    ) -> BoxFuture<Result<Url, BackendError>> {
        let key = key.to_owned();
        let content_type = content_type.to_owned();

        async move {
            let len = raw.len() as u64;
            let body = Body::wrap_stream(chunked(raw, progress.clone()));

            let part = Part::stream_with_length(body, len)
                .file_name(key)
                .mime_str(&content_type)
                .map_err(BackendError::upload_failed)?;
            let form = Form::new().part(FILE_FIELD, part);

            let response = self
                .client
                .post(self.urls.upload())
                .multipart(form)
                .send()
                .await
                .map_err(BackendError::upload_failed)?;

            if !response.status().is_success() {
                return Err(rejected_upload(response, len, &content_type).await);
            }

            let UploadResponse { url } = response
                .json()
                .await
                .map_err(BackendError::upload_failed)?;

            progress.finish();

            Ok(url)
        }
        .boxed()
    }
}

/// Turns non-success responses into `StoreRejected`, keeping the server's
/// message when it sent one.
async fn check(response: Response) -> Result<Response, BackendError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let (status, ErrorResponse { message, .. }) = read_error(response).await;

    Err(BackendError::StoreRejected {
        status: status.as_u16(),
        message,
    })
}

/// Maps a refused upload back onto the validation error the server found,
/// or a transfer failure for anything else.
async fn rejected_upload(response: Response, size: u64, content_type: &str) -> BackendError {
    let (status, ErrorResponse { message, limit }) = read_error(response).await;

    match status {
        StatusCode::PAYLOAD_TOO_LARGE => ValidationError::TooLarge {
            size,
            limit: limit.unwrap_or_default(),
        }
        .into(),
        StatusCode::UNSUPPORTED_MEDIA_TYPE => ValidationError::InvalidType {
            mime_type: content_type.to_owned(),
        }
        .into(),
        _ => BackendError::upload_failed(BackendError::StoreRejected {
            status: status.as_u16(),
            message,
        }),
    }
}

async fn read_error(response: Response) -> (StatusCode, ErrorResponse) {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let error = serde_json::from_str::<ErrorResponse>(&body).unwrap_or(ErrorResponse {
        message: body,
        ..Default::default()
    });

    (status, error)
}
