use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use rusoto_s3::{DeleteObjectRequest, PutObjectRequest, S3Client, StreamingBody, S3};
use url::{ParseError, Url};

use crate::errors::BackendError;
use crate::io::{chunked, Progress};

pub mod memory;

/// Somewhere to keep audio bytes that hands back a public URL for them.
pub trait Store: Send + Sync {
    /// Deletes the object behind the given URL.
    fn delete(&self, url: &Url) -> BoxFuture<Result<(), BackendError>>;

    /// Saves the given data under the given key and returns its public URL.
    fn save(
        &self,
        key: &str,
        content_type: &str,
        raw: Vec<u8>,
        progress: Progress,
    ) -> BoxFuture<Result<Url, BackendError>>;
}

/// Returns the key of `url` relative to `base`, if `url` lives under it.
pub(crate) fn key_relative_to(base: &Url, url: &Url) -> Option<String> {
    let base = base.as_str();
    let url = url.as_str();

    if url.starts_with(base) && url.len() > base.len() {
        Some(url[base.len()..].to_owned())
    } else {
        None
    }
}

/// A store that saves its data to S3.
pub struct S3Store {
    client: Arc<S3Client>,
    acl: String,
    bucket: String,
    cache_control: String,
    base_url: Url,
}

impl S3Store {
    /// Creates a new instance. `base_url` is the public location of the
    /// bucket, including a trailing slash.
    pub fn new(
        client: Arc<S3Client>,
        acl: String,
        bucket: String,
        cache_control: String,
        base_url: Url,
    ) -> Self {
        Self {
            client,
            acl,
            bucket,
            cache_control,
            base_url,
        }
    }

    pub fn from_env() -> Result<Self, rusoto_core::request::TlsError> {
        use rusoto_core::request::HttpClient;
        use rusoto_core::Region;
        use rusoto_credential::StaticProvider;

        use crate::config::get_variable;

        let access_key = get_variable("S3_ACCESS_KEY");
        let secret_access_key = get_variable("S3_SECRET_ACCESS_KEY");

        let region = Region::Custom {
            name: get_variable("S3_REGION_NAME"),
            endpoint: get_variable("S3_ENDPOINT"),
        };

        let bucket = get_variable("S3_BUCKET_NAME");
        let acl = get_variable("RADIO_S3_ACL");
        let cache_control = get_variable("RADIO_S3_CACHE_CONTROL");

        let client = Arc::new(S3Client::new_with(
            HttpClient::new()?,
            StaticProvider::new_minimal(access_key, secret_access_key),
            region,
        ));

        let base_url = Url::parse(&get_variable("S3_BASE_URL")).expect("parse S3_BASE_URL");

        Ok(S3Store::new(client, acl, bucket, cache_control, base_url))
    }

    fn get_url(&self, key: &str) -> Result<Url, ParseError> {
        self.base_url.join(key)
    }
}

impl Store for S3Store {
    fn delete(&self, url: &Url) -> BoxFuture<Result<(), BackendError>> {
        let url = url.clone();

        async move {
            let key = key_relative_to(&self.base_url, &url).ok_or(BackendError::ForeignUrl(url))?;

            delete(self, key).await
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
        upload(self, key.to_owned(), content_type.to_owned(), raw, progress).boxed()
    }
}

async fn delete(store: &S3Store, key: String) -> Result<(), BackendError> {
    let request = DeleteObjectRequest {
        bucket: store.bucket.clone(),
        key,
        ..Default::default()
    };

    let result = store.client.delete_object(request).await;

    result
        .map(|_| ())
        .map_err(|source| BackendError::DeleteFailed { source })
}

async fn upload(
    store: &S3Store,
    key: String,
    content_type: String,
    raw: Vec<u8>,
    progress: Progress,
) -> Result<Url, BackendError> {
    use std::convert::TryFrom;

    let url = store
        .get_url(&key)
        .map_err(|source| BackendError::FailedToGenerateUrl { source })?;

    let len = raw.len();
    let content_length = i64::try_from(len).map_err(BackendError::upload_failed)?;
    let body = StreamingBody::new_with_size(chunked(raw, progress.clone()), len);

    let request = PutObjectRequest {
        acl: Some(store.acl.clone()),
        body: Some(body),
        bucket: store.bucket.clone(),
        cache_control: Some(store.cache_control.clone()),
        content_length: Some(content_length),
        content_type: Some(content_type),
        key,
        ..Default::default()
    };

    store
        .client
        .put_object(request)
        .await
        .map_err(BackendError::upload_failed)?;

    progress.finish();

    Ok(url)
}
