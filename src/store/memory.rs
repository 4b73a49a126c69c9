use std::collections::HashMap;
use std::sync::RwLock;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::TryStreamExt;
use url::Url;

use crate::errors::BackendError;
use crate::io::{chunked, Progress};
use crate::store::{key_relative_to, Store};

/// An object kept by [`MemoryStore`].
#[derive(Clone, Debug, PartialEq)]
pub struct StoredObject {
    pub content_type: String,
    pub data: Vec<u8>,
}

/// A store that keeps everything in a map, for tests and local runs.
pub struct MemoryStore {
    base_url: Url,
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl MemoryStore {
    /// Creates an empty store whose URLs live under `base_url`, which
    /// should end with a slash.
    pub fn new(base_url: Url) -> Self {
        MemoryStore {
            base_url,
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys = self
            .objects
            .read()
            .unwrap()
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Store for MemoryStore {
    fn delete(&self, url: &Url) -> BoxFuture<Result<(), BackendError>> {
        let url = url.clone();

        async move {
            let key = key_relative_to(&self.base_url, &url)
                .ok_or_else(|| BackendError::ForeignUrl(url.clone()))?;

            match self.objects.write().unwrap().remove(&key) {
                Some(_) => Ok(()),
                None => Err(BackendError::StoreRejected {
                    status: 404,
                    message: format!("no object at {}", url),
                }),
            }
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
            let url = self
                .base_url
                .join(&key)
                .map_err(|source| BackendError::FailedToGenerateUrl { source })?;

            let chunks: Vec<bytes::Bytes> = chunked(raw, progress.clone())
                .try_collect()
                .await
                .map_err(BackendError::upload_failed)?;

            let object = StoredObject {
                content_type,
                data: chunks.concat(),
            };

            self.objects.write().unwrap().insert(key, object);
            progress.finish();

            Ok(url)
        }
        .boxed()
    }
}
