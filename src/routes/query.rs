use serde::Deserialize;
use url::Url;

#[derive(Debug, Deserialize)]
pub struct BlobQuery {
    pub url: Url,
}
