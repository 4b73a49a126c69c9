use serde::Serialize;
use warp::reject;

use crate::errors::BackendError;

#[derive(Debug)]
pub struct Rejection {
    pub(crate) context: Context,
    pub(crate) error: BackendError,
}

impl Rejection {
    pub fn new(context: Context, error: BackendError) -> Self {
        Rejection { context, error }
    }

    pub fn flatten(&self) -> FlattenedRejection {
        FlattenedRejection {
            context: self.context.clone(),
            message: format!("{}", self.error),
        }
    }
}

impl reject::Reject for Rejection {}

#[derive(Debug, Serialize)]
pub struct FlattenedRejection {
    #[serde(flatten)]
    pub(crate) context: Context,
    pub(crate) message: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Context {
    Count,
    Create,
    Delete { id: String },
    DeleteBlob { url: String },
    List,
    Retrieve { id: String },
    Update { id: String },
    Upload {
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<u64>,
    },
}

impl Context {
    pub fn count() -> Context {
        Context::Count
    }

    pub fn create() -> Context {
        Context::Create
    }

    pub fn delete(id: String) -> Context {
        Context::Delete { id }
    }

    pub fn delete_blob(url: String) -> Context {
        Context::DeleteBlob { url }
    }

    pub fn list() -> Context {
        Context::List
    }

    pub fn retrieve(id: String) -> Context {
        Context::Retrieve { id }
    }

    pub fn update(id: String) -> Context {
        Context::Update { id }
    }

    pub fn upload(name: Option<String>) -> Context {
        Context::Upload { name, limit: None }
    }

    /// An upload turned away for its size, carrying the limit it broke.
    pub fn upload_over_limit(name: String, limit: u64) -> Context {
        Context::Upload {
            name: Some(name),
            limit: Some(limit),
        }
    }
}
