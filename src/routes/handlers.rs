use std::time::{Duration, Instant};

use log::{debug, o, warn};
use warp::{
    filters::multipart::FormData,
    http::StatusCode,
    reject,
    reply::{json, with_header, with_status, Reply},
};

use crate::environment::Environment;
use crate::errors::{BackendError, ValidationError};
use crate::io::{parse_upload, Progress};
use crate::mime_type::check_audio_type;
use crate::normalization::sanitize_blob_key;
use crate::recording::{Id, RecordingDraft};
use crate::routes::{
    query::BlobQuery,
    rejection::{Context, Rejection},
    response::SuccessResponse,
};

const SERVER_TIMING_HEADER: &str = "server-timing";
type RouteResult = Result<Box<dyn Reply>, reject::Rejection>;

macro_rules! timed {
    ($($expression:stmt);+) => {
        let start = Instant::now();

        let result = { $($expression)+ };

        Ok(Box::new(with_header(
            result,
            SERVER_TIMING_HEADER,
            format_server_timing(start.elapsed()),
        )) as Box<dyn Reply>)
    };
}

pub async fn list(environment: Environment) -> RouteResult {
    timed! {
        let recordings = environment
            .db
            .list()
            .await
            .map_err(|e: BackendError| Rejection::new(Context::list(), e))?;

        json(&recordings)
    }
}

pub async fn count(environment: Environment) -> RouteResult {
    timed! {
        let count = environment
            .db
            .count_all()
            .await
            .map_err(|e: BackendError| Rejection::new(Context::count(), e))?;

        json(&SuccessResponse::Count { count })
    }
}

pub async fn create(environment: Environment, draft: RecordingDraft) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::create(), e);

        let recording = draft.validate().map_err(BackendError::from).map_err(error_handler)?;

        debug!(environment.logger, "Creating recording..."; "title" => &recording.title);
        let created = environment.db.insert(recording).await.map_err(error_handler)?;

        with_header(
            with_status(json(&created), StatusCode::CREATED),
            "location",
            environment.urls.recording(created.id).as_str(),
        )
    }
}

pub async fn retrieve(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::retrieve(id.clone()), e);

        let id = parse_id(&id).map_err(error_handler)?;
        debug!(environment.logger, "Retrieving recording..."; "id" => id);

        let recording = environment
            .db
            .retrieve(id)
            .await
            .and_then(|option| option.ok_or(BackendError::NonExistentId(id)))
            .map_err(error_handler)?;

        json(&recording)
    }
}

pub async fn update(environment: Environment, id: String, draft: RecordingDraft) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::update(id.clone()), e);

        let id = parse_id(&id).map_err(error_handler)?;
        let recording = draft.validate().map_err(BackendError::from).map_err(error_handler)?;

        debug!(environment.logger, "Updating recording..."; "id" => id);
        let updated = environment.db.update(id, recording).await.map_err(error_handler)?;

        json(&updated)
    }
}

pub async fn delete(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::delete(id.clone()), e);

        let id = parse_id(&id).map_err(error_handler)?;
        let logger = environment.logger.new(o!("id" => id));

        let recording = environment
            .db
            .retrieve(id)
            .await
            .and_then(|option| option.ok_or(BackendError::NonExistentId(id)))
            .map_err(error_handler)?;

        debug!(logger, "Deleting recording...");
        environment.db.delete(id).await.map_err(error_handler)?;

        // the row is gone either way; a blob we can't delete is only logged
        match environment.store.delete(&recording.url).await {
            Ok(()) => debug!(logger, "Deleted blob"; "url" => %recording.url),
            Err(BackendError::ForeignUrl(url)) => {
                debug!(logger, "Blob is not in the store"; "url" => %url)
            }
            Err(e) => warn!(logger, "Failed to delete blob"; "url" => %recording.url, "error" => %e),
        };

        StatusCode::NO_CONTENT
    }
}

pub async fn upload(environment: Environment, content: FormData) -> RouteResult {
    timed! {
        let Environment {
            logger,
            store,
            limits,
            ..
        } = environment.clone();

        debug!(logger, "Parsing submission...");
        let file = parse_upload(content)
            .await
            .map_err(|e| Rejection::new(Context::upload(None), e))?;

        let name = file.name.clone();
        let error_handler = |e: BackendError| Rejection::new(Context::upload(Some(name.clone())), e);

        let content_type = file.content_type.clone().unwrap_or_default();
        let mime_type = check_audio_type(&content_type)
            .map_err(BackendError::from)
            .map_err(error_handler)?;

        let size = file.data.len() as u64;
        if size > limits.max_upload_size {
            return Err(Rejection::new(
                Context::upload_over_limit(name.clone(), limits.max_upload_size),
                ValidationError::TooLarge {
                    size,
                    limit: limits.max_upload_size,
                }
                .into(),
            )
            .into());
        };

        let key = sanitize_blob_key(&file.name);
        if key.is_empty() {
            return Err(error_handler(ValidationError::MissingFileName.into()).into());
        };

        let logger = logger.new(o!("key" => key.clone()));
        let content_type = mime_type.essence_str().to_owned();

        debug!(logger, "Saving blob..."; "size" => size);
        let url = store
            .save(&key, &content_type, file.data, Progress::none())
            .await
            .map_err(error_handler)?;

        let response = SuccessResponse::Upload {
            url: url.as_str(),
            pathname: &key,
            content_type: &content_type,
            size,
        };

        with_header(
            with_status(json(&response), StatusCode::CREATED),
            "location",
            url.as_str(),
        )
    }
}

pub async fn delete_blob(environment: Environment, query: BlobQuery) -> RouteResult {
    timed! {
        let BlobQuery { url } = query;

        debug!(environment.logger, "Deleting blob..."; "url" => %url);
        environment
            .store
            .delete(&url)
            .await
            .map_err(|e| Rejection::new(Context::delete_blob(url.to_string()), e))?;

        StatusCode::NO_CONTENT
    }
}

fn parse_id(id: &str) -> Result<Id, BackendError> {
    id.parse::<Id>()
        .map_err(|_| BackendError::InvalidId(id.to_owned()))
}

fn format_server_timing(seconds: Duration) -> String {
    format!("handler;dur={}", seconds.as_secs_f64() * 1000.0)
}
