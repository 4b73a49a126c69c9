use std::sync::Arc;

use log::{error, Logger};
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, with_status, Json, WithStatus};

use crate::errors::{BackendError, ValidationError};

pub mod admin;
mod handlers;
mod query;
mod rejection;
mod response;

pub use internal::*;

/// The maximum form data size to accept. This should be enforced by
/// the HTTP gateway, so on the Rust side it’s set to an unreasonably
/// large number; the upload handler applies the real limit.
const MAX_CONTENT_LENGTH: u64 = 2 * 1024 * 1024 * 1024;

pub async fn format_rejection(
    logger: Arc<Logger>,
    rej: reject::Rejection,
) -> Result<WithStatus<Json>, reject::Rejection> {
    if let Some(r) = rej.find::<rejection::Rejection>() {
        let e = &r.error;
        error!(logger, "Backend error"; "context" => ?r.context, "error" => ?r.error, "status" => %status_code_for(e), "message" => %r.error);
        let flattened = r.flatten();

        return Ok(with_status(json(&flattened), status_code_for(e)));
    }

    Err(rej)
}

fn status_code_for(e: &BackendError) -> StatusCode {
    use BackendError::*;

    match e {
        Validation(ValidationError::InvalidType { .. }) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        Validation(ValidationError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
        Validation(_)
        | InvalidId(_)
        | ForeignUrl(_)
        | PartsMissing
        | MalformedFormSubmission => StatusCode::BAD_REQUEST,
        NonExistentId(_) => StatusCode::NOT_FOUND,
        StoreRejected { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        UploadFailed { .. } | DeleteFailed { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

mod internal {
    use warp::filters::multipart::form;
    use warp::filters::BoxedFilter;
    use warp::path::end;
    use warp::Filter;
    use warp::Reply;
    use warp::{body::json as body, delete, get as g, path as p, path::param as par, post, put, query};

    use super::{handlers, query as q, MAX_CONTENT_LENGTH};
    use crate::environment::Environment;
    use crate::recording::RecordingDraft;

    type Route = BoxedFilter<(Box<dyn Reply>,)>;

    macro_rules! route_filter {
    ($route_variable:ident; $first:expr) => (let $route_variable = $route_variable.and($first););
    ($route_variable:ident; $first:expr, $($rest:expr),+) => (
        let $route_variable = $route_variable.and($first);
        route_filter!($route_variable; $($rest),+);
    )
}

    macro_rules! route {
    ($name:ident => $handler:ident, $prefix:ident, $route_variable:ident; $($filters:expr),+) => (
        pub fn $name(environment: Environment) -> Route {
            let r = environment.urls.$prefix.clone();

            let $route_variable = warp::any()
                .map(move || environment.clone())
                .and(p(r));

            route_filter!($route_variable; $($filters),+);

            $route_variable.and_then(handlers::$handler)
                .boxed()
        }
    );
}

    route!(make_list_route => list, recordings_path, rt; end(), g());
    route!(make_create_route => create, recordings_path, rt; end(), post(), body::<RecordingDraft>());
    route!(make_count_route => count, recordings_path, rt; p("count"), end(), g());
    route!(make_retrieve_route => retrieve, recordings_path, rt; par::<String>(), end(), g());
    route!(make_update_route => update, recordings_path, rt; par::<String>(), end(), put(), body::<RecordingDraft>());
    route!(make_delete_route => delete, recordings_path, rt; par::<String>(), end(), delete());
    route!(make_upload_route => upload, upload_path, rt; end(), post(), form().max_length(MAX_CONTENT_LENGTH));
    route!(make_delete_blob_route => delete_blob, upload_path, rt; end(), delete(), query::<q::BlobQuery>());

    /// Every public route, combined.
    pub fn make_routes(environment: Environment) -> Route {
        make_count_route(environment.clone())
            .or(make_list_route(environment.clone()))
            .unify()
            .or(make_create_route(environment.clone()))
            .unify()
            .or(make_retrieve_route(environment.clone()))
            .unify()
            .or(make_update_route(environment.clone()))
            .unify()
            .or(make_delete_route(environment.clone()))
            .unify()
            .or(make_upload_route(environment.clone()))
            .unify()
            .or(make_delete_blob_route(environment))
            .unify()
            .boxed()
    }
}
