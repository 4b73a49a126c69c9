use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SuccessResponse<'a> {
    Count {
        count: i64,
    },
    Healthz {
        name: &'a str,
        revision: Option<&'a str>,
        timestamp: Option<&'a str>,
        version: &'a str,
    },
    Upload {
        url: &'a str,
        pathname: &'a str,
        content_type: &'a str,
        size: u64,
    },
}
