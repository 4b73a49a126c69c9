use std::sync::Arc;

use log::Logger;

use crate::config::Limits;
use crate::db::Db;
use crate::store::Store;
use crate::urls::Urls;

/// Everything a route handler needs.
#[derive(Clone)]
pub struct Environment {
    pub logger: Arc<Logger>,
    pub db: Arc<dyn Db + Send + Sync>,
    pub urls: Arc<Urls>,
    pub store: Arc<dyn Store>,
    pub limits: Limits,
}

impl Environment {
    pub fn new(
        logger: Arc<Logger>,
        db: Arc<dyn Db + Send + Sync>,
        urls: Arc<Urls>,
        store: Arc<dyn Store>,
        limits: Limits,
    ) -> Self {
        Self {
            logger,
            db,
            urls,
            store,
            limits,
        }
    }
}
