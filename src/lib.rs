pub mod audio;
pub mod client;
pub mod config;
pub mod db;
pub mod environment;
pub mod errors;
pub mod io;
pub mod mime_type;
pub mod normalization;
pub mod recording;
pub mod routes;
pub mod store;
pub mod urls;
