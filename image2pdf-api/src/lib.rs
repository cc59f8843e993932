//! # image2pdf-api
//!
//! HTTP service for the image2pdf library: upload PNG and JPEG files to
//! `POST /convert/`, get one PDF back.
//!

mod api;
pub mod config;
pub mod storage;

pub use api::{
    app, convert_images, health_check, AppError, AppState, ConvertResponse, ErrorResponse,
    INTERNAL_ERROR_DETAIL, REQUEST_ID_HEADER,
};
pub use config::{ConfigError, ResponseMode, ServerConfig};
pub use storage::{spawn_retention_sweep, OutputStorage};
