//! Upload commands

pub mod submit;

pub use submit::{SubmitUploadCommand, SubmitUploadError, SubmitUploadResponse};
