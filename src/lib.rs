//! Document intake: validate user-selected files and forward each one to a
//! workflow endpoint as a multipart POST, tracking per-file status.

pub mod commands;
pub mod config;
pub mod errors;
pub mod source;
pub mod uploader;
pub mod validation;
