//! Cloud-backed collaborators used only by the CLI.

pub mod s3;
