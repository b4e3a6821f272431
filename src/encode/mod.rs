//! The shipped [`crate::media::backend::MediaBackend`]: system `ffprobe`/`ffmpeg` processes.

pub mod ffmpeg;
