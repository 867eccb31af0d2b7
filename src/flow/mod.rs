//! Entry points that create meetings and kick off processing.

pub mod meeting_ref;
pub mod video_upload;

pub use meeting_ref::{existing_import, parse_external_id, start_from_meeting_ref, MeetingRefStarted};
pub use video_upload::{read_duration, start_video_upload, UploadedVideo, VideoUploadStarted};
