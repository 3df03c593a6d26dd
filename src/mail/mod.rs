//! Building and sending the release emails.

pub mod attachments;
pub mod notes;
pub mod sender;

use crate::config::Settings;
use crate::mail::attachments::AttachmentArea;
use crate::mail::notes::ReleaseNotes;

/// What sending an email needs besides the request itself.
#[derive(Clone, Copy)]
pub struct Resources<'a> {
    pub settings: &'a Settings,
    pub area: &'a AttachmentArea,
    pub notes: &'a dyn ReleaseNotes,
}
