//! Slot coordinates

use serde::{Deserialize, Serialize};
use std::fmt;

/// The `(courseId, sectionId)` coordinate a lecture session lives at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotKey {
    pub course_id: String,
    pub section_id: String,
}

impl SlotKey {
    pub fn new(course_id: impl Into<String>, section_id: impl Into<String>) -> Self {
        Self {
            course_id: course_id.into(),
            section_id: section_id.into(),
        }
    }
}

/// Renders as `courseId-sectionId`, the form used by store keys and allow-lists.
impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.course_id, self.section_id)
    }
}
