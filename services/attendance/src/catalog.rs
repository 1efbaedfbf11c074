//! Static course/section catalog

use serde::Serialize;

use crate::models::SlotKey;

/// Seats per section
pub const SECTION_CAPACITY: usize = 50;

const SECTIONS_PER_COURSE: usize = 5;

const COURSE_NAMES: [&str; 10] = [
    "Digital Graphics Production",
    "Technical Operations in Libraries",
    "Information Systems Analysis and Design",
    "Databases and Information Security",
    "Digital Audio Software",
    "English for Specialized Purposes",
    "Digital Printing Technologies",
    "Micro-teaching",
    "History of Education",
    "Developmental Psychology",
];

#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Course {
    pub id: String,
    pub name: String,
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    courses: Vec<Course>,
}

impl Catalog {
    /// Courses `C1`..`C10`, each with sections `S1`..`S5`
    pub fn standard() -> Self {
        let courses = COURSE_NAMES
            .iter()
            .enumerate()
            .map(|(idx, name)| Course {
                id: format!("C{}", idx + 1),
                name: name.to_string(),
                sections: (1..=SECTIONS_PER_COURSE)
                    .map(|i| Section {
                        id: format!("S{i}"),
                        name: format!("Section {i}"),
                    })
                    .collect(),
            })
            .collect();

        Self { courses }
    }

    pub fn courses(&self) -> &[Course] {
        &self.courses
    }

    pub fn contains(&self, slot: &SlotKey) -> bool {
        self.courses
            .iter()
            .find(|c| c.id == slot.course_id)
            .is_some_and(|c| c.sections.iter().any(|s| s.id == slot.section_id))
    }
}
