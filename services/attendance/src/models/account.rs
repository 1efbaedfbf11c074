//! Account model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Lecturer,
    Developer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Student => "student",
            Role::Lecturer => "lecturer",
            Role::Developer => "developer",
        };
        f.write_str(name)
    }
}

/// Stored account. `allowed_sections` holds `courseId-sectionId` keys; empty
/// means the account may check into any slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    #[serde(default)]
    pub allowed_sections: Vec<String>,
}
