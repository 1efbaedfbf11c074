//! Authorization policy

use crate::models::{Account, Role, SlotKey};

/// Whether the account may check itself into `slot`. An empty allow-list
/// permits every slot.
pub fn is_allowed(account: &Account, slot: &SlotKey) -> bool {
    account.allowed_sections.is_empty() || account.allowed_sections.contains(&slot.to_string())
}

/// Staff roles: may drive sessions, kick attendees and override allow-lists.
pub fn is_privileged(role: Role) -> bool {
    matches!(role, Role::Lecturer | Role::Developer)
}

pub fn is_developer(role: Role) -> bool {
    role == Role::Developer
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(allowed: &[&str]) -> Account {
        Account {
            username: "stud1".to_string(),
            password_hash: String::new(),
            role: Role::Student,
            allowed_sections: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_empty_allow_list_is_unrestricted() {
        assert!(is_allowed(&account(&[]), &SlotKey::new("C4", "S2")));
    }

    #[test]
    fn test_allow_list_is_exact_match() {
        let a = account(&["C1-S1", "C2-S3"]);
        assert!(is_allowed(&a, &SlotKey::new("C2", "S3")));
        assert!(!is_allowed(&a, &SlotKey::new("C1", "S2")));
    }

    #[test]
    fn test_roles() {
        assert!(!is_privileged(Role::Student));
        assert!(is_privileged(Role::Lecturer));
        assert!(is_privileged(Role::Developer));
        assert!(is_developer(Role::Developer));
        assert!(!is_developer(Role::Lecturer));
    }
}
