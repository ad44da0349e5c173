// ABOUTME: Identifier generation for rows synthesized during migration
// ABOUTME: Produces random UUIDs in canonical string form

use uuid::Uuid;

/// Source of primary keys for rows the migration creates itself.
pub trait IdGenerator: Send {
    fn next_id(&mut self) -> String;
}

/// Random (v4) UUIDs, hyphenated lowercase, 36 characters.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&mut self) -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_uuid_generator_canonical_form() {
        let id = UuidGenerator.next_id();
        assert_eq!(id.len(), 36);
        assert_eq!(id.matches('-').count(), 4);
        assert_eq!(id, id.to_lowercase());
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_uuid_generator_is_unique() {
        let mut ids = UuidGenerator;
        let seen: HashSet<String> = (0..1000).map(|_| ids.next_id()).collect();
        assert_eq!(seen.len(), 1000);
    }
}
