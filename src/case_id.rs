use sha2::{Digest, Sha256};
use uuid::Uuid;

const ID_PREFIX: &str = "case";
const SHORT_HASH_LEN: usize = 12;

pub fn generate_case_id<F>(mut exists: F) -> String
where
    F: FnMut(&str) -> bool,
{
    for _ in 0..64 {
        let candidate = format!("{}-{}", ID_PREFIX, &seed_digest()[..SHORT_HASH_LEN]);
        if !exists(&candidate) {
            return candidate;
        }
    }

    tracing::warn!("short case id space exhausted; falling back to full uuid");
    format!("{}-{}", ID_PREFIX, Uuid::now_v7().simple())
}

/// Id for an element of a repeated sub-record (sibling, caregiver, contact entry).
pub fn generate_record_id() -> String {
    seed_digest()[..8].to_string()
}

fn seed_digest() -> String {
    let seed = Uuid::now_v7().to_string();
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn display_id(id: &str) -> &str {
    id.strip_prefix("case-").unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{display_id, generate_case_id, generate_record_id};

    #[test]
    fn generated_ids_follow_prefix_short_hash_shape() {
        let seen: HashSet<String> = HashSet::new();
        let id = generate_case_id(|candidate| seen.contains(candidate));
        assert!(id.starts_with("case-"));
        assert_eq!(display_id(&id).len(), 12);
        assert!(display_id(&id).chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn collisions_retry_then_fall_back_to_full_uuid() {
        let id = generate_case_id(|_| true);
        assert!(id.starts_with("case-"));
        assert_eq!(display_id(&id).len(), 32);
    }

    #[test]
    fn many_ids_are_distinct() {
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let id = generate_case_id(|candidate| seen.contains(candidate));
            assert!(seen.insert(id));
        }
    }

    #[test]
    fn record_ids_are_short_hex() {
        let id = generate_record_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn display_id_strips_prefix() {
        assert_eq!(display_id("case-19dc"), "19dc");
        assert_eq!(display_id("imported"), "imported");
    }
}
