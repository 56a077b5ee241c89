// Identifier generation.
//
// Row ids are nanoids. Order numbers and download identifiers are
// `PREFIX-<unix-millis>-<uppercase base36 suffix>` references.

use chrono::{DateTime, Utc};
use rand::Rng;

const BASE36_UPPER: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generate a unique row id using nanoid (21 characters).
pub fn generate_id() -> String {
    nanoid::nanoid!()
}

/// Generate a human-readable reference such as `ORD-1700000000000-K3F9Q`.
pub fn generate_reference(prefix: &str, now: DateTime<Utc>, suffix_len: usize) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..suffix_len)
        .map(|_| BASE36_UPPER[rng.gen_range(0..BASE36_UPPER.len())] as char)
        .collect();
    format!("{prefix}-{}-{suffix}", now.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_length() {
        assert_eq!(generate_id().len(), 21);
        assert_ne!(generate_id(), generate_id());
    }

    #[test]
    fn test_reference_shape() {
        let now = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let reference = generate_reference("DL", now, 8);
        let parts: Vec<&str> = reference.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "DL");
        assert_eq!(parts[1], "1700000000000");
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }
}
