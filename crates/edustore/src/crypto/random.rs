// Random codes and constant-time comparison.

use rand::Rng;
use subtle::ConstantTimeEq;

/// Generate a numeric one-time code of `length` digits.
///
/// The first digit is never zero, so the code keeps its length when a
/// client parses it as a number.
pub fn generate_otp(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|i| {
            let digit = if i == 0 {
                rng.gen_range(1..10)
            } else {
                rng.gen_range(0..10)
            };
            char::from(b'0' + digit as u8)
        })
        .collect()
}

/// Compare two byte slices in constant time.
pub fn constant_time_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_shape() {
        for _ in 0..200 {
            let code = generate_otp(6);
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert_ne!(code.as_bytes()[0], b'0');
        }
        assert_eq!(generate_otp(0), "");
    }

    #[test]
    fn test_constant_time_equal() {
        assert!(constant_time_equal(b"123456", b"123456"));
        assert!(!constant_time_equal(b"123456", b"123457"));
        assert!(!constant_time_equal(b"123456", b"12345"));
    }
}
