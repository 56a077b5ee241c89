// `edustore secret`: generate a token signing secret for EDUSTORE_SECRET.

use colored::Colorize;
use rand::RngCore;

use super::CliResult;

pub fn run() -> CliResult {
    let secret = generate_secret();

    println!();
    println!("Add the following to your environment:");
    println!();
    println!("{}", "# Session token signing key".dimmed());
    println!("{}", format!("EDUSTORE_SECRET={secret}").green());
    println!();

    Ok(())
}

/// 32 random bytes, hex encoded.
fn generate_secret() -> String {
    let mut buf = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_length() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_secret_unique() {
        assert_ne!(generate_secret(), generate_secret());
    }
}
