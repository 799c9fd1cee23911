use sha2::{Digest, Sha256};

const PREFIX_LIMIT: usize = 10;
const FALLBACK_USER: &str = "dev";

pub fn local_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| FALLBACK_USER.to_string())
}

pub fn routing_token(username: &str) -> String {
    let digest = Sha256::digest(username.as_bytes());
    let suffix = digest
        .iter()
        .take(3)
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>();

    let mut prefix = username
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .take(PREFIX_LIMIT)
        .collect::<String>();
    if prefix.is_empty() {
        prefix = FALLBACK_USER.to_string();
    }

    format!("{prefix}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::routing_token;

    #[test]
    fn token_is_deterministic_per_user() {
        assert_eq!(routing_token("jane"), routing_token("jane"));
        assert_ne!(routing_token("jane"), routing_token("joan"));
    }

    #[test]
    fn token_is_a_dns_safe_label() {
        let token = routing_token("Jane.Doe@EXAMPLE");
        assert!(token.len() <= 63);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        );
        assert!(token.starts_with("janedoeexa-"));
    }

    #[test]
    fn empty_username_falls_back() {
        assert!(routing_token("...").starts_with("dev-"));
    }
}
