//! Synthetic test data for entities that must not come from the database,
//! such as fresh registrations.

use rand::Rng;
use serde::Serialize;

/// Characters used by [`text`] when no charset is given.
pub const DEFAULT_CHARSET: &str =
    "1234567890QWERTYUIOPASDFGHJKLZXCVBNMqwertyuiopasdfghjklzxcvbnm_ ";

pub const DEFAULT_EMAIL_PREFIX: &str = "at_";
pub const DEFAULT_PASSWORD: &str = "1234";

/// Credentials for a user that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,
}

/// A throwaway address: `<prefix><8 hex digits>@test.ru`.
pub fn email(prefix: &str) -> String {
    let mut rng = rand::rng();
    format!("{}{:08x}@test.ru", prefix, rng.random::<u32>())
}

/// A new user with a random email unless one is given.
pub fn user(email: Option<&str>, password: &str) -> NewUser {
    NewUser {
        email: email
            .map(str::to_string)
            .unwrap_or_else(|| self::email(DEFAULT_EMAIL_PREFIX)),
        password: password.to_string(),
    }
}

/// `length` random characters drawn from `charset`.
pub fn text(length: usize, charset: &str) -> String {
    let chars: Vec<char> = charset.chars().collect();
    if chars.is_empty() {
        return String::new();
    }

    let mut rng = rand::rng();
    (0..length)
        .map(|_| chars[rng.random_range(0..chars.len())])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_shape() {
        let address = email(DEFAULT_EMAIL_PREFIX);
        assert!(address.starts_with("at_"));
        assert!(address.ends_with("@test.ru"));
        assert_eq!(address.len(), "at_".len() + 8 + "@test.ru".len());
    }

    #[test]
    fn test_user_defaults() {
        let generated = user(None, DEFAULT_PASSWORD);
        assert!(generated.email.ends_with("@test.ru"));
        assert_eq!(generated.password, "1234");

        let fixed = user(Some("me@test.ru"), "secret");
        assert_eq!(fixed.email, "me@test.ru");
    }

    #[test]
    fn test_text_uses_charset() {
        let s = text(64, "ab");
        assert_eq!(s.chars().count(), 64);
        assert!(s.chars().all(|c| c == 'a' || c == 'b'));
        assert_eq!(text(5, ""), "");
        assert_eq!(text(0, DEFAULT_CHARSET), "");
    }
}
