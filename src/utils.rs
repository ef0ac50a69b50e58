use chat_config::LoggingConfig;
use chat_types::UserId;
use sha2::{Digest, Sha256};

/// Creates a truncated, salted hash of an identifier for safe logging.
///
/// # Arguments
/// * `id` - The identifier to hash (e.g., user_id).
/// * `salt` - A salt value from the application's configuration.
///
/// # Returns
/// A short, hexadecimal string representing the salted hash.
pub fn log_safe_id(id: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(id.as_bytes());
    let hash = hasher.finalize();

    hash[..4]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
}

/// The form of `user_id` that may appear in logs under the current settings:
/// the raw id when identifier logging is enabled, otherwise a salted hash.
pub fn loggable_user(user_id: &UserId, logging: &LoggingConfig) -> String {
    if logging.enable_user_identifiers {
        user_id.to_string()
    } else {
        log_safe_id(&user_id.to_string(), &logging.hash_salt)
    }
}
