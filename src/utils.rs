use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Generates a PKCE code verifier: 32 random bytes, base64url without padding
/// (43 characters).
pub fn generate_code_verifier() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `BASE64URL(SHA256(verifier))`, the S256 code challenge.
pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generates the opaque `state` value guarding the callback against CSRF.
pub fn generate_state() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compares two strings without short-circuiting on the first difference.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Formats milliseconds as `m:ss`, the way the overlay shows track times.
pub fn format_ms(ms: u64) -> String {
    let total_secs = ms / 1000;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

/// Renders a fixed-width text progress bar for the terminal front end.
pub fn progress_bar(progress_ms: u64, duration_ms: u64, width: usize) -> String {
    let filled = if duration_ms == 0 {
        0
    } else {
        ((progress_ms.min(duration_ms) as f64 / duration_ms as f64) * width as f64).round()
            as usize
    };
    format!("{}{}", "━".repeat(filled), "─".repeat(width - filled))
}
