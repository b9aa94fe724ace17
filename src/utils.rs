use chrono::Utc;
use once_cell::sync::Lazy;
use rand::{Rng, seq::SliceRandom};
use regex::Regex;

static FRAGMENT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"#(.*)$").unwrap());
static HANDLE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_LENGTH: usize = 9;

const DISPLAY_NAMES: [&str; 24] = [
    "Alice", "Bob", "Charlie", "Diana", "Eve", "Frank", "Grace", "Henry", "Ivy", "Jack", "Kate",
    "Liam", "Maya", "Noah", "Olivia", "Paul", "Quinn", "Ruby", "Sam", "Tara", "Uma", "Victor",
    "Wendy", "Xander",
];

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Short base-36 id used for peers and chat messages.
pub(crate) fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LENGTH)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

pub(crate) fn random_display_name() -> &'static str {
    DISPLAY_NAMES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(DISPLAY_NAMES[0])
}

/// Peer handle carried in the fragment of a page URL, if any.
pub fn handle_from_url(url: &str) -> Option<String> {
    FRAGMENT_REGEX
        .captures(url)
        .and_then(|captures| captures.get(1))
        .map(|fragment| fragment.as_str())
        .filter(|fragment| HANDLE_REGEX.is_match(fragment))
        .map(String::from)
}

/// Replaces (or adds) the fragment of `url` with `handle`.
pub fn url_with_handle(url: &str, handle: &str) -> String {
    let base = FRAGMENT_REGEX.replace(url, "");
    format!("{base}#{handle}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_base36() {
        let id = generate_id();
        assert_eq!(id.len(), ID_LENGTH);
        assert!(id.bytes().all(|b| ID_ALPHABET.contains(&b)));
        assert_ne!(generate_id(), generate_id());
    }

    #[test]
    fn display_names_come_from_the_roster() {
        assert!(DISPLAY_NAMES.contains(&random_display_name()));
    }

    #[test]
    fn handle_is_read_from_fragment() {
        assert_eq!(
            handle_from_url("http://localhost:5173/#k2j4h1a9z"),
            Some(String::from("k2j4h1a9z"))
        );
        assert_eq!(handle_from_url("http://localhost:5173/"), None);
        assert_eq!(handle_from_url("http://localhost:5173/#"), None);
        assert_eq!(handle_from_url("http://localhost/#bad handle"), None);
    }

    #[test]
    fn handle_is_written_into_fragment() {
        assert_eq!(
            url_with_handle("http://localhost:5173/", "abc"),
            "http://localhost:5173/#abc"
        );
        assert_eq!(
            url_with_handle("http://localhost:5173/#old", "new"),
            "http://localhost:5173/#new"
        );
    }
}
