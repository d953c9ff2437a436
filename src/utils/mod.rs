use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{BotError, DownloadTarget};

static TORRENT_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://.*\.torrent(\?.*)?$").expect("torrent url pattern is valid")
});

static PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)%").expect("percent pattern is valid"));

const BYTES_PER_MB: u64 = 1024 * 1024;

pub fn is_magnet_link(text: &str) -> bool {
    text.starts_with("magnet:?")
}

pub fn is_torrent_url(text: &str) -> bool {
    TORRENT_URL.is_match(text)
}

/// Classifies user input as a download target.
pub fn classify_link(text: &str) -> Result<DownloadTarget, BotError> {
    let text = text.trim();
    if is_magnet_link(text) {
        Ok(DownloadTarget::Magnet(text.to_string()))
    } else if is_torrent_url(text) {
        Ok(DownloadTarget::TorrentUrl(text.to_string()))
    } else {
        Err(BotError::InvalidInput)
    }
}

/// Extracts the first `<digits>%` percentage from an engine output line.
pub fn parse_progress(line: &str) -> Option<u32> {
    let caps = PERCENT.captures(line)?;
    // Digit runs too long for an integer are treated as noise.
    caps[1].parse().ok()
}

/// Handles console redraws joined by carriage returns: the latest segment
/// carrying a percentage wins.
pub fn parse_progress_chunk(raw: &[u8]) -> Option<u32> {
    let text = String::from_utf8_lossy(raw);
    text.split('\r').filter_map(parse_progress).last()
}

/// Sanitize filename to remove invalid characters
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | '\0' => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Whole megabytes, truncated.
pub fn bytes_to_mb(bytes: u64) -> u64 {
    bytes / BYTES_PER_MB
}

pub fn mb_to_bytes(mb: u64) -> u64 {
    mb.saturating_mul(BYTES_PER_MB)
}
