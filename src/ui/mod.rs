//! Everything the user sees in the chat: progress bars and message texts.

const BAR_WIDTH: u32 = 10;

/// Glyph pair used to draw a progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BarStyle {
    #[default]
    Blue,
    Green,
    Star,
    Fire,
    Plain,
}

impl BarStyle {
    /// Unknown names fall back to the plain square glyphs.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "blue" => BarStyle::Blue,
            "green" => BarStyle::Green,
            "star" => BarStyle::Star,
            "fire" => BarStyle::Fire,
            _ => BarStyle::Plain,
        }
    }

    fn glyphs(self) -> (&'static str, &'static str) {
        match self {
            BarStyle::Blue => ("🔵", "⚪"),
            BarStyle::Green => ("🟢", "⚪"),
            BarStyle::Star => ("⭐", "✩"),
            BarStyle::Fire => ("🔥", "·"),
            BarStyle::Plain => ("⬛", "⬜"),
        }
    }
}

/// Renders a ten-unit bar; `percent` is clamped to `0..=100`.
pub fn render_bar(percent: i64, style: BarStyle) -> String {
    let percent = percent.clamp(0, 100) as u32;
    let filled = percent * BAR_WIDTH / 100;
    let (full, empty) = style.glyphs();
    let mut bar = full.repeat(filled as usize);
    bar.push_str(&empty.repeat((BAR_WIDTH - filled) as usize));
    bar
}

pub const GREETING: &str = "👋 Hello!\n\n\
    I can download torrents for you. Send me a magnet link or a .torrent file.\n\n\
    Use /help for commands.";

pub const HELP: &str = "ℹ️ Help Menu\n\n\
    /start - Greet the bot\n\
    /help - Show help\n\
    /in <magnet/torrent-url> - Start a torrent download\n\
    /cancel - Cancel your current download\n\
    Or send .torrent file directly.\n\
    Only admins can trigger downloads.";

pub const NOT_AUTHORIZED: &str = "🚫 You are not authorized to download torrents.";
pub const USAGE_IN: &str = "Usage:\n/in <magnet link or torrent URL>";
pub const INVALID_LINK: &str = "❌ Not a valid magnet or torrent URL.";
pub const ALREADY_ACTIVE: &str =
    "⏳ You already have an active download. Use /cancel to stop it first.";
pub const CANCELLED_REPLY: &str = "✅ Download cancelled.";
pub const NOTHING_TO_CANCEL: &str = "ℹ️ No active download to cancel.";
pub const SESSION_CANCELLED: &str = "🛑 Download cancelled.";
pub const DOWNLOADING: &str = "Downloading 🔥❄️";
pub const TIMED_OUT: &str = "⚠️ aria2c timed out. Trying to proceed anyway.";
pub const NO_FILES: &str = "❌ Download failed or no files found.";
pub const UPLOADING: &str = "Uploading 💧";
pub const ENGINE_FAILED: &str = "❌ Could not start the download engine.";
pub const ATTACHMENT_FAILED: &str = "❌ Could not fetch the .torrent file.";

pub fn downloading_status(percent: u8, bar: &str) -> String {
    format!("{}\n{}  {}%", DOWNLOADING, bar, percent)
}

pub fn uploading_notice(file_name: &str) -> String {
    format!("{} `{}`", UPLOADING, file_name)
}

/// Simulated upload bar, always drawn in the green style.
pub fn uploading_status(file_name: &str, percent: u8) -> String {
    format!(
        "{}\n{}  {}%",
        uploading_notice(file_name),
        render_bar(percent.into(), BarStyle::Green),
        percent
    )
}

pub fn completed_caption(file_name: &str) -> String {
    format!("✅ Download complete: `{}`", file_name)
}

pub fn skipped_notice(file_name: &str, size_mb: u64, limit_mb: u64) -> String {
    format!(
        "⚠️ Skipped `{}` ({}MB): larger than the {}MB limit.",
        file_name, size_mb, limit_mb
    )
}

pub fn upload_failed_notice(file_name: &str) -> String {
    format!("❌ Upload failed for `{}`.", file_name)
}
