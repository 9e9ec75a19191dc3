//! Shared UI icons and emojis.
//!
//! Each icon carries a plain-text fallback for terminals without emoji support.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[WARN]");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "[i]");

// Pipeline indicators
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>]");
pub static STALE: Emoji<'_, '_> = Emoji("🔄 ", "[STALE]");
pub static DEFERRED: Emoji<'_, '_> = Emoji("📨 ", "[SENT]");
pub static DISCARDED: Emoji<'_, '_> = Emoji("🗑️  ", "[DROP]");
pub static PENCIL: Emoji<'_, '_> = Emoji("📝 ", "~");
