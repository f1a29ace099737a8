// src/formatting.rs

use crate::core::{HazardEvent, InlineKeyboard, KeyboardButton, Place};
use chrono::TimeZone;
use chrono::Utc;

/// Characters reserved by the Telegram MarkdownV2 dialect.
const MARKDOWN_V2_RESERVED: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Backslash-escapes every MarkdownV2-reserved character in `text`.
///
/// Each occurrence is escaped independently. The function is not idempotent:
/// applying it to already-escaped text double-escapes, so callers apply it
/// exactly once to raw field values.
pub fn escape_markdown_v2(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if MARKDOWN_V2_RESERVED.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

struct RegionEntry {
    code: &'static str,
    button_label: &'static str,
    display_name: &'static str,
}

/// Regions offered by the selection keyboard, plus the wildcard.
const SUPPORTED_REGIONS: &[RegionEntry] = &[
    RegionEntry {
        code: "gb",
        button_label: "🇬🇧 UK",
        display_name: "Great Britain 🇬🇧",
    },
    RegionEntry {
        code: "us",
        button_label: "🇺🇸 USA",
        display_name: "United States 🇺🇸",
    },
    RegionEntry {
        code: "in",
        button_label: "🇮🇳 India",
        display_name: "India 🇮🇳",
    },
    RegionEntry {
        code: "ir",
        button_label: "🇮🇷 Iran",
        display_name: "Iran 🇮🇷",
    },
    RegionEntry {
        code: "jp",
        button_label: "🇯🇵 Japan",
        display_name: "Japan 🇯🇵",
    },
    RegionEntry {
        code: "all",
        button_label: "🌍 Global",
        display_name: "🌍 The World",
    },
];

/// Text of the region-selection prompt sent with the inline keyboard.
pub const PROMPT_TEXT: &str = "Please select your preferred region for earthquake alerts:";

/// Human-readable name for a region code; unknown codes fall back to the
/// code itself.
pub fn region_display_name(code: &str) -> &str {
    SUPPORTED_REGIONS
        .iter()
        .find(|entry| entry.code == code)
        .map(|entry| entry.display_name)
        .unwrap_or(code)
}

/// The region-selection keyboard: supported regions two to a row, the
/// wildcard last.
pub fn region_keyboard() -> InlineKeyboard {
    let rows = SUPPORTED_REGIONS
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|entry| KeyboardButton {
                    label: entry.button_label.to_string(),
                    callback_data: entry.code.to_string(),
                })
                .collect()
        })
        .collect();
    InlineKeyboard { rows }
}

/// Confirmation sent after a selection has been committed.
pub fn confirmation_text(region: &str) -> String {
    format!(
        "You will now receive earthquake notifications for: {}",
        region_display_name(region)
    )
}

/// Builds the map link for an event's coordinates.
///
/// The returned URL is embedded in the alert unescaped.
pub fn map_link(base_url: &str, latitude: f64, longitude: f64) -> String {
    format!(
        "{}/?mlat={}&mlon={}#map=6/{}/{}",
        base_url.trim_end_matches('/'),
        latitude,
        longitude,
        latitude,
        longitude
    )
}

/// Renders the MarkdownV2 alert body for one event.
///
/// Every free-text field passes through [`escape_markdown_v2`] exactly once;
/// the map URL is never escaped.
pub fn format_alert(event: &HazardEvent, place: &Place, map_base_url: &str) -> String {
    let location = [
        place.state.as_deref(),
        place.county.as_deref(),
        place.country.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.is_empty())
    .map(escape_markdown_v2)
    .collect::<Vec<_>>()
    .join(", ");

    let tsunami = if event.tsunami { "Yes" } else { "No" };
    let map_link = map_link(map_base_url, event.latitude, event.longitude);

    format!(
        "🌍 *Earthquake Alert\\!* 🌍\n\
         \n\
         *{title}*\n\
         \n\
         📍 *Location:* {location}\n\
         📏 *Magnitude:* {magnitude}\n\
         🕒 *Time:* {time}\n\
         📡 *Depth:* {depth} km\n\
         🌊 *Tsunami:* {tsunami}\n\
         🗺️ [View on map]({map_link})\n\
         \n\
         ⚠️ *Stay Safe:*\n\
         \\- Move to an open area away from buildings\n\
         \\- Avoid elevators\n\
         \\- Drop, Cover, and Hold On\\!",
        title = escape_markdown_v2(&event.title),
        location = location,
        magnitude = escape_markdown_v2(&format!("{:.2}", event.magnitude)),
        time = escape_markdown_v2(&event_time_utc(event.time_ms)),
        depth = escape_markdown_v2(&format!("{:.2}", event.depth_km)),
        tsunami = tsunami,
        map_link = map_link,
    )
}

/// Human-readable UTC origin time (e.g., "2023-11-14 22:13:20 UTC").
fn event_time_utc(time_ms: i64) -> String {
    match Utc.timestamp_millis_opt(time_ms) {
        chrono::LocalResult::Single(t) => t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        _ => format!("{} ms", time_ms),
    }
}
