//! Detection of sound cards that share the PWM and PCM blocks.
//!
//! The analog headphone output is driven by the PWM block and I2S sound
//! cards drive the PCM block. If ALSA has one of them registered, the
//! peripheral is taken.

/// ALSA card list.
pub const ASOUND_CARDS_PATH: &str = "/proc/asound/cards";

const ANALOG_MARKERS: &[&str] = &["Headphones", "bcm2835 ALSA", "bcm2835_alsa"];

const I2S_MARKERS: &[&str] = &[
    "I2S",
    "i2s",
    "sndrpi",
    "hifiberry",
    "googlevoicehat",
    "seeed",
];

/// Returns the first card line matching any of `markers`.
fn find_card(cards: &str, markers: &[&str]) -> Option<String> {
    cards
        .lines()
        .filter(|line| line.trim_start().starts_with(|c: char| c.is_ascii_digit()))
        .find(|line| markers.iter().any(|m| line.contains(m)))
        .map(|line| line.trim().to_string())
}

/// Card using the PWM block for analog audio.
pub fn analog_card(cards: &str) -> Option<String> {
    find_card(cards, ANALOG_MARKERS)
}

/// Card using the PCM block for I2S audio.
pub fn i2s_card(cards: &str) -> Option<String> {
    find_card(cards, I2S_MARKERS)
}

/// Reads the ALSA card list; empty if ALSA is not loaded.
pub fn read_cards() -> String {
    std::fs::read_to_string(ASOUND_CARDS_PATH).unwrap_or_default()
}
