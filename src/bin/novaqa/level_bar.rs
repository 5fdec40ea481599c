//! Compact text meter shown while waiting for the microphone check.

use novaqa::audio::{is_silent_sentinel, normalized_level};

const BAR_FULL: char = '█';
const BAR_EMPTY: char = '░';
pub(crate) const BAR_WIDTH: usize = 30;

/// Render `db` as a fixed-width bar followed by the value.
#[must_use]
pub(crate) fn format_level_bar(db: f32, floor_db: f32, width: usize) -> String {
    let filled = (normalized_level(db, floor_db) * width as f32).round() as usize;
    let mut bar: String = (0..width)
        .map(|i| if i < filled { BAR_FULL } else { BAR_EMPTY })
        .collect();
    if is_silent_sentinel(db) {
        bar.push_str("   silent");
    } else {
        bar.push_str(&format!(" {db:>5.0} dB"));
    }
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_level_renders_empty_bar() {
        let bar = format_level_bar(f32::NEG_INFINITY, -80.0, 10);
        assert!(bar.starts_with(&BAR_EMPTY.to_string().repeat(10)));
        assert!(bar.ends_with("silent"));
    }

    #[test]
    fn full_scale_fills_bar() {
        let bar = format_level_bar(0.0, -80.0, 10);
        assert!(bar.starts_with(&BAR_FULL.to_string().repeat(10)));
        assert!(bar.contains("0 dB"));
    }

    #[test]
    fn half_scale_fills_half() {
        let bar = format_level_bar(-40.0, -80.0, 10);
        assert_eq!(bar.chars().filter(|&c| c == BAR_FULL).count(), 5);
        assert_eq!(bar.chars().filter(|&c| c == BAR_EMPTY).count(), 5);
    }
}
