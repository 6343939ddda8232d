//! Panel colours, with optional hex overrides from the `[theme]` config table

use ratatui::style::Color;

use crate::config::ThemeOverrides;

#[derive(Debug, Clone)]
pub struct Theme {
    pub accent: Color,       // Active borders, key hints
    pub online: Color,       // Connected indicators, success messages
    pub offline: Color,      // Disconnected indicators
    pub error: Color,        // Error messages, failed checks
    pub loading: Color,      // In-flight messages
    pub text: Color,
    pub text_dim: Color,
    pub bg_selected: Color,
    pub inactive: Color,     // Inactive borders, disabled controls
    pub header: Color,
}

impl Default for Theme {
    fn default() -> Self {
        // Catppuccin-inspired
        Self {
            accent: Color::Rgb(250, 179, 135),
            online: Color::Rgb(166, 218, 149),
            offline: Color::Rgb(147, 153, 178),
            error: Color::Rgb(243, 139, 168),
            loading: Color::Rgb(137, 180, 250),
            text: Color::Rgb(205, 214, 244),
            text_dim: Color::Rgb(147, 153, 178),
            bg_selected: Color::Rgb(69, 71, 90),
            inactive: Color::Rgb(88, 91, 112),
            header: Color::Rgb(245, 194, 231),
        }
    }
}

impl Theme {
    pub fn load(overrides: Option<&ThemeOverrides>) -> Self {
        let mut theme = Self::default();
        let Some(overrides) = overrides else {
            return theme;
        };

        let apply = |slot: &mut Color, value: &Option<String>| {
            if let Some(value) = value {
                match parse_hex_color(value) {
                    Some(color) => *slot = color,
                    None => tracing::warn!("Ignoring theme colour {:?}", value),
                }
            }
        };

        apply(&mut theme.accent, &overrides.accent);
        apply(&mut theme.online, &overrides.online);
        apply(&mut theme.offline, &overrides.offline);
        apply(&mut theme.error, &overrides.error);
        apply(&mut theme.text, &overrides.text);
        apply(&mut theme.text_dim, &overrides.text_dim);
        theme
    }
}

/// Parse a hex color string (#RRGGBB or #RGB)
pub fn parse_hex_color(s: &str) -> Option<Color> {
    let s = s.trim().trim_start_matches('#');
    if !s.is_ascii() {
        return None;
    }

    match s.len() {
        6 => Some(Color::Rgb(
            u8::from_str_radix(&s[0..2], 16).ok()?,
            u8::from_str_radix(&s[2..4], 16).ok()?,
            u8::from_str_radix(&s[4..6], 16).ok()?,
        )),
        3 => Some(Color::Rgb(
            u8::from_str_radix(&s[0..1], 16).ok()? * 17,
            u8::from_str_radix(&s[1..2], 16).ok()? * 17,
            u8::from_str_radix(&s[2..3], 16).ok()? * 17,
        )),
        _ => None,
    }
}
