//! Console color palette and semantic roles.

use ratatui::style::Color;

pub const CONSOLE_TEAL_RGB: (u8, u8, u8) = (64, 176, 166); // #40B0A6
pub const CONSOLE_SKY_RGB: (u8, u8, u8) = (106, 174, 242);
pub const CONSOLE_AMBER_RGB: (u8, u8, u8) = (232, 176, 74);
pub const CONSOLE_INK_RGB: (u8, u8, u8) = (12, 18, 24);
pub const CONSOLE_SLATE_RGB: (u8, u8, u8) = (22, 30, 40);
pub const CONSOLE_RED_RGB: (u8, u8, u8) = (226, 80, 96);

pub const CONSOLE_TEAL: Color = Color::Rgb(
    CONSOLE_TEAL_RGB.0,
    CONSOLE_TEAL_RGB.1,
    CONSOLE_TEAL_RGB.2,
);
pub const CONSOLE_SKY: Color = Color::Rgb(CONSOLE_SKY_RGB.0, CONSOLE_SKY_RGB.1, CONSOLE_SKY_RGB.2);
pub const CONSOLE_AMBER: Color = Color::Rgb(
    CONSOLE_AMBER_RGB.0,
    CONSOLE_AMBER_RGB.1,
    CONSOLE_AMBER_RGB.2,
);
pub const CONSOLE_INK: Color = Color::Rgb(CONSOLE_INK_RGB.0, CONSOLE_INK_RGB.1, CONSOLE_INK_RGB.2);
pub const CONSOLE_SLATE: Color = Color::Rgb(
    CONSOLE_SLATE_RGB.0,
    CONSOLE_SLATE_RGB.1,
    CONSOLE_SLATE_RGB.2,
);
pub const CONSOLE_RED: Color = Color::Rgb(CONSOLE_RED_RGB.0, CONSOLE_RED_RGB.1, CONSOLE_RED_RGB.2);

pub const TEXT_PRIMARY: Color = Color::White;
pub const TEXT_MUTED: Color = Color::DarkGray;
pub const TEXT_DIM: Color = Color::Gray;

pub const STATUS_SUCCESS: Color = CONSOLE_TEAL;
pub const STATUS_WARNING: Color = CONSOLE_AMBER;
pub const STATUS_ERROR: Color = CONSOLE_RED;
pub const STATUS_INFO: Color = CONSOLE_SKY;

// Result value highlighting
pub const VALUE_STRING: Color = Color::Rgb(152, 195, 121);
pub const VALUE_NUMBER: Color = Color::Rgb(209, 154, 102);
pub const VALUE_KEYWORD: Color = Color::Rgb(198, 120, 221);

pub const PROMPT: Color = CONSOLE_TEAL;
pub const FOCUS_BORDER: Color = CONSOLE_TEAL;
pub const BLUR_BORDER: Color = Color::Rgb(48, 60, 72);

pub const COMPOSER_BG: Color = CONSOLE_SLATE;

pub const HEADER_BG: Color = CONSOLE_INK;
