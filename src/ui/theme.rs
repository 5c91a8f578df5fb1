use ratatui::style::Color;

/// Colours for the trace viewer. Allocation states each get their own hue so
/// a freed block or a returned frame stands out from live memory at a glance.
pub struct Theme {
    pub fg: Color,
    pub muted: Color,
    pub accent: Color, // Blue: sizes, section headings
    pub scalar: Color, // Peach: integers, heap instructions
    pub border_focused: Color,
    pub border_normal: Color,
    pub highlight_bg: Color,
    pub function: Color,
    pub handle: Color,
    pub pointer: Color,
    pub null: Color,

    // Findings
    pub fatal: Color,
    pub warning: Color,

    // Allocation state
    pub live: Color,
    pub freed: Color,
    pub dangling: Color,
    pub uninit: Color, // Dump rows holding `??` bytes
}

pub const DEFAULT_THEME: Theme = Theme {
    fg: Color::Rgb(205, 214, 244),
    muted: Color::Rgb(108, 112, 134),
    accent: Color::Rgb(137, 180, 250),
    scalar: Color::Rgb(250, 179, 135),
    border_focused: Color::Rgb(249, 226, 175),
    border_normal: Color::Rgb(88, 91, 112),
    highlight_bg: Color::Rgb(49, 50, 68),
    function: Color::Rgb(249, 226, 175),
    handle: Color::Rgb(148, 226, 213),
    pointer: Color::Rgb(245, 194, 231),
    null: Color::Rgb(235, 160, 172),

    fatal: Color::Rgb(243, 139, 168),
    warning: Color::Rgb(249, 226, 175),

    live: Color::Rgb(166, 227, 161),
    freed: Color::Rgb(150, 90, 110),   // Dimmed red
    dangling: Color::Rgb(140, 110, 170), // Dimmed mauve
    uninit: Color::Rgb(229, 200, 144),
};
