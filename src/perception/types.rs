use std::fmt;

use serde::{Deserialize, Serialize};

/// The interactive regions the executor has to find before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiElementKind {
    LikeButton,
    PassButton,
    CommentButton,
    SendButton,
    TextInput,
}

impl UiElementKind {
    pub const ALL: [UiElementKind; 5] = [
        UiElementKind::LikeButton,
        UiElementKind::PassButton,
        UiElementKind::CommentButton,
        UiElementKind::SendButton,
        UiElementKind::TextInput,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UiElementKind::LikeButton => "like_button",
            UiElementKind::PassButton => "pass_button",
            UiElementKind::CommentButton => "comment_button",
            UiElementKind::SendButton => "send_button",
            UiElementKind::TextInput => "text_input",
        }
    }
}

impl fmt::Display for UiElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point on the device screen in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenCoordinate {
    pub x: i32,
    pub y: i32,
}

impl ScreenCoordinate {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Point at fractions of a `width`×`height` area.
    pub fn from_fractions(fx: f64, fy: f64, width: u32, height: u32) -> Self {
        Self {
            x: (width as f64 * fx) as i32,
            y: (height as f64 * fy) as i32,
        }
    }

    /// Clamp into `[0, width-1] × [0, height-1]`.
    pub fn clamped(self, width: u32, height: u32) -> Self {
        let max_x = width.saturating_sub(1).min(i32::MAX as u32) as i32;
        let max_y = height.saturating_sub(1).min(i32::MAX as u32) as i32;
        Self {
            x: self.x.clamp(0, max_x),
            y: self.y.clamp(0, max_y),
        }
    }
}

impl fmt::Display for ScreenCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
