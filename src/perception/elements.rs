//! Per-kind lookup data for element location.
//!
//! The fallback fractions are a last-resort guess at where each control usually
//! sits on a portrait phone screen. They are not measured positions and will be
//! wrong whenever the app layout differs.
use crate::perception::types::{ScreenCoordinate, UiElementKind};

pub const NOT_FOUND_SENTINEL: &str = "NOT_FOUND";

pub struct ElementSpec {
    pub kind: UiElementKind,
    /// What the vision model is asked to find.
    pub instruction: &'static str,
    /// Fallback position as (width, height) fractions.
    pub fallback: (f64, f64),
}

const ELEMENT_TABLE: [ElementSpec; 5] = [
    ElementSpec {
        kind: UiElementKind::LikeButton,
        instruction: "Find the LIKE button (usually a heart icon, thumbs up, or green button).",
        fallback: (0.8, 0.9),
    },
    ElementSpec {
        kind: UiElementKind::PassButton,
        instruction: "Find the PASS button (usually an X icon, thumbs down, or red button).",
        fallback: (0.2, 0.9),
    },
    ElementSpec {
        kind: UiElementKind::CommentButton,
        instruction: "Find the COMMENT button (usually a chat bubble or comment icon).",
        fallback: (0.5, 0.9),
    },
    ElementSpec {
        kind: UiElementKind::SendButton,
        instruction: "Find the SEND button (usually says 'Send' or has a send icon).",
        fallback: (0.8, 0.9),
    },
    ElementSpec {
        kind: UiElementKind::TextInput,
        instruction: "Find the text input field (usually a text box or input area).",
        fallback: (0.5, 0.85),
    },
];

pub fn spec_for(kind: UiElementKind) -> &'static ElementSpec {
    // The table holds exactly one entry per kind, in declaration order.
    &ELEMENT_TABLE[kind as usize]
}

/// Full prompt sent with the screenshot when looking for `kind`.
pub fn location_prompt(kind: UiElementKind) -> String {
    format!(
        "Analyze this mobile app screenshot. {instruction}\n\
         The coordinates should be the center point of the button/field, in screenshot pixels.\n\
         Only respond with the coordinates in format 'x,y' or '{NOT_FOUND_SENTINEL}' if not found.",
        instruction = spec_for(kind).instruction,
    )
}

pub fn fallback_position(kind: UiElementKind, width: u32, height: u32) -> ScreenCoordinate {
    let (fx, fy) = spec_for(kind).fallback;
    ScreenCoordinate::from_fractions(fx, fy, width, height)
}

/// How a location reply was understood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationReply {
    At(ScreenCoordinate),
    NotFound,
    Malformed,
}

/// Parse a vision-model reply of the form `x,y` or the not-found sentinel.
pub fn parse_location_reply(reply: &str) -> LocationReply {
    let trimmed = reply.trim().trim_matches(|c: char| c == '\'' || c == '"' || c == '`');
    if trimmed.eq_ignore_ascii_case(NOT_FOUND_SENTINEL) {
        return LocationReply::NotFound;
    }

    let inner = trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(trimmed);
    let mut parts = inner.split(',');
    let (Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next()) else {
        return LocationReply::Malformed;
    };
    match (x.trim().parse::<i32>(), y.trim().parse::<i32>()) {
        (Ok(x), Ok(y)) => LocationReply::At(ScreenCoordinate::new(x, y)),
        _ => LocationReply::Malformed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_every_kind() {
        for kind in UiElementKind::ALL {
            assert_eq!(spec_for(kind).kind, kind);
        }
    }

    #[test]
    fn fallback_positions() {
        assert_eq!(
            fallback_position(UiElementKind::LikeButton, 1080, 1920),
            ScreenCoordinate::new(864, 1728)
        );
        assert_eq!(
            fallback_position(UiElementKind::PassButton, 1080, 1920),
            ScreenCoordinate::new(216, 1728)
        );
        assert_eq!(
            fallback_position(UiElementKind::TextInput, 1000, 2000),
            ScreenCoordinate::new(500, 1700)
        );
    }

    #[test]
    fn parses_coordinates() {
        assert_eq!(
            parse_location_reply(" 540, 1700\n"),
            LocationReply::At(ScreenCoordinate::new(540, 1700))
        );
        assert_eq!(
            parse_location_reply("(12,34)"),
            LocationReply::At(ScreenCoordinate::new(12, 34))
        );
        assert_eq!(parse_location_reply("NOT_FOUND"), LocationReply::NotFound);
        assert_eq!(parse_location_reply("'not_found'"), LocationReply::NotFound);
    }

    #[test]
    fn malformed_replies() {
        assert_eq!(parse_location_reply("about 540, 1700"), LocationReply::Malformed);
        assert_eq!(parse_location_reply("540"), LocationReply::Malformed);
        assert_eq!(parse_location_reply("1,2,3"), LocationReply::Malformed);
        assert_eq!(parse_location_reply("5.5,10"), LocationReply::Malformed);
        assert_eq!(parse_location_reply(""), LocationReply::Malformed);
    }

    #[test]
    fn prompt_mentions_format() {
        let prompt = location_prompt(UiElementKind::SendButton);
        assert!(prompt.contains("SEND"));
        assert!(prompt.contains("'x,y'"));
        assert!(prompt.contains(NOT_FOUND_SENTINEL));
    }
}
