use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("Unknown activity event: {0}")]
pub struct ActivityParseError(String);

/// User input that counts as activity. Names follow the DOM event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActivityKind {
    KeyDown,
    MouseDown,
    MouseMove,
    Scroll,
    TouchMove,
    TouchStart,
    VisibilityChange,
    Wheel,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 8] = [
        ActivityKind::KeyDown,
        ActivityKind::MouseDown,
        ActivityKind::MouseMove,
        ActivityKind::Scroll,
        ActivityKind::TouchMove,
        ActivityKind::TouchStart,
        ActivityKind::VisibilityChange,
        ActivityKind::Wheel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::KeyDown => "keydown",
            ActivityKind::MouseDown => "mousedown",
            ActivityKind::MouseMove => "mousemove",
            ActivityKind::Scroll => "scroll",
            ActivityKind::TouchMove => "touchmove",
            ActivityKind::TouchStart => "touchstart",
            ActivityKind::VisibilityChange => "visibilitychange",
            ActivityKind::Wheel => "wheel",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = ActivityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        ActivityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lower)
            .ok_or_else(|| ActivityParseError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dom_names() {
        assert_eq!("mousemove".parse::<ActivityKind>().unwrap(), ActivityKind::MouseMove);
        assert_eq!("KeyDown".parse::<ActivityKind>().unwrap(), ActivityKind::KeyDown);
        assert!("click-ish".parse::<ActivityKind>().is_err());
    }
}
