//! Inbound control-frame protocol.
//!
//! Outbound traffic carries no envelope, just raw process bytes in
//! binary frames, so only the operator-to-bridge direction is typed
//! here.

use serde::Deserialize;

/// A structured message on the operator connection.
///
/// `input` carries keystrokes verbatim; `resize` carries a
/// terminal-resize intent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    Input { data: String },
    Resize { rows: u16, cols: u16 },
}

impl ControlFrame {
    /// Parse a text frame.
    ///
    /// Returns `None` for anything that is not a well-formed control
    /// frame; malformed frames are dropped by the bridge, not errored.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_input_frame() {
        let frame = ControlFrame::parse(r#"{"type":"input","data":"ls -la\n"}"#).unwrap();
        assert_eq!(
            frame,
            ControlFrame::Input {
                data: "ls -la\n".to_string()
            }
        );
    }

    #[test]
    fn parses_resize_frame() {
        let frame = ControlFrame::parse(r#"{"type":"resize","rows":40,"cols":120}"#).unwrap();
        assert_eq!(frame, ControlFrame::Resize { rows: 40, cols: 120 });
    }

    #[test]
    fn malformed_frames_parse_to_none() {
        assert!(ControlFrame::parse("not json").is_none());
        assert!(ControlFrame::parse(r#"{"type":"input"}"#).is_none());
        assert!(ControlFrame::parse(r#"{"type":"resize","rows":"tall"}"#).is_none());
        assert!(ControlFrame::parse(r#"{"type":"ping"}"#).is_none());
    }
}
