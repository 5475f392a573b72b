use serde::Deserialize;
use serde_json::Value;

/// One decoded inbound control event.
///
/// Coordinates are in the browser's CSS-pixel viewport space; the caller
/// (the Input Injector) is responsible for mapping them onto the captured
/// display rectangle.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    TouchStart { x: f64, y: f64 },
    TouchMove { x: f64, y: f64 },
    TouchEnd { x: f64, y: f64 },
    Scroll { delta_y: f64 },
}

#[derive(Debug, Deserialize)]
struct XyFields {
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct ScrollFields {
    #[serde(rename = "deltaY")]
    delta_y: f64,
}

/// Parse one control message from a JSON text frame.
///
/// Returns `Ok(None)` for a syntactically valid JSON object whose `type`
/// field is absent or unrecognized -- an unknown message type is not an
/// error, it is simply ignored, matching the Control Reader's contract.
pub fn parse(json: &str) -> Result<Option<ControlMessage>, serde_json::Error> {
    let value: Value = serde_json::from_str(json)?;
    let Some(ty) = value.get("type").and_then(Value::as_str) else {
        return Ok(None);
    };

    let message = match ty {
        "touchstart" => {
            let f: XyFields = serde_json::from_value(value)?;
            ControlMessage::TouchStart { x: f.x, y: f.y }
        }
        "touchmove" => {
            let f: XyFields = serde_json::from_value(value)?;
            ControlMessage::TouchMove { x: f.x, y: f.y }
        }
        "touchend" => {
            let f: XyFields = serde_json::from_value(value)?;
            ControlMessage::TouchEnd { x: f.x, y: f.y }
        }
        "scroll" => {
            let f: ScrollFields = serde_json::from_value(value)?;
            ControlMessage::Scroll { delta_y: f.delta_y }
        }
        _ => return Ok(None),
    };

    Ok(Some(message))
}

/// Accumulates fractional scroll-wheel deltas into whole XTest button clicks.
///
/// Browsers report scroll input as a continuous `deltaY` in CSS pixels;
/// XTest only understands discrete wheel-button clicks (button 4/5). This
/// keeps a running residual and emits the integer part of it on each
/// `feed`, subtracting back exactly what it emitted so the fractional
/// remainder survives to the next call.
#[derive(Debug, Default)]
pub struct ScrollAccumulator {
    residual: f64,
    /// CSS pixels per wheel click.
    pixels_per_click: f64,
}

impl ScrollAccumulator {
    pub fn new(pixels_per_click: f64) -> Self {
        Self { residual: 0.0, pixels_per_click }
    }

    /// Feed one `deltaY` value, returning the (signed) number of whole
    /// clicks to dispatch now.
    pub fn feed(&mut self, delta_y: f64) -> i64 {
        self.residual += delta_y / self.pixels_per_click;
        let clicks = self.residual.trunc();
        self.residual -= clicks;
        clicks as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_touch_events() {
        assert_eq!(
            parse(r#"{"type":"touchstart","x":1.0,"y":2.0}"#).unwrap(),
            Some(ControlMessage::TouchStart { x: 1.0, y: 2.0 })
        );
        assert_eq!(
            parse(r#"{"type":"touchmove","x":3.0,"y":4.0}"#).unwrap(),
            Some(ControlMessage::TouchMove { x: 3.0, y: 4.0 })
        );
        assert_eq!(
            parse(r#"{"type":"touchend","x":5.0,"y":6.0}"#).unwrap(),
            Some(ControlMessage::TouchEnd { x: 5.0, y: 6.0 })
        );
    }

    #[test]
    fn parses_scroll_event() {
        assert_eq!(
            parse(r#"{"type":"scroll","deltaY":12.5}"#).unwrap(),
            Some(ControlMessage::Scroll { delta_y: 12.5 })
        );
    }

    #[test]
    fn unknown_type_is_ignored_not_errored() {
        assert_eq!(parse(r#"{"type":"pinch","scale":2.0}"#).unwrap(), None);
    }

    #[test]
    fn missing_type_is_ignored() {
        assert_eq!(parse(r#"{"x":1.0,"y":2.0}"#).unwrap(), None);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse("{not json").is_err());
    }

    #[test]
    fn scroll_accumulator_emits_one_click_after_three_tenths() {
        let mut acc = ScrollAccumulator::new(1.0);
        assert_eq!(acc.feed(0.4), 0);
        assert_eq!(acc.feed(0.4), 0);
        assert_eq!(acc.feed(0.4), 1);
    }

    #[test]
    fn scroll_accumulator_handles_large_deltas() {
        let mut acc = ScrollAccumulator::new(1.0);
        assert_eq!(acc.feed(2.7), 2);
        assert_eq!(acc.feed(0.3), 1);
    }

    #[test]
    fn scroll_accumulator_handles_negative_deltas() {
        let mut acc = ScrollAccumulator::new(1.0);
        assert_eq!(acc.feed(-0.6), 0);
        assert_eq!(acc.feed(-0.6), -1);
    }
}
