//! Input sanitizer (C1).
//!
//! Every inbound message crosses this module before touching any other
//! component. Operations here never fail — they return a well-formed
//! value or drop the offending field. This is the only module permitted
//! to silently coerce.

use serde_json::Value;

use crate::entity::{AudioFrame, Entity};
use crate::protocol_constants::BAND_COUNT;

/// Returns `default` if `v` is not a finite number; otherwise clamps to `[lo, hi]`.
pub fn clamp_finite(v: f64, lo: f64, hi: f64, default: f64) -> f64 {
    if !v.is_finite() {
        return default;
    }
    v.clamp(lo, hi)
}

fn num(value: &Value) -> Option<f64> {
    value.as_f64()
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Null => false,
    }
}

/// Coerces a raw `dj_audio_frame` JSON payload into a well-formed [`AudioFrame`].
///
/// - `bands` is coerced to exactly [`BAND_COUNT`] floats in `[0,1]`
///   (truncating longer lists, padding with 0).
/// - `peak` / `beat_i` / `instant_bass` clamp to `[0,5]`.
/// - `bpm` clamps to `[0,300]`.
/// - `tempo_conf` / `beat_phase` clamp to `[0,1]`.
/// - `seq` coerces to a non-negative integer.
/// - booleans use JSON-truthy semantics.
/// - `ts`, if present and numeric, is preserved unmodified (latency math
///   validates it separately).
pub fn sanitize_audio_frame(msg: &Value) -> AudioFrame {
    let mut bands = [0.0f64; BAND_COUNT];
    if let Some(arr) = msg.get("bands").and_then(Value::as_array) {
        for (i, slot) in bands.iter_mut().enumerate() {
            if let Some(v) = arr.get(i).and_then(num) {
                *slot = clamp_finite(v, 0.0, 1.0, 0.0);
            }
        }
    }

    let peak = msg
        .get("peak")
        .and_then(num)
        .map(|v| clamp_finite(v, 0.0, 5.0, 0.0))
        .unwrap_or(0.0);
    let beat_intensity = msg
        .get("beat_i")
        .and_then(num)
        .map(|v| clamp_finite(v, 0.0, 5.0, 0.0))
        .unwrap_or(0.0);
    let instant_bass = msg
        .get("i_bass")
        .and_then(num)
        .map(|v| clamp_finite(v, 0.0, 5.0, 0.0))
        .unwrap_or(0.0);
    let bpm = msg
        .get("bpm")
        .and_then(num)
        .map(|v| clamp_finite(v, 0.0, 300.0, 120.0))
        .unwrap_or(120.0);
    let tempo_confidence = msg
        .get("tempo_conf")
        .and_then(num)
        .map(|v| clamp_finite(v, 0.0, 1.0, 0.0))
        .unwrap_or(0.0);
    let beat_phase = msg
        .get("beat_phase")
        .and_then(num)
        .map(|v| clamp_finite(v, 0.0, 1.0, 0.0))
        .unwrap_or(0.0);
    let seq = msg
        .get("seq")
        .and_then(num)
        .map(|v| if v.is_finite() && v >= 0.0 { v as u64 } else { 0 })
        .unwrap_or(0);
    let beat = msg.get("beat").map(truthy).unwrap_or(false);
    let instant_kick = msg.get("i_kick").map(truthy).unwrap_or(false);
    let ts = msg.get("ts").and_then(num);

    AudioFrame {
        bands,
        peak,
        beat,
        beat_intensity,
        bpm,
        tempo_confidence,
        beat_phase,
        instant_bass,
        instant_kick,
        seq,
        ts,
    }
}

/// Enforces max cardinality and per-field bounds on a list of raw entity
/// JSON values, silently dropping malformed elements.
///
/// Requires a non-empty string `id`; clamps coordinates to `[0,1]`, scale
/// to `[0,4]`, brightness/interpolation to their ranges, rotation to
/// `[0,360]`; passes booleans and material string through unchanged.
pub fn sanitize_entities(raw: &[Value], max_count: usize) -> Vec<Entity> {
    let mut out = Vec::with_capacity(raw.len().min(max_count));
    for value in raw {
        if out.len() >= max_count {
            break;
        }
        let Some(id) = value.get("id").and_then(Value::as_str) else {
            continue;
        };
        if id.is_empty() {
            continue;
        }

        let x = value
            .get("x")
            .and_then(num)
            .map(|v| clamp_finite(v, 0.0, 1.0, 0.5))
            .unwrap_or(0.5);
        let y = value
            .get("y")
            .and_then(num)
            .map(|v| clamp_finite(v, 0.0, 1.0, 0.5))
            .unwrap_or(0.5);
        let z = value
            .get("z")
            .and_then(num)
            .map(|v| clamp_finite(v, 0.0, 1.0, 0.5))
            .unwrap_or(0.5);
        let scale = value
            .get("scale")
            .and_then(num)
            .map(|v| clamp_finite(v, 0.0, 4.0, 1.0))
            .unwrap_or(1.0);
        let rotation = value
            .get("rotation")
            .and_then(num)
            .map(|v| clamp_finite(v, 0.0, 360.0, 0.0));
        let brightness = value
            .get("brightness")
            .and_then(num)
            .map(|v| clamp_finite(v, 0.0, 15.0, 15.0) as u8)
            .unwrap_or(15);
        let interpolation = value
            .get("interpolation")
            .and_then(num)
            .map(|v| clamp_finite(v, 0.0, 100.0, 0.0) as u8)
            .unwrap_or(0);
        let glow = value.get("glow").map(truthy).unwrap_or(false);
        let visible = value.get("visible").map(truthy).unwrap_or(true);
        let material = value
            .get("material")
            .and_then(Value::as_str)
            .map(String::from);

        out.push(Entity {
            id: id.to_string(),
            x,
            y,
            z,
            scale,
            rotation,
            brightness,
            interpolation,
            glow,
            visible,
            material,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clamp_finite_falls_back_on_nan() {
        assert_eq!(clamp_finite(f64::NAN, 0.0, 1.0, 0.3), 0.3);
    }

    #[test]
    fn clamp_finite_clamps_in_range_value() {
        assert_eq!(clamp_finite(5.0, 0.0, 1.0, 0.0), 1.0);
        assert_eq!(clamp_finite(-5.0, 0.0, 1.0, 0.0), 0.0);
    }

    #[test]
    fn sanitize_audio_frame_clamps_scenario_s3() {
        let msg = json!({
            "bands": [-1, 0.5, 2, f64::NAN, 0.3],
            "peak": 100,
            "bpm": 500,
            "tempo_conf": "oops",
            "beat_phase": 1.3,
        });
        let frame = sanitize_audio_frame(&msg);
        assert_eq!(frame.bands, [0.0, 0.5, 1.0, 0.0, 0.3]);
        assert_eq!(frame.peak, 5.0);
        assert_eq!(frame.bpm, 300.0);
        assert_eq!(frame.tempo_confidence, 0.0);
        assert_eq!(frame.beat_phase, 1.0);
    }

    #[test]
    fn sanitize_audio_frame_pads_short_bands() {
        let msg = json!({"bands": [0.2]});
        let frame = sanitize_audio_frame(&msg);
        assert_eq!(frame.bands, [0.2, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn sanitize_entities_drops_missing_id() {
        let raw = vec![json!({"x": 0.5}), json!({"id": "e1", "x": 2.0})];
        let out = sanitize_entities(&raw, 10);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "e1");
        assert_eq!(out[0].x, 1.0);
    }

    #[test]
    fn sanitize_entities_enforces_max_count() {
        let raw: Vec<Value> = (0..5).map(|i| json!({"id": format!("e{i}")})).collect();
        let out = sanitize_entities(&raw, 3);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn sanitize_entities_rejects_empty_id() {
        let raw = vec![json!({"id": ""})];
        assert!(sanitize_entities(&raw, 10).is_empty());
    }
}
