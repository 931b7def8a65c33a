//! Ultralytics-style YOLO label reader and writer.
//!
//! Three line layouts are supported, one per [`LabelKind`]:
//!
//! - box: `class cx cy w h`
//! - polygon: `class x1 y1 x2 y2 ... xn yn` (at least three pairs)
//! - keypoints: `class cx cy w h x1 y1 v1 ... xk yk vk` (one line per file)
//!
//! Box and polygon files are line-tolerant: a malformed line is skipped and
//! recorded in [`DecodedLabels::skipped`]. Keypoint files carry exactly one
//! instance, so any malformation there is a hard error.

use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use super::model::{
    BoxAnnotation, Instance, Keypoint, KeypointsAnnotation, LabelKind, PolygonAnnotation,
    Visibility,
};
use super::{BBoxXYXY, ClassId, Coord};
use crate::error::LabelaugError;

pub const LABEL_EXTENSION: &str = "txt";

/// Result of decoding one label file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedLabels {
    pub instances: Vec<Instance>,
    /// Lines that were dropped as malformed (box and polygon files only).
    pub skipped: Vec<SkippedLine>,
}

/// A malformed line that was skipped during decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number.
    pub line: usize,
    pub message: String,
}

/// Decode label text of the given kind.
///
/// Only keypoint text can fail; box and polygon text always decodes, with
/// malformed lines reported in `skipped`.
pub fn decode(kind: LabelKind, text: &str) -> Result<DecodedLabels, LabelaugError> {
    match kind {
        LabelKind::Box => Ok(decode_lines(text, parse_box_line)),
        LabelKind::Polygon => Ok(decode_lines(text, parse_polygon_line)),
        LabelKind::Keypoints => Ok(DecodedLabels {
            instances: vec![decode_keypoints(text)?.into()],
            skipped: Vec::new(),
        }),
    }
}

/// Decode a keypoint label: exactly one non-empty line.
pub fn decode_keypoints(text: &str) -> Result<KeypointsAnnotation, LabelaugError> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let line = match lines.as_slice() {
        [] => return Err(keypoint_error("label file is empty")),
        [line] => *line,
        more => {
            return Err(keypoint_error(format!(
                "expected exactly one instance per file, found {}",
                more.len()
            )))
        }
    };

    parse_keypoints_line(line).map_err(keypoint_error)
}

/// Encode instances as label text, one newline-terminated line each.
pub fn encode(instances: &[Instance]) -> String {
    let mut out = String::new();
    for instance in instances {
        encode_instance(instance, &mut out);
        out.push('\n');
    }
    out
}

/// Append one instance line (without trailing newline) to `out`.
pub fn encode_instance(instance: &Instance, out: &mut String) {
    match instance {
        Instance::Box(b) => {
            let _ = write!(out, "{}", b.class_id);
            push_cxcywh(out, &b.bbox);
        }
        Instance::Polygon(p) => {
            let _ = write!(out, "{}", p.class_id);
            for v in &p.vertices {
                let _ = write!(out, " {} {}", fixed6(v.x), fixed6(v.y));
            }
        }
        Instance::Keypoints(k) => {
            let _ = write!(out, "{}", k.class_id);
            push_cxcywh(out, &k.bbox);
            for kp in &k.keypoints {
                let _ = write!(
                    out,
                    " {} {} {}",
                    fixed6(kp.position.x),
                    fixed6(kp.position.y),
                    kp.visibility.flag()
                );
            }
        }
    }
}

/// Read and decode a label file.
///
/// A missing file is an empty label for box and polygon datasets and an
/// error for keypoint datasets.
pub fn read_label_file(path: &Path, kind: LabelKind) -> Result<DecodedLabels, LabelaugError> {
    match fs::read_to_string(path) {
        Ok(text) => decode(kind, &text),
        Err(err) if err.kind() == ErrorKind::NotFound => match kind {
            LabelKind::Box | LabelKind::Polygon => Ok(DecodedLabels::default()),
            LabelKind::Keypoints => Err(LabelaugError::MissingKeypointLabel {
                path: path.to_path_buf(),
            }),
        },
        Err(err) => Err(LabelaugError::Io(err)),
    }
}

/// Write instances to a label file, creating parent directories.
///
/// An empty list still produces an (empty) file.
pub fn write_label_file(path: &Path, instances: &[Instance]) -> Result<(), LabelaugError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(LabelaugError::Io)?;
    }
    fs::write(path, encode(instances)).map_err(LabelaugError::Io)
}

fn decode_lines(text: &str, parse: fn(&str) -> Result<Instance, String>) -> DecodedLabels {
    let mut decoded = DecodedLabels::default();
    for (line_idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse(line) {
            Ok(instance) => decoded.instances.push(instance),
            Err(message) => decoded.skipped.push(SkippedLine {
                line: line_idx + 1,
                message,
            }),
        }
    }
    decoded
}

fn parse_box_line(line: &str) -> Result<Instance, String> {
    // Take at most 6 tokens so pathological inputs do not allocate unbounded memory.
    let tokens: Vec<&str> = line.split_whitespace().take(6).collect();
    if tokens.len() < 5 {
        return Err(format!(
            "expected 5 tokens (class cx cy w h), found {}",
            tokens.len()
        ));
    }
    if tokens.len() > 5 {
        return Err(
            "more than 5 tokens; polygon or keypoint rows do not belong in a box label file"
                .to_string(),
        );
    }

    let class_id = parse_class_id(tokens[0])?;
    let (cx, cy, w, h) = parse_cxcywh(&tokens[1..5])?;
    Ok(BoxAnnotation::from_cxcywh(class_id, cx, cy, w, h).into())
}

fn parse_polygon_line(line: &str) -> Result<Instance, String> {
    let mut tokens = line.split_whitespace();
    let class_id = parse_class_id(tokens.next().unwrap_or(""))?;

    let coords = tokens
        .map(|t| parse_f64_token(t, "coordinate"))
        .collect::<Result<Vec<f64>, String>>()?;
    if coords.len() % 2 != 0 {
        return Err(format!(
            "polygon has an odd number of coordinates ({})",
            coords.len()
        ));
    }
    if coords.len() / 2 < PolygonAnnotation::MIN_VERTICES {
        return Err(format!(
            "polygon needs at least {} points, found {}",
            PolygonAnnotation::MIN_VERTICES,
            coords.len() / 2
        ));
    }

    let vertices = coords
        .chunks_exact(2)
        .map(|pair| Coord::new(pair[0], pair[1]))
        .collect();
    Ok(PolygonAnnotation::new(class_id, vertices).into())
}

fn parse_keypoints_line(line: &str) -> Result<KeypointsAnnotation, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 5 {
        return Err(format!(
            "expected at least 5 tokens (class cx cy w h), found {}",
            tokens.len()
        ));
    }

    let class_id = parse_class_id(tokens[0])?;
    let (cx, cy, w, h) = parse_cxcywh(&tokens[1..5])?;

    let tail = &tokens[5..];
    if tail.len() % 3 != 0 {
        return Err(format!(
            "keypoint tail has {} values, expected a multiple of 3 (x y v)",
            tail.len()
        ));
    }

    let keypoints = tail
        .chunks_exact(3)
        .map(|triple| {
            let x = parse_f64_token(triple[0], "keypoint x")?;
            let y = parse_f64_token(triple[1], "keypoint y")?;
            let visibility = parse_visibility(triple[2])?;
            Ok(Keypoint::new(x, y, visibility))
        })
        .collect::<Result<Vec<_>, String>>()?;

    Ok(KeypointsAnnotation::new(
        class_id,
        BBoxXYXY::from_cxcywh(cx, cy, w, h),
        keypoints,
    ))
}

fn parse_cxcywh(tokens: &[&str]) -> Result<(f64, f64, f64, f64), String> {
    let cx = parse_f64_token(tokens[0], "x_center")?;
    let cy = parse_f64_token(tokens[1], "y_center")?;
    let w = parse_f64_token(tokens[2], "width")?;
    let h = parse_f64_token(tokens[3], "height")?;
    if w <= 0.0 || h <= 0.0 {
        return Err(format!("box width and height must be positive, got {w} x {h}"));
    }
    Ok((cx, cy, w, h))
}

fn parse_class_id(raw: &str) -> Result<ClassId, String> {
    raw.parse::<u32>()
        .map(ClassId::new)
        .map_err(|_| format!("invalid class_id '{raw}'; expected non-negative integer"))
}

fn parse_f64_token(raw: &str, field_name: &str) -> Result<f64, String> {
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(format!(
            "invalid {field_name} '{raw}'; expected finite floating-point number"
        )),
    }
}

fn parse_visibility(raw: &str) -> Result<Visibility, String> {
    // Writers disagree on "2" vs "2.0"; accept any integral spelling.
    let value = parse_f64_token(raw, "visibility")?;
    if value.fract() == 0.0 && (0.0..=2.0).contains(&value) {
        if let Some(v) = Visibility::from_flag(value as u8) {
            return Ok(v);
        }
    }
    Err(format!("invalid visibility '{raw}'; expected 0, 1 or 2"))
}

fn keypoint_error(message: impl Into<String>) -> LabelaugError {
    LabelaugError::KeypointLabel {
        message: message.into(),
    }
}

fn push_cxcywh<T>(out: &mut String, bbox: &BBoxXYXY<T>) {
    let (cx, cy, w, h) = bbox.to_cxcywh();
    let _ = write!(
        out,
        " {} {} {} {}",
        fixed6(cx),
        fixed6(cy),
        fixed6(w),
        fixed6(h)
    );
}

/// Six-decimal fixed formatting without a `-0.000000` artifact.
fn fixed6(value: f64) -> String {
    let s = format!("{:.6}", value);
    if s == "-0.000000" {
        "0.000000".to_string()
    } else {
        s
    }
}

/// Fuzz-only entrypoint for label decoding.
#[cfg(feature = "fuzzing")]
pub fn fuzz_decode(kind: LabelKind, input: &str) -> Result<(), LabelaugError> {
    let decoded = decode(kind, input)?;
    let _ = encode(&decoded.instances);
    Ok(())
}
