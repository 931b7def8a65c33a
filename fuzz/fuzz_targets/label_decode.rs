//! Fuzz target for YOLO label decoding.
//!
//! The first byte picks the label layout; the rest is fed to the decoder
//! as label text, checking for panics, crashes, or hangs.

#![no_main]

use labelaug::ir::io_yolo::fuzz_decode;
use labelaug::ir::LabelKind;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let kind = match selector % 3 {
        0 => LabelKind::Box,
        1 => LabelKind::Polygon,
        _ => LabelKind::Keypoints,
    };
    let Ok(text) = std::str::from_utf8(rest) else {
        return;
    };

    let _ = fuzz_decode(kind, text);
});
