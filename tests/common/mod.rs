#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};

/// A small gradient image, so photometric operations have something to do.
pub fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x + y) % 256) as u8,
        ])
    })
}

pub fn write_png(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    gradient(width, height).save(path).expect("write png file");
}

pub fn write_label(path: &Path, text: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, text).expect("write label file");
}

pub fn read_label(path: &Path) -> String {
    fs::read_to_string(path).expect("read label file")
}

/// Input and output roots of one test dataset.
pub struct Layout {
    pub root: PathBuf,
    pub images: PathBuf,
    pub labels: PathBuf,
    pub out_images: PathBuf,
    pub out_labels: PathBuf,
}

impl Layout {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            images: root.join("in/images"),
            labels: root.join("in/labels"),
            out_images: root.join("out/images"),
            out_labels: root.join("out/labels"),
        }
    }

    /// Add `<name>.png` with an optional label file.
    pub fn add(&self, name: &str, width: u32, height: u32, label: Option<&str>) {
        write_png(&self.images.join(format!("{name}.png")), width, height);
        if let Some(text) = label {
            write_label(&self.labels.join(format!("{name}.txt")), text);
        }
    }

    pub fn masks(&self) -> PathBuf {
        self.root.join("out/masks")
    }

    pub fn out_label(&self, file: &str) -> PathBuf {
        self.out_labels.join(file)
    }

    pub fn out_image(&self, file: &str) -> PathBuf {
        self.out_images.join(file)
    }

    pub fn write_config(&self, yaml: &str) -> PathBuf {
        let path = self.root.join("augment.yaml");
        fs::write(&path, yaml).expect("write config");
        path
    }

    /// `augment` arguments for this layout.
    pub fn augment_args(&self) -> Vec<String> {
        vec![
            "augment".to_string(),
            "--images".to_string(),
            self.images.display().to_string(),
            "--labels".to_string(),
            self.labels.display().to_string(),
            "--out-images".to_string(),
            self.out_images.display().to_string(),
            "--out-labels".to_string(),
            self.out_labels.display().to_string(),
        ]
    }
}

/// A keypoint label line with `slots` points; slot `special` sits at
/// `(sx, sy)`, every other slot at `(0.6, 0.6)`.
pub fn keypoint_line(slots: usize, special: usize, sx: f64, sy: f64) -> String {
    let mut line = String::from("0 0.5 0.5 0.6 0.6");
    for slot in 0..slots {
        let (x, y) = if slot == special { (sx, sy) } else { (0.6, 0.6) };
        line.push_str(&format!(" {x} {y} 2"));
    }
    line.push('\n');
    line
}
