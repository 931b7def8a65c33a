use std::fs;

use assert_cmd::Command;

mod common;
use common::{keypoint_line, read_label, Layout};

const FLIP_ONLY: &str = "\
variants: 1
seed: 7
transform_sets:
  - name: flip
    ops:
      - op: horizontal_flip
";

#[test]
fn runs() {
    let mut cmd = Command::cargo_bin("labelaug").unwrap();
    cmd.assert().success();
}

#[test]
fn outputs_tool_name() {
    let mut cmd = Command::cargo_bin("labelaug").unwrap();
    cmd.arg("-V");
    cmd.assert().success().stdout("labelaug 0.1.0\n");
}

// Augment subcommand tests

#[test]
fn augment_writes_originals_and_variants() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let layout = Layout::new(temp.path());
    layout.add("cat", 40, 20, Some("0 0.5 0.5 0.4 0.4\n"));
    layout.add("dog", 32, 32, None);

    let mut cmd = Command::cargo_bin("labelaug").unwrap();
    cmd.args(layout.augment_args())
        .args(["--variants", "2", "--seed", "1"]);
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("Augmented 2/2 source(s)"))
        .stdout(predicates::str::contains("4 variant(s) written"));

    for name in ["cat", "cat_aug1", "cat_aug2", "dog", "dog_aug1", "dog_aug2"] {
        assert!(layout.out_image(&format!("{name}.png")).is_file(), "{name}.png");
        assert!(layout.out_label(&format!("{name}.txt")).is_file(), "{name}.txt");
    }
    assert_eq!(read_label(&layout.out_label("cat.txt")), "0 0.5 0.5 0.4 0.4\n");
    assert_eq!(read_label(&layout.out_label("dog.txt")), "");
}

#[test]
fn augment_json_output_format() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let layout = Layout::new(temp.path());
    layout.add("cat", 24, 24, Some("0 0.5 0.5 0.4 0.4\n"));

    let mut cmd = Command::cargo_bin("labelaug").unwrap();
    cmd.args(layout.augment_args())
        .args(["--seed", "3", "--output", "json"]);
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("\"variants_written\": 1"))
        .stdout(predicates::str::contains("\"seed\": 3"));
}

#[test]
fn horizontal_flip_keeps_centered_box() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let layout = Layout::new(temp.path());
    layout.add("cat", 40, 20, Some("0 0.5 0.5 0.4 0.4\n"));
    let config = layout.write_config(FLIP_ONLY);

    let mut cmd = Command::cargo_bin("labelaug").unwrap();
    cmd.args(layout.augment_args())
        .arg("--config")
        .arg(&config);
    cmd.assert().success();

    assert_eq!(
        read_label(&layout.out_label("cat_aug1.txt")),
        "0 0.500000 0.500000 0.400000 0.400000\n"
    );
}

#[test]
fn config_from_environment_variable() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let layout = Layout::new(temp.path());
    layout.add("cat", 40, 20, Some("0 0.2 0.5 0.2 0.4\n"));
    let config = layout.write_config(FLIP_ONLY);

    let mut cmd = Command::cargo_bin("labelaug").unwrap();
    cmd.args(layout.augment_args()).env("LABELAUG_CONFIG", &config);
    cmd.assert().success();

    assert_eq!(
        read_label(&layout.out_label("cat_aug1.txt")),
        "0 0.800000 0.500000 0.200000 0.400000\n"
    );
}

#[test]
fn name_based_suffixes() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let layout = Layout::new(temp.path());
    layout.add("cat", 16, 16, Some("0 0.5 0.5 0.4 0.4\n"));
    let config = layout.write_config(FLIP_ONLY);

    let mut cmd = Command::cargo_bin("labelaug").unwrap();
    cmd.args(layout.augment_args())
        .arg("--config")
        .arg(&config)
        .args(["--naming", "name", "--original-suffix", "_orig"]);
    cmd.assert().success();

    assert!(layout.out_image("cat_orig.png").is_file());
    assert!(layout.out_label("cat_aug_flip.txt").is_file());
}

#[test]
fn box_translated_out_of_frame_leaves_empty_label() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let layout = Layout::new(temp.path());
    layout.add("cat", 32, 32, Some("0 0.5 0.5 0.2 0.2\n"));
    let config = layout.write_config(
        "\
seed: 1
transform_sets:
  - name: away
    ops:
      - op: affine
        translate: [0.9, 0.9]
",
    );

    let mut cmd = Command::cargo_bin("labelaug").unwrap();
    cmd.args(layout.augment_args())
        .arg("--config")
        .arg(&config);
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("boxes 0/1 kept"));

    assert!(layout.out_image("cat_aug1.png").is_file());
    assert_eq!(read_label(&layout.out_label("cat_aug1.txt")), "");
}

#[test]
fn keypoint_leaving_frame_is_hidden_in_place() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let layout = Layout::new(temp.path());
    layout.add("pose", 50, 50, Some(&keypoint_line(17, 5, 0.2, 0.2)));
    let config = layout.write_config(
        "\
seed: 1
transform_sets:
  - name: shift
    ops:
      - op: affine
        translate: [-0.3, -0.3]
",
    );

    let mut cmd = Command::cargo_bin("labelaug").unwrap();
    cmd.args(layout.augment_args())
        .args(["--kind", "keypoints", "--config"])
        .arg(&config);
    cmd.assert().success();

    let text = read_label(&layout.out_label("pose_aug1.txt"));
    let tokens: Vec<&str> = text.split_whitespace().collect();
    assert_eq!(tokens.len(), 5 + 17 * 3);
    // Slot 5 starts after the class, the box and five (x y v) triples.
    assert_eq!(&tokens[20..23], &["0.000000", "0.000000", "0"]);
    // Slot 0 moved from 0.6 to 0.3 and stays visible.
    assert_eq!(&tokens[5..8], &["0.300000", "0.300000", "2"]);
}

#[test]
fn missing_keypoint_label_skips_sample() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let layout = Layout::new(temp.path());
    layout.add("pose", 16, 16, None);

    let mut cmd = Command::cargo_bin("labelaug").unwrap();
    cmd.args(layout.augment_args())
        .args(["--kind", "keypoints", "--seed", "1"]);
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("Skipped (1):"));

    let mut strict = Command::cargo_bin("labelaug").unwrap();
    strict
        .args(layout.augment_args())
        .args(["--kind", "keypoints", "--seed", "1", "--strict"]);
    strict
        .assert()
        .failure()
        .stderr(predicates::str::contains("skipped"));
}

#[test]
fn polygon_run_writes_masks() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let layout = Layout::new(temp.path());
    layout.add(
        "leaf",
        40,
        40,
        Some("2 0.2 0.2 0.8 0.2 0.8 0.8 0.2 0.8\n"),
    );
    let config = layout.write_config(FLIP_ONLY);

    let mut cmd = Command::cargo_bin("labelaug").unwrap();
    cmd.args(layout.augment_args())
        .args(["--kind", "polygon", "--config"])
        .arg(&config);
    cmd.assert().success();

    let masks = layout.masks();
    assert!(masks.join("leaf.png").is_file());
    assert!(masks.join("leaf_aug1.png").is_file());

    let mask = image::open(masks.join("leaf_aug1.png"))
        .expect("open mask")
        .to_luma8();
    assert_eq!(mask.get_pixel(20, 20).0[0], 3);
    assert_eq!(mask.get_pixel(1, 1).0[0], 0);
    let text = read_label(&layout.out_label("leaf_aug1.txt"));
    assert_eq!(text.lines().count(), 1);
    assert!(text.starts_with("2 "));
}

#[test]
fn zero_variants_is_rejected() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let layout = Layout::new(temp.path());
    layout.add("cat", 16, 16, None);

    let mut cmd = Command::cargo_bin("labelaug").unwrap();
    cmd.args(layout.augment_args()).args(["--variants", "0"]);
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("variants must be at least 1"));
    assert!(!layout.out_images.exists());
}

#[test]
fn unknown_config_key_is_rejected() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let layout = Layout::new(temp.path());
    layout.add("cat", 16, 16, None);
    let config = layout.write_config("variant: 2\n");

    let mut cmd = Command::cargo_bin("labelaug").unwrap();
    cmd.args(layout.augment_args())
        .arg("--config")
        .arg(&config);
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("unknown field"));
}

#[test]
fn same_seed_gives_identical_output() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let first = Layout::new(&temp.path().join("a"));
    let second = Layout::new(&temp.path().join("b"));
    for layout in [&first, &second] {
        layout.add("cat", 48, 32, Some("0 0.3 0.4 0.2 0.3\n1 0.7 0.6 0.3 0.2\n"));
        layout.add("dog", 32, 48, Some("2 0.5 0.5 0.5 0.5\n"));
        let mut cmd = Command::cargo_bin("labelaug").unwrap();
        cmd.args(layout.augment_args())
            .args(["--variants", "5", "--seed", "99", "--jobs", "2"]);
        cmd.assert().success();
    }

    for stem in ["cat", "dog"] {
        for variant in 1..=5 {
            let file = format!("{stem}_aug{variant}");
            assert_eq!(
                read_label(&first.out_label(&format!("{file}.txt"))),
                read_label(&second.out_label(&format!("{file}.txt"))),
                "{file}.txt"
            );
            assert_eq!(
                fs::read(first.out_image(&format!("{file}.png"))).expect("read image"),
                fs::read(second.out_image(&format!("{file}.png"))).expect("read image"),
                "{file}.png"
            );
        }
    }
}

// Check subcommand tests

#[test]
fn check_valid_labels_succeeds() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::write_label(&temp.path().join("a.txt"), "0 0.5 0.5 0.2 0.2\n");

    let mut cmd = Command::cargo_bin("labelaug").unwrap();
    cmd.arg("check").arg(temp.path());
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("Checked 1 box label file(s)"));
}

#[test]
fn check_strict_fails_on_skipped_lines() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::write_label(&temp.path().join("a.txt"), "0 0.5 0.5 0.2\n");

    let mut lenient = Command::cargo_bin("labelaug").unwrap();
    lenient.arg("check").arg(temp.path());
    lenient
        .assert()
        .success()
        .stdout(predicates::str::contains("[WARN ] a.txt:1"));

    let mut strict = Command::cargo_bin("labelaug").unwrap();
    strict.arg("check").arg(temp.path()).arg("--strict");
    strict.assert().failure();
}

#[test]
fn check_keypoints_reports_bad_files() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::write_label(&temp.path().join("two.txt"), "0 0.5 0.5 0.2 0.2\n0 0.5 0.5 0.2 0.2\n");

    let mut cmd = Command::cargo_bin("labelaug").unwrap();
    cmd.args(["check", "--kind", "keypoints", "--output", "json"])
        .arg(temp.path());
    cmd.assert()
        .failure()
        .stdout(predicates::str::contains("\"file\": \"two.txt\""));
}
