use std::fs;
use std::path::{Path, PathBuf};

use tempfile::tempdir;

const TINY: &[u8] = include_bytes!("fixtures/tiny.wasm");

/// helper: push rbp; call run; ret; hlt -- stub padding -- run: xor eax, eax; ret
const CODE: &[u8] = &[
    0x55, 0xe8, 0x0a, 0x00, 0x00, 0x00, 0xc3, 0xf4, // helper
    0xf4, 0xf4, 0xf4, 0xf4, 0xf4, 0xf4, 0xf4, 0xf4, // stub
    0x31, 0xc0, 0xc3, // run
];

const SEGMENTS: &str = r#"[
	{ "kind": 0, "begin": 0, "end": 8, "funcIndex": 1, "funcBodyBegin": 0, "funcBodyEnd": 8 },
	{ "kind": 1, "begin": 8, "end": 16 },
	{ "kind": 0, "begin": 16, "end": 19, "funcIndex": 2, "funcBodyBegin": 16, "funcBodyEnd": 19 }
]"#;

const FULL_REPORT: &str = "\
// helper#1 @ 00000000
//    native size 8 byte(s)
//    wasm size 6 byte(s)
//    wasm locals:
//      i32 x2
//      f64 x1
00000000  push rbp
00000001  call 0x00000010 (run + 0x0000)
00000006  ret
...
// end of helper @ 00000008

// run#2 @ 00000010
//    native size 3 byte(s)
//    wasm size 2 byte(s)
00000010  xor eax, eax
00000012  ret
// end of run @ 00000013

";

/// Lay out `DIR/tiny.{wasm,bin,segments.json}` and return the prefix.
fn prebuilt(dir: &Path) -> PathBuf {
    fs::write(dir.join("tiny.wasm"), TINY).expect("write wasm");
    fs::write(dir.join("tiny.bin"), CODE).expect("write bin");
    fs::write(dir.join("tiny.segments.json"), SEGMENTS).expect("write segments");
    dir.join("tiny")
}

#[test]
fn prebuilt_inputs_produce_full_report() {
    let dir = tempdir().expect("tempdir");
    let prefix = prebuilt(dir.path());
    let out = dir.path().join("out");

    let assert = assert_cmd::cargo::cargo_bin_cmd!("wasmdis")
        .arg(&prefix)
        .arg(&out)
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(stdout.contains("Complete. Results written to"), "{stdout}");

    let report = fs::read_to_string(out.join("disassembly.txt")).expect("read report");
    assert_eq!(report, FULL_REPORT);
}

#[test]
fn filter_limits_report_to_matching_functions() {
    let dir = tempdir().expect("tempdir");
    let prefix = prebuilt(dir.path());
    let out = dir.path().join("out");

    assert_cmd::cargo::cargo_bin_cmd!("wasmdis")
        .arg(&prefix)
        .arg(&out)
        .arg("RUN")
        .assert()
        .success();

    let report = fs::read_to_string(out.join("disassembly.txt")).expect("read report");
    assert!(report.starts_with("// run#2 @ 00000010\n"), "{report}");
    assert!(!report.contains("helper"));
}

#[test]
fn blank_filter_is_ignored() {
    let dir = tempdir().expect("tempdir");
    let prefix = prebuilt(dir.path());
    let out = dir.path().join("out");

    assert_cmd::cargo::cargo_bin_cmd!("wasmdis")
        .arg(&prefix)
        .arg(&out)
        .arg("  ")
        .assert()
        .success();

    let report = fs::read_to_string(out.join("disassembly.txt")).expect("read report");
    assert_eq!(report, FULL_REPORT);
}

#[test]
fn missing_binary_fails() {
    let dir = tempdir().expect("tempdir");

    let assert = assert_cmd::cargo::cargo_bin_cmd!("wasmdis")
        .arg(dir.path().join("nothing"))
        .arg(dir.path().join("out"))
        .assert()
        .failure();

    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("binary not found"), "{stderr}");
}

#[test]
fn malformed_segments_fail() {
    let dir = tempdir().expect("tempdir");
    let prefix = prebuilt(dir.path());
    fs::write(dir.path().join("tiny.segments.json"), r#"[{ "kind": 0, "begin": 0, "end": "x" }]"#)
        .expect("overwrite segments");

    let assert = assert_cmd::cargo::cargo_bin_cmd!("wasmdis")
        .arg(&prefix)
        .arg(dir.path().join("out"))
        .assert()
        .failure();

    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("segment"), "{stderr}");
}

#[test]
fn invalid_filter_fails() {
    let dir = tempdir().expect("tempdir");
    let prefix = prebuilt(dir.path());

    assert_cmd::cargo::cargo_bin_cmd!("wasmdis")
        .arg(&prefix)
        .arg(dir.path().join("out"))
        .arg("(unclosed")
        .assert()
        .failure();
}

/// Compiling a module goes through the shell named by WASMDIS_SPIDERMONKEY.
/// The stand-in shell copies the prebuilt artifacts to the requested prefix.
#[cfg(unix)]
#[test]
fn module_input_is_compiled_with_spidermonkey() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().expect("tempdir");
    let prebuilt_dir = dir.path().join("prebuilt");
    fs::create_dir_all(&prebuilt_dir).expect("mkdir");
    prebuilt(&prebuilt_dir);

    let shell = dir.path().join("sm");
    fs::write(
        &shell,
        format!(
            "#!/bin/sh\ncp '{bin}' \"$3.bin\"\ncp '{seg}' \"$3.segments.json\"\n",
            bin = prebuilt_dir.join("tiny.bin").display(),
            seg = prebuilt_dir.join("tiny.segments.json").display(),
        ),
    )
    .expect("write shell");
    fs::set_permissions(&shell, fs::Permissions::from_mode(0o755)).expect("chmod");

    let out = dir.path().join("out");
    assert_cmd::cargo::cargo_bin_cmd!("wasmdis")
        .env("WASMDIS_SPIDERMONKEY", &shell)
        .arg(prebuilt_dir.join("tiny.wasm"))
        .arg(&out)
        .args(["--tier", "baseline"])
        .assert()
        .success();

    assert!(out.join("wasm.bin").is_file());
    assert!(out.join("spidermonkey-driver.js").is_file());
    let report = fs::read_to_string(out.join("disassembly.txt")).expect("read report");
    assert_eq!(report, FULL_REPORT);
}
