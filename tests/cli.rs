use assert_cmd::Command;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_root(tag: &str) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time should move forward")
        .as_nanos();
    let root = std::env::temp_dir().join(format!("retroasm-cli-{tag}-{unique}"));
    std::fs::create_dir_all(&root).expect("failed to create temp root");
    root
}

fn retroasm() -> Command {
    Command::new(env!("CARGO_BIN_EXE_retroasm"))
}

#[test]
fn no_args_prints_banner_and_help() {
    retroasm()
        .assert()
        .success()
        .stdout(contains("retroasm, version"))
        .stdout(contains("Usage: retroasm"))
        .stdout(contains("build"))
        .stdout(contains("check"))
        .stdout(contains("labels"));
}

#[test]
fn help_flag_prints_help() {
    retroasm()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("Multi-target assembler"))
        .stdout(contains("--log-level"));
}

#[test]
fn build_writes_the_written_range() {
    let root = temp_root("build");
    let input = root.join("demo.asm");
    std::fs::write(&input, ".ORG $8000\nstart: lda #$01\n  jmp start\n").expect("failed to write input");
    let out_file = root.join("demo.bin");

    retroasm()
        .args(["build", "-p", "6502"])
        .arg(&input)
        .assert()
        .success();

    let bytes = std::fs::read(&out_file).expect("output should exist");
    assert_eq!(bytes, vec![0xA9, 0x01, 0x4C, 0x00, 0x80]);
}

#[test]
fn build_fills_gaps_and_honours_output_path() {
    let root = temp_root("fill");
    let input = root.join("gaps.asm");
    std::fs::write(&input, ".ORG 2\n.DB 1\n.BASE 5\n.DB 2\n").expect("failed to write input");
    let out_file = root.join("custom.bin");

    retroasm()
        .arg("build")
        .arg(&input)
        .arg("-o")
        .arg(&out_file)
        .args(["--fill", "255"])
        .assert()
        .success();

    let bytes = std::fs::read(&out_file).expect("output should exist");
    assert_eq!(bytes, vec![1, 0xFF, 0xFF, 2]);
}

#[test]
fn second_org_keeps_the_physical_offset() {
    let root = temp_root("org");
    let input = root.join("remap.asm");
    std::fs::write(&input, ".ORG 2\n.DB 1\n.ORG $C000\nhere: .DW here\n").expect("failed to write input");

    retroasm().arg("build").arg(&input).assert().success();

    let bytes = std::fs::read(root.join("remap.bin")).expect("output should exist");
    assert_eq!(bytes, vec![1, 0x00, 0xC0]);
}

#[test]
fn build_reads_the_project_manifest() {
    let root = temp_root("manifest");
    std::fs::create_dir_all(root.join("inc")).expect("failed to create include dir");
    std::fs::write(
        root.join("retroasm.toml"),
        "[build]\nplatform = \"gb\"\ninclude = [\"inc\"]\noutput = \"rom.gb\"\n",
    )
    .expect("failed to write manifest");
    std::fs::write(root.join("inc/header.asm"), "nop\n").expect("failed to write include");
    let input = root.join("main.asm");
    std::fs::write(&input, ".INCLUDE \"header.asm\"\nhalt\n").expect("failed to write input");

    retroasm().arg("build").arg(&input).assert().success();

    let bytes = std::fs::read(root.join("rom.gb")).expect("output should exist");
    assert_eq!(bytes, vec![0x00, 0x76]);
}

#[test]
fn manifest_with_unknown_keys_is_rejected() {
    let root = temp_root("bad-manifest");
    std::fs::write(root.join("retroasm.toml"), "[build]\nturbo = true\n").expect("failed to write manifest");
    let input = root.join("main.asm");
    std::fs::write(&input, "nop\n").expect("failed to write input");

    retroasm()
        .arg("build")
        .arg(&input)
        .assert()
        .failure()
        .stderr(contains("failed to parse").and(contains("turbo")));
}

#[test]
fn build_errors_are_rendered_and_fail() {
    let root = temp_root("error");
    let input = root.join("broken.asm");
    std::fs::write(&input, ".DB missing\n").expect("failed to write input");

    retroasm()
        .arg("build")
        .arg(&input)
        .assert()
        .failure()
        .stderr(contains("missing"));
    assert!(!root.join("broken.bin").exists());
}

#[test]
fn warnings_do_not_fail_the_build() {
    let root = temp_root("warning");
    let input = root.join("wide.asm");
    std::fs::write(&input, ".DB 300\n").expect("failed to write input");

    retroasm()
        .arg("build")
        .arg(&input)
        .assert()
        .success()
        .stderr(contains("does not fit"));
    let bytes = std::fs::read(root.join("wide.bin")).expect("output should exist");
    assert_eq!(bytes, vec![0x2C]);
}

#[test]
fn messages_are_logged() {
    let root = temp_root("msg");
    let input = root.join("msg.asm");
    std::fs::write(&input, ".MSG \"size is {0}\", 12\n").expect("failed to write input");

    retroasm()
        .arg("build")
        .arg(&input)
        .assert()
        .success()
        .stderr(contains("size is 12"));
}

#[test]
fn check_walks_directories() {
    let root = temp_root("check");
    std::fs::write(root.join("a.asm"), ".MACRO pad n\n.DB n\n.ENDM\n").expect("failed to write a");
    std::fs::write(root.join("b.asm"), "pad 1\n").expect("failed to write b");
    std::fs::write(root.join("notes.txt"), "not assembly").expect("failed to write notes");

    retroasm()
        .arg("check")
        .arg(&root)
        .assert()
        .success()
        .stdout(contains("2 file(s) checked"));
}

#[test]
fn check_reports_errors() {
    let root = temp_root("check-error");
    let input = root.join("bad.asm");
    std::fs::write(&input, "frobnicate 3\n").expect("failed to write input");

    retroasm()
        .arg("check")
        .arg(&input)
        .assert()
        .failure()
        .stderr(contains("frobnicate"));
}

#[test]
fn labels_lists_resolved_values() {
    let root = temp_root("labels");
    let input = root.join("labels.asm");
    std::fs::write(&input, ".ORG $C000\nreset: nop\n.DEF answer 42\n").expect("failed to write input");

    retroasm()
        .args(["labels", "-p", "6502"])
        .arg(&input)
        .assert()
        .success()
        .stdout(contains("answer").and(contains("$002A")))
        .stdout(contains("reset").and(contains("$C000")));
}

#[test]
fn unknown_platforms_are_rejected() {
    let root = temp_root("platform");
    let input = root.join("x.asm");
    std::fs::write(&input, "nop\n").expect("failed to write input");

    retroasm()
        .args(["build", "-p", "z80"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(contains("unknown platform"));
}
