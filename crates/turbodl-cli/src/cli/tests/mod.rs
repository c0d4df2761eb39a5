//! CLI parse tests.

use super::commands::{human_bytes, parse_headers};
use super::{Cli, CliCommand};
use clap::Parser;
use clap_complete::Shell;
use std::path::PathBuf;

fn parse(args: &[&str]) -> CliCommand {
    let cli = Cli::try_parse_from(args).unwrap();
    cli.command
}

#[test]
fn get_defaults() {
    match parse(&["turbodl", "get", "https://example.com/f.iso"]) {
        CliCommand::Get(args) => {
            assert_eq!(args.link, "https://example.com/f.iso");
            assert_eq!(args.chunks, None);
            assert_eq!(args.dest, None);
            assert_eq!(args.output, None);
            assert!(!args.overwrite);
            assert!(!args.no_fallback);
            assert!(args.headers.is_empty());
            assert_eq!(args.timeout, None);
            assert_eq!(args.sha256, None);
        }
        other => panic!("expected Get, got {other:?}"),
    }
}

#[test]
fn get_all_flags() {
    let cmd = parse(&[
        "turbodl",
        "get",
        "https://example.com/f.iso",
        "-n",
        "16",
        "-d",
        "/tmp/dl",
        "-o",
        "x.iso",
        "--overwrite",
        "--sha256",
        "abcd",
        "--timeout",
        "30",
        "-H",
        "Cookie: a=b",
        "--header",
        "Referer: https://example.com/",
        "--no-fallback",
    ]);
    let CliCommand::Get(args) = cmd else {
        panic!("expected Get");
    };
    assert_eq!(args.chunks, Some(16));
    assert_eq!(args.dest, Some(PathBuf::from("/tmp/dl")));
    assert_eq!(args.output.as_deref(), Some("x.iso"));
    assert!(args.overwrite);
    assert_eq!(args.sha256.as_deref(), Some("abcd"));
    assert_eq!(args.timeout, Some(30));
    assert_eq!(args.headers, vec!["Cookie: a=b", "Referer: https://example.com/"]);
    assert!(args.no_fallback);
}

#[test]
fn get_rejects_zero_and_excessive_chunks() {
    assert!(Cli::try_parse_from(["turbodl", "get", "u", "-n", "0"]).is_err());
    assert!(Cli::try_parse_from(["turbodl", "get", "u", "-n", "65"]).is_err());
}

#[test]
fn get_requires_link() {
    assert!(Cli::try_parse_from(["turbodl", "get"]).is_err());
}

#[test]
fn probe_with_headers() {
    match parse(&["turbodl", "probe", "https://example.com/a", "-H", "X-Token: 1"]) {
        CliCommand::Probe { url, headers } => {
            assert_eq!(url, "https://example.com/a");
            assert_eq!(headers, vec!["X-Token: 1"]);
        }
        other => panic!("expected Probe, got {other:?}"),
    }
}

#[test]
fn checksum_path() {
    match parse(&["turbodl", "checksum", "/tmp/file.bin"]) {
        CliCommand::Checksum { path } => assert_eq!(path, PathBuf::from("/tmp/file.bin")),
        other => panic!("expected Checksum, got {other:?}"),
    }
}

#[test]
fn completions_and_man() {
    match parse(&["turbodl", "completions", "bash"]) {
        CliCommand::Completions { shell } => assert_eq!(shell, Shell::Bash),
        other => panic!("expected Completions, got {other:?}"),
    }
    assert!(matches!(parse(&["turbodl", "man"]), CliCommand::Man));
    assert!(Cli::try_parse_from(["turbodl", "completions", "tcsh"]).is_err());
}

#[test]
fn header_arguments() {
    let parsed = parse_headers(&["Cookie: a=b; c=d".to_string(), "X-A:1".to_string()]).unwrap();
    assert_eq!(
        parsed,
        vec![
            ("Cookie".to_string(), "a=b; c=d".to_string()),
            ("X-A".to_string(), "1".to_string())
        ]
    );
    assert!(parse_headers(&["no colon".to_string()]).is_err());
}

#[test]
fn byte_formatting() {
    assert_eq!(human_bytes(0), "0 B");
    assert_eq!(human_bytes(1023), "1023 B");
    assert_eq!(human_bytes(1024), "1.00 KiB");
    assert_eq!(human_bytes(3 * 1024 * 1024 / 2), "1.50 MiB");
}
