use std::path::{Path, PathBuf};

use clap::Parser;
use png_itxt::{Cli, TextKind, TextQuery, get_text, run};

const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

fn frame(tag: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(tag);
    hasher.update(data);

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&(data.len() as u32).to_be_bytes());
    bytes.extend_from_slice(tag);
    bytes.extend_from_slice(data);
    bytes.extend_from_slice(&hasher.finalize().to_be_bytes());
    bytes
}

fn sample_png() -> Vec<u8> {
    [
        SIGNATURE.to_vec(),
        frame(b"IHDR", &[0, 0, 0, 1, 0, 0, 0, 1, 8, 6, 0, 0, 0]),
        frame(b"tEXt", b"Title\0Example"),
        frame(b"IEND", b""),
    ]
    .concat()
}

/// Fresh directory under the system temp dir holding `image.png`
fn workspace(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("png-itxt-{}-{name}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(dir.join("sub")).unwrap();
    std::fs::write(dir.join("image.png"), sample_png()).unwrap();
    dir
}

async fn run_args(args: &[&str]) -> anyhow::Result<()> {
    run(Cli::try_parse_from(args)?).await
}

async fn lookup(path: &Path, query: TextQuery) -> Option<png_itxt::TextRecord> {
    let png = std::fs::read(path).unwrap();
    get_text(&png[..], query).await.unwrap()
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[tokio::test]
async fn test_get_missing_keyword_fails() {
    let dir = workspace("get-missing");
    let input = dir.join("image.png");

    assert!(run_args(&["png-itxt", "get", arg(&input), "-k", "Title"]).await.is_ok());
    assert!(run_args(&["png-itxt", "get", arg(&input), "-k", "Missing"]).await.is_err());
    assert!(
        run_args(&["png-itxt", "get", arg(&dir.join("absent.png")), "-k", "Title"])
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_set_inserts_readable_record() {
    let dir = workspace("set-insert");
    let input = dir.join("image.png");
    let output = dir.join("out.png");

    let args = ["png-itxt", "set", arg(&input), arg(&output), "-k", "Author", "-v", "Someone"];
    run_args(&args).await.unwrap();

    let record = lookup(&output, TextQuery::keyword("Author")).await.unwrap();
    assert_eq!(record.kind, TextKind::International);
    assert_eq!(record.value, "Someone");
    assert_eq!(std::fs::read(&input).unwrap(), sample_png());
    assert!(!dir.join(".out.png.tmp").exists());
}

#[tokio::test]
async fn test_set_default_type_applies() {
    let dir = workspace("set-default-type");
    let input = dir.join("image.png");
    let output = dir.join("out.png");

    let args = [
        "png-itxt",
        "--default-type",
        "tEXt",
        "set",
        arg(&input),
        arg(&output),
        "-k",
        "Title",
        "-v",
        "Renamed",
    ];
    run_args(&args).await.unwrap();

    let record = lookup(&output, TextQuery::text("Title")).await.unwrap();
    assert_eq!(record.kind, TextKind::Plain);
    assert_eq!(record.value, "Renamed");
    assert_eq!(lookup(&output, TextQuery::itxt("Title")).await, None);
}

#[tokio::test]
async fn test_set_delete_removes_record() {
    let dir = workspace("set-delete");
    let input = dir.join("image.png");
    let output = dir.join("out.png");

    let args = [
        "png-itxt",
        "--default-type",
        "tEXt",
        "set",
        arg(&input),
        arg(&output),
        "-k",
        "Title",
        "--delete",
    ];
    run_args(&args).await.unwrap();

    assert_eq!(lookup(&output, TextQuery::keyword("Title")).await, None);
    assert_eq!(std::fs::read(&output).unwrap().len(), sample_png().len() - 25);
}

#[tokio::test]
async fn test_set_rejects_aliased_output() {
    let dir = workspace("set-alias");
    let input = dir.join("image.png");
    let alias = dir.join("sub").join("..").join("image.png");

    let args = ["png-itxt", "set", arg(&input), arg(&alias), "-k", "Title", "-v", "x"];
    let err = run_args(&args).await.unwrap_err();
    assert!(err.to_string().contains("different files"));
    assert_eq!(std::fs::read(&input).unwrap(), sample_png());
}

#[tokio::test]
async fn test_set_failure_leaves_output_untouched() {
    let dir = workspace("set-failure");
    let input = dir.join("broken.png");
    let output = dir.join("out.png");
    std::fs::write(&input, b"not a png file").unwrap();
    std::fs::write(&output, b"previous").unwrap();

    let args = ["png-itxt", "set", arg(&input), arg(&output), "-k", "Title", "-v", "x"];
    assert!(run_args(&args).await.is_err());
    assert_eq!(std::fs::read(&output).unwrap(), b"previous");
    assert!(!dir.join(".out.png.tmp").exists());
}
