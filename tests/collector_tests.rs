//! Integration tests for the log collection strategies.

use std::fs;

use anyhow::Result;
use proptest::prelude::*;
use tempfile::TempDir;

use hvprobe::collectors::log_collector::collect;
use hvprobe::config::{LogKind, LogSpec};
use hvprobe::utils::fs::copy_tail;

#[test]
fn whole_file_and_tail_strategies_coexist() -> Result<()> {
    let src_dir = TempDir::new()?;
    let source = src_dir.path().join("messages");
    fs::write(&source, "one\ntwo\nthree\nfour\n")?;

    let dest = TempDir::new()?;

    let whole = LogSpec {
        name: "messages".to_string(),
        kind: LogKind::File,
        path: source.to_string_lossy().to_string(),
        lines: None,
    };
    let tail = LogSpec {
        name: "messages-tail".to_string(),
        kind: LogKind::File,
        path: source.to_string_lossy().to_string(),
        lines: Some(2),
    };

    collect(&whole, dest.path())?;
    collect(&tail, dest.path())?;

    assert_eq!(
        fs::read_to_string(dest.path().join("messages"))?,
        "one\ntwo\nthree\nfour\n"
    );

    let tail_file = fs::read_dir(dest.path())?
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .find(|name| name.starts_with("messages-tail_"))
        .expect("tail artifact with uptime suffix");
    assert_eq!(
        fs::read_to_string(dest.path().join(tail_file))?,
        "three\nfour\n"
    );
    Ok(())
}

#[test]
fn node_drain_reads_until_end_of_stream() -> Result<()> {
    let src_dir = TempDir::new()?;
    let node = src_dir.path().join("pseudo_node");
    fs::write(&node, b"binary\x00stream\x01data")?;

    let dest = TempDir::new()?;
    let spec = LogSpec {
        name: "pseudo_node".to_string(),
        kind: LogKind::Node,
        path: node.to_string_lossy().to_string(),
        lines: None,
    };
    collect(&spec, dest.path())?;

    assert_eq!(
        fs::read(dest.path().join("pseudo_node"))?,
        b"binary\x00stream\x01data"
    );
    Ok(())
}

proptest! {
    /// The collected tail artifact holds exactly the last
    /// `min(N, total)` logical lines of the source, verbatim.
    #[test]
    fn tail_extracts_exactly_the_last_n_lines(
        lines in prop::collection::vec("[a-z ]{0,12}", 0..40),
        n in 1usize..50,
    ) {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.log");
        let dest = dir.path().join("dest.log");

        let content: String = lines.iter().map(|l| format!("{}\n", l)).collect();
        fs::write(&src, &content).unwrap();

        copy_tail(&src, &dest, n).unwrap();
        let collected = fs::read_to_string(&dest).unwrap();

        let keep = lines.len().min(n);
        let expected: String = lines[lines.len() - keep..]
            .iter()
            .map(|l| format!("{}\n", l))
            .collect();
        prop_assert_eq!(collected, expected);
    }
}
