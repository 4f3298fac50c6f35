//! Whole-run properties: idempotence, reversibility, exclusion containment,
//! deterministic order and one-real-side-per-path.
#![cfg(unix)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{tempdir, TempDir};
use walkdir::WalkDir;

use stub_move::{resolve_all, run, Direction, Location, MirrorStats, RootPair, Sessions, StubMoveError};

fn setup() -> (TempDir, PathBuf, PathBuf) {
    let td = tempdir().unwrap();
    let origin = td.path().join("origin");
    let archive = td.path().join("archive");
    fs::create_dir(&origin).unwrap();
    fs::create_dir(&archive).unwrap();
    (td, origin, archive)
}

fn mirror(origin: &Path, archive: &Path, direction: Direction, ops: &[&str], excludes: &[&str]) -> anyhow::Result<MirrorStats> {
    let pair = RootPair::new(Location::Local(origin.to_path_buf()), Location::Local(archive.to_path_buf()))?;
    let ops: Vec<String> = ops.iter().map(|s| format!("{}/{s}", origin.display())).collect();
    let excludes: Vec<String> = excludes.iter().map(|s| format!("{}/{s}", origin.display())).collect();
    let resolved = resolve_all(&ops, &excludes, &pair, Path::new("/"))?;
    run(&mut Sessions::default(), &pair, direction, &resolved)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Snap {
    Dir,
    File(Vec<u8>),
    Link(PathBuf),
}

/// Everything under `root`, keyed by relative path; symlinks (stubs included) by link text.
fn snapshot(root: &Path) -> BTreeMap<PathBuf, Snap> {
    WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .map(|e| {
            let e = e.unwrap();
            let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
            let ft = e.file_type();
            let snap = if ft.is_symlink() {
                Snap::Link(fs::read_link(e.path()).unwrap())
            } else if ft.is_dir() {
                Snap::Dir
            } else {
                Snap::File(fs::read(e.path()).unwrap())
            };
            (rel, snap)
        })
        .collect()
}

fn real_only(snap: &BTreeMap<PathBuf, Snap>) -> BTreeMap<PathBuf, Snap> {
    snap.iter()
        .filter(|(_, s)| !matches!(s, Snap::Link(t) if t.to_string_lossy().starts_with("marker:")))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn populate(origin: &Path) {
    fs::create_dir_all(origin.join("proj/src/deep")).unwrap();
    fs::create_dir_all(origin.join("proj/docs")).unwrap();
    fs::write(origin.join("proj/README"), "readme").unwrap();
    fs::write(origin.join("proj/src/main.c"), "int main;").unwrap();
    fs::write(origin.join("proj/src/deep/x.bin"), [0u8, 1, 2, 255]).unwrap();
    fs::write(origin.join("proj/docs/guide.md"), "# guide").unwrap();
    std::os::unix::fs::symlink("src/main.c", origin.join("proj/entry")).unwrap();
}

#[test]
fn second_run_changes_nothing() {
    let (_td, origin, archive) = setup();
    populate(&origin);

    mirror(&origin, &archive, Direction::Put, &["proj"], &["proj/docs"]).unwrap();
    let before = (snapshot(&origin), snapshot(&archive));

    let stats = mirror(&origin, &archive, Direction::Put, &["proj"], &["proj/docs"]).unwrap();
    assert!(stats.is_noop(), "rerun changed something: {stats}");
    assert_eq!((snapshot(&origin), snapshot(&archive)), before);
}

#[test]
fn get_restores_what_put_moved() {
    let (_td, origin, archive) = setup();
    populate(&origin);
    let original = real_only(&snapshot(&origin));

    mirror(&origin, &archive, Direction::Put, &["proj"], &[]).unwrap();
    assert_ne!(real_only(&snapshot(&origin)), original);

    mirror(&origin, &archive, Direction::Get, &["proj"], &[]).unwrap();
    assert_eq!(real_only(&snapshot(&origin)), original);
}

#[test]
fn nested_exclude_retains_every_ancestor() {
    let (_td, origin, archive) = setup();
    populate(&origin);

    mirror(&origin, &archive, Direction::Put, &["proj"], &["proj/src/deep"]).unwrap();

    let o = snapshot(&origin);
    assert_eq!(o.get(Path::new("proj")), Some(&Snap::Dir));
    assert_eq!(o.get(Path::new("proj/src")), Some(&Snap::Dir));
    assert_eq!(o.get(Path::new("proj/src/deep")), Some(&Snap::Dir));
    assert_eq!(o.get(Path::new("proj/src/deep/x.bin")), Some(&Snap::File(vec![0, 1, 2, 255])));
    assert_eq!(o.get(Path::new("proj/README")), Some(&Snap::Link("marker:file".into())));
    assert_eq!(o.get(Path::new("proj/docs")), Some(&Snap::Link("marker:dir".into())));

    let a = snapshot(&archive);
    assert_eq!(a.get(Path::new("proj/src/deep")), Some(&Snap::Link("marker:dir".into())));
    assert_eq!(a.get(Path::new("proj/src/main.c")), Some(&Snap::File(b"int main;".to_vec())));
    assert_eq!(a.get(Path::new("proj/entry")), Some(&Snap::Link("src/main.c".into())));
}

#[test]
fn no_path_is_real_on_both_sides() {
    let (_td, origin, archive) = setup();
    populate(&origin);

    mirror(&origin, &archive, Direction::Put, &["proj"], &["proj/src/main.c", "proj/docs"]).unwrap();

    let o = real_only(&snapshot(&origin));
    let a = real_only(&snapshot(&archive));
    for (path, snap) in &o {
        if matches!(snap, Snap::Dir) {
            continue;
        }
        assert!(!a.contains_key(path), "{} is real on both sides", path.display());
    }
}

#[test]
fn children_are_visited_in_sorted_order() {
    let (_td, origin, archive) = setup();
    fs::create_dir(origin.join("d")).unwrap();
    for name in ["b", "a", "c"] {
        fs::write(origin.join("d").join(name), name).unwrap();
    }
    fs::create_dir(archive.join("d")).unwrap();
    fs::write(archive.join("d/a"), "taken").unwrap();
    fs::write(archive.join("d/c"), "taken").unwrap();

    let err = mirror(&origin, &archive, Direction::Put, &["d"], &[]).unwrap_err();
    match err.downcast_ref::<StubMoveError>() {
        Some(StubMoveError::Conflict { path, .. }) => assert_eq!(path.path(), archive.join("d/a")),
        other => panic!("expected conflict, got {other:?}"),
    }
    // The walk stopped at `a`: `b` was never reached.
    assert_eq!(fs::read_to_string(origin.join("d/b")).unwrap(), "b");
    assert!(!archive.join("d/b").exists());
}

#[test]
fn repeated_runs_build_identical_stub_trees() {
    let trees: Vec<_> = (0..2)
        .map(|_| {
            let (_td, origin, archive) = setup();
            populate(&origin);
            mirror(&origin, &archive, Direction::Put, &["proj/"], &[]).unwrap();
            mirror(&origin, &archive, Direction::Put, &["proj/src"], &["proj/src/deep"]).unwrap();
            (snapshot(&origin), snapshot(&archive))
        })
        .collect();
    assert_eq!(trees[0], trees[1]);
}

#[test]
fn get_over_put_stub_replaces_it() {
    let (_td, origin, archive) = setup();
    fs::write(origin.join("f"), "payload").unwrap();

    mirror(&origin, &archive, Direction::Put, &["f"], &[]).unwrap();
    let stats = mirror(&origin, &archive, Direction::Get, &["f"], &[]).unwrap();

    assert_eq!(stats.stubs_removed, 1);
    assert_eq!(fs::read_to_string(origin.join("f")).unwrap(), "payload");
    assert_eq!(fs::read_link(archive.join("f")).unwrap(), PathBuf::from("marker:file"));
}
