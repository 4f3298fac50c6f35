//! Remote backend driven through a local `sh` standing in for ssh.
//!
//! The session runs `<program> <options…> <host> sh`; with program `/bin/sh`
//! and options `-c 'exec sh'` the host argument is ignored and the "remote"
//! shell is simply a local one, so every request exercises the real protocol.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::tempdir;

use stub_move::location::transfer;
use stub_move::{
    resolve_all, run, Backend, Direction, EntryKind, HostId, Location, RootPair, Sessions, SshSettings,
    StubMoveError,
};

fn loopback() -> SshSettings {
    SshSettings {
        program: "/bin/sh".into(),
        options: vec!["-c".into(), "exec sh".into()],
    }
}

/// Loopback whose `base64` emits one line of garbage and fails.
fn broken_base64(bin: &Path) -> SshSettings {
    let tool = bin.join("base64");
    fs::write(&tool, "#!/bin/sh\necho QUFB\nexit 1\n").unwrap();
    fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();
    SshSettings {
        program: "/bin/sh".into(),
        options: vec!["-c".into(), format!("PATH='{}':\"$PATH\"; export PATH; exec sh", bin.display())],
    }
}

fn names(dir: &Path) -> Vec<String> {
    let mut out: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    out.sort();
    out
}

fn remote(host: &str, path: &Path) -> Location {
    Location::Remote { host: HostId::new(host), path: path.to_path_buf() }
}

#[test]
fn backend_ops_round_trip_through_the_shell() {
    let td = tempdir().unwrap();
    let base = td.path();
    let mut sessions = Sessions::new(loopback());
    let host = HostId::new("nas");
    let session = sessions.remote(&host).unwrap();

    assert_eq!(session.kind(base).unwrap(), EntryKind::Dir);
    assert_eq!(session.kind(&base.join("nope")).unwrap(), EntryKind::Absent);

    session.create_dir(&base.join("d")).unwrap();
    fs::write(base.join("d/z.txt"), "z").unwrap();
    fs::write(base.join("d/.hidden"), "h").unwrap();
    fs::write(base.join("d/it's here"), "q").unwrap();
    session.symlink(Path::new("marker:dir"), &base.join("d/stub")).unwrap();

    assert_eq!(
        session.list_dir(&base.join("d")).unwrap(),
        vec![".hidden", "it's here", "stub", "z.txt"]
    );
    assert_eq!(session.kind(&base.join("d/stub")).unwrap(), EntryKind::Symlink);
    assert_eq!(session.read_link(&base.join("d/stub")).unwrap(), PathBuf::from("marker:dir"));

    session.remove_file(&base.join("d/stub")).unwrap();
    session.remove_file(&base.join("d/stub")).unwrap();
    assert!(!base.join("d/stub").exists());

    let err = session.remove_dir(&base.join("d")).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StubMoveError>(),
        Some(StubMoveError::RemoteCommand { op: "remove directory", .. })
    ));
}

#[test]
fn file_bytes_survive_both_directions() {
    let td = tempdir().unwrap();
    let payload: Vec<u8> = (0..40_000u32).map(|i| (i * 7 % 251) as u8).collect();
    fs::write(td.path().join("local.bin"), &payload).unwrap();

    let mut sessions = Sessions::new(loopback());
    let local = Location::Local(td.path().join("local.bin"));
    let far = remote("nas", &td.path().join("remote.bin"));
    let back = Location::Local(td.path().join("back.bin"));

    assert_eq!(transfer::relocate_file(&mut sessions, &local, &far).unwrap(), payload.len() as u64);
    assert!(!td.path().join("local.bin").exists());
    assert_eq!(fs::read(td.path().join("remote.bin")).unwrap(), payload);

    assert_eq!(transfer::relocate_file(&mut sessions, &far, &back).unwrap(), payload.len() as u64);
    assert!(!td.path().join("remote.bin").exists());
    assert_eq!(fs::read(td.path().join("back.bin")).unwrap(), payload);
    assert_eq!(sessions.open_sessions(), 1);
}

#[test]
fn put_never_clobbers_remote_file() {
    let td = tempdir().unwrap();
    fs::write(td.path().join("src"), "new").unwrap();
    fs::write(td.path().join("dst"), "old").unwrap();

    let mut sessions = Sessions::new(loopback());
    let err = transfer::relocate_file(
        &mut sessions,
        &Location::Local(td.path().join("src")),
        &remote("nas", &td.path().join("dst")),
    )
    .unwrap_err();

    assert!(matches!(err.downcast_ref::<StubMoveError>(), Some(StubMoveError::RemoteCommand { .. })));
    assert_eq!(fs::read_to_string(td.path().join("dst")).unwrap(), "old");
    assert_eq!(fs::read_to_string(td.path().join("src")).unwrap(), "new");
}

#[test]
fn empty_file_crosses_over() {
    let td = tempdir().unwrap();
    fs::write(td.path().join("empty"), "").unwrap();
    let mut sessions = Sessions::new(loopback());
    let bytes = transfer::relocate_file(
        &mut sessions,
        &Location::Local(td.path().join("empty")),
        &remote("nas", &td.path().join("moved")),
    )
    .unwrap();
    assert_eq!(bytes, 0);
    assert_eq!(fs::read(td.path().join("moved")).unwrap(), Vec::<u8>::new());
}

#[test]
fn mirror_to_remote_archive_and_back() {
    let td = tempdir().unwrap();
    let origin = td.path().join("origin");
    let archive = td.path().join("archive");
    fs::create_dir_all(origin.join("dir/sub")).unwrap();
    fs::create_dir(&archive).unwrap();
    fs::write(origin.join("dir/a.txt"), "alpha").unwrap();
    fs::write(origin.join("dir/sub/b.txt"), "beta").unwrap();
    std::os::unix::fs::symlink("a.txt", origin.join("dir/l")).unwrap();

    let pair = RootPair::new(Location::Local(origin.clone()), remote("nas", &archive)).unwrap();
    let ops = [format!("{}/dir", origin.display())];
    let none: [String; 0] = [];
    let resolved = resolve_all(&ops, &none, &pair, Path::new("/")).unwrap();

    let mut sessions = Sessions::new(loopback());
    let stats = run(&mut sessions, &pair, Direction::Put, &resolved).unwrap();
    assert_eq!(stats.files_moved, 2);
    assert_eq!(stats.links_moved, 1);
    assert_eq!(fs::read_to_string(archive.join("dir/sub/b.txt")).unwrap(), "beta");
    assert_eq!(fs::read_link(archive.join("dir/l")).unwrap(), PathBuf::from("a.txt"));
    assert_eq!(fs::read_link(origin.join("dir")).unwrap(), PathBuf::from("marker:dir"));

    let again = run(&mut sessions, &pair, Direction::Put, &resolved).unwrap();
    assert!(again.is_noop());

    run(&mut sessions, &pair, Direction::Get, &resolved).unwrap();
    assert_eq!(fs::read_to_string(origin.join("dir/a.txt")).unwrap(), "alpha");
    assert_eq!(fs::read_to_string(origin.join("dir/sub/b.txt")).unwrap(), "beta");
    assert_eq!(fs::read_link(archive.join("dir")).unwrap(), PathBuf::from("marker:dir"));
    assert_eq!(sessions.open_sessions(), 1);
}

#[test]
fn remote_to_remote_same_host_and_across_hosts() {
    let td = tempdir().unwrap();
    fs::write(td.path().join("one"), "1").unwrap();
    fs::write(td.path().join("two"), "22").unwrap();

    let mut sessions = Sessions::new(loopback());
    let renamed = transfer::relocate_file(
        &mut sessions,
        &remote("nas", &td.path().join("one")),
        &remote("nas", &td.path().join("one.moved")),
    )
    .unwrap();
    assert_eq!(renamed, 0);
    assert_eq!(fs::read_to_string(td.path().join("one.moved")).unwrap(), "1");

    let copied = transfer::relocate_file(
        &mut sessions,
        &remote("nas", &td.path().join("two")),
        &remote("backup", &td.path().join("two.moved")),
    )
    .unwrap();
    assert_eq!(copied, 2);
    assert!(!td.path().join("two").exists());
    assert_eq!(fs::read_to_string(td.path().join("two.moved")).unwrap(), "22");
    assert_eq!(sessions.open_sessions(), 2);
}

#[test]
fn failed_login_names_the_host() {
    let td = tempdir().unwrap();
    let failing = SshSettings {
        program: "/bin/sh".into(),
        options: vec!["-c".into(), "exit 255".into()],
    };
    let pair = RootPair::new(Location::Local(td.path().to_path_buf()), remote("nas", Path::new("/srv/archive"))).unwrap();
    let resolved = resolve_all(&[format!("{}/x", td.path().display())], &[], &pair, Path::new("/")).unwrap();

    let err = run(&mut Sessions::new(failing), &pair, Direction::Put, &resolved).unwrap_err();
    match err.downcast_ref::<StubMoveError>() {
        Some(StubMoveError::RemoteAuth { host, .. }) => assert_eq!(host.as_str(), "nas"),
        other => panic!("expected remote auth failure, got {other:?}"),
    }
}

#[test]
fn missing_ssh_program_is_an_auth_failure() {
    let settings = SshSettings {
        program: "/nonexistent/ssh-client".into(),
        options: vec![],
    };
    let err = Sessions::new(settings).remote(&HostId::new("nas")).err().unwrap();
    assert!(matches!(
        err.downcast_ref::<StubMoveError>(),
        Some(StubMoveError::RemoteAuth { .. })
    ));
}

#[test]
fn failed_download_leaves_nothing_and_rerun_succeeds() {
    let td = tempdir().unwrap();
    let bin = td.path().join("bin");
    let origin = td.path().join("origin");
    let archive = td.path().join("archive");
    for d in [&bin, &origin, &archive] {
        fs::create_dir(d).unwrap();
    }
    let payload = vec![7u8; 10_000];
    fs::write(archive.join("f.bin"), &payload).unwrap();

    let pair = RootPair::new(Location::Local(origin.clone()), remote("nas", &archive)).unwrap();
    let ops = [format!("{}/f.bin", origin.display())];
    let none: [String; 0] = [];
    let resolved = resolve_all(&ops, &none, &pair, Path::new("/")).unwrap();

    let err = run(&mut Sessions::new(broken_base64(&bin)), &pair, Direction::Get, &resolved).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StubMoveError>(),
        Some(StubMoveError::RemoteCommand { op: "read file", .. })
    ));
    assert!(names(&origin).is_empty(), "left behind: {:?}", names(&origin));
    assert_eq!(fs::read(archive.join("f.bin")).unwrap(), payload);

    let stats = run(&mut Sessions::new(loopback()), &pair, Direction::Get, &resolved).unwrap();
    assert_eq!(stats.bytes_moved, payload.len() as u64);
    assert_eq!(fs::read(origin.join("f.bin")).unwrap(), payload);
    assert_eq!(fs::read_link(archive.join("f.bin")).unwrap(), PathBuf::from("marker:file"));
}

#[test]
fn failed_upload_leaves_nothing_and_rerun_succeeds() {
    let td = tempdir().unwrap();
    let bin = td.path().join("bin");
    let archive = td.path().join("archive");
    fs::create_dir(&bin).unwrap();
    fs::create_dir(&archive).unwrap();
    let payload = vec![9u8; 10_000];
    fs::write(td.path().join("f.bin"), &payload).unwrap();
    let local = Location::Local(td.path().join("f.bin"));
    let far = remote("nas", &archive.join("f.bin"));

    let err = transfer::relocate_file(&mut Sessions::new(broken_base64(&bin)), &local, &far).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StubMoveError>(),
        Some(StubMoveError::RemoteCommand { op: "write file", .. })
    ));
    assert!(names(&archive).is_empty(), "left behind: {:?}", names(&archive));
    assert_eq!(fs::read(td.path().join("f.bin")).unwrap(), payload);

    let bytes = transfer::relocate_file(&mut Sessions::new(loopback()), &local, &far).unwrap();
    assert_eq!(bytes, payload.len() as u64);
    assert_eq!(fs::read(archive.join("f.bin")).unwrap(), payload);
    assert!(!td.path().join("f.bin").exists());
}

#[test]
fn remote_stub_below_vacated_directory_is_skipped() {
    let td = tempdir().unwrap();
    let origin = td.path().join("origin");
    let archive = td.path().join("archive");
    fs::create_dir_all(origin.join("dir")).unwrap();
    fs::create_dir(&archive).unwrap();
    fs::write(origin.join("dir/a.txt"), "alpha").unwrap();

    let pair = RootPair::new(remote("nas", &origin), Location::Local(archive.clone())).unwrap();
    let ops = [format!("nas:{}/dir", origin.display()), format!("nas:{}/dir/a.txt", origin.display())];
    let none: [String; 0] = [];
    let resolved = resolve_all(&ops, &none, &pair, Path::new("/")).unwrap();

    run(&mut Sessions::new(loopback()), &pair, Direction::Put, &resolved).unwrap();

    assert_eq!(fs::read_link(origin.join("dir")).unwrap(), PathBuf::from("marker:dir"));
    assert_eq!(fs::read_to_string(archive.join("dir/a.txt")).unwrap(), "alpha");
}
