use packr::archive::{self, ArchiveKind};
use packr::error::PackError;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;
use zip::write::FileOptions;

fn sample_tree(root: &Path) {
    fs::create_dir_all(root.join("bin")).unwrap();
    fs::create_dir_all(root.join("lib/server")).unwrap();
    fs::write(root.join("bin/java"), b"#!/bin/sh\necho java\n").unwrap();
    fs::write(root.join("lib/server/libjvm.so"), vec![7u8; 4096]).unwrap();
    fs::write(root.join("release"), b"JAVA_VERSION=\"17\"\n").unwrap();
}

#[cfg(unix)]
fn mode_of(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    fs::symlink_metadata(path).unwrap().permissions().mode() & 0o777
}

#[cfg(unix)]
fn roundtrip_preserves_attributes(kind: ArchiveKind, name: &str) {
    use std::os::unix::fs::{symlink, PermissionsExt};

    let src = tempdir().unwrap();
    sample_tree(src.path());
    fs::set_permissions(src.path().join("bin/java"), fs::Permissions::from_mode(0o755)).unwrap();
    fs::set_permissions(src.path().join("release"), fs::Permissions::from_mode(0o600)).unwrap();
    symlink("server/libjvm.so", src.path().join("lib/libjvm.so")).unwrap();
    let mtime = filetime::FileTime::from_unix_time(1_600_000_000, 0);
    filetime::set_file_mtime(src.path().join("release"), mtime).unwrap();

    let out = tempdir().unwrap();
    let archive_path = out.path().join(name);
    let stored = archive::create(kind, src.path(), &archive_path).unwrap();
    // bin, bin/java, lib, lib/server, lib/server/libjvm.so, lib/libjvm.so, release
    assert_eq!(stored, 7);

    let dst = out.path().join("unpacked");
    let written = archive::extract(&archive_path, &dst).unwrap();
    assert_eq!(written, 4);

    assert_eq!(fs::read(dst.join("lib/server/libjvm.so")).unwrap(), vec![7u8; 4096]);
    assert_eq!(mode_of(&dst.join("bin/java")), 0o755);
    assert_eq!(mode_of(&dst.join("release")), 0o600);

    let link = dst.join("lib/libjvm.so");
    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_link(&link).unwrap(), Path::new("server/libjvm.so"));

    let restored = filetime::FileTime::from_last_modification_time(&fs::metadata(dst.join("release")).unwrap());
    assert!((restored.unix_seconds() - mtime.unix_seconds()).abs() <= 2);
}

#[cfg(unix)]
#[test]
fn zip_roundtrip_preserves_modes_links_and_times() {
    roundtrip_preserves_attributes(ArchiveKind::Zip, "jre.zip");
}

#[cfg(unix)]
#[test]
fn tar_roundtrip_preserves_modes_links_and_times() {
    roundtrip_preserves_attributes(ArchiveKind::Tar, "jre.tar");
}

#[cfg(unix)]
#[test]
fn gzipped_tar_is_extracted() {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let dir = tempdir().unwrap();
    let path = dir.path().join("jdk.tar.gz");
    let mut builder = tar::Builder::new(GzEncoder::new(File::create(&path).unwrap(), Compression::default()));
    let data = b"class data";
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o640);
    header.set_mtime(1_500_000_000);
    header.set_entry_type(tar::EntryType::Regular);
    builder.append_data(&mut header, "jdk-17/lib/modules", &data[..]).unwrap();
    builder.into_inner().unwrap().finish().unwrap();

    let dst = dir.path().join("out");
    assert_eq!(archive::extract(&path, &dst).unwrap(), 1);
    let extracted = dst.join("jdk-17/lib/modules");
    assert_eq!(fs::read(&extracted).unwrap(), data);
    assert_eq!(mode_of(&extracted), 0o640);
}

#[test]
fn duplicate_zip_entries_last_one_wins() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dup.zip");
    let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
    let options = FileOptions::default();
    zip.start_file("a.txt", options).unwrap();
    zip.write_all(b"first").unwrap();
    zip.start_file("a.txt", options).unwrap();
    zip.write_all(b"second").unwrap();
    zip.finish().unwrap();

    let dst = dir.path().join("out");
    archive::extract(&path, &dst).unwrap();
    assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "second");
}

#[test]
fn zip_entry_escaping_target_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("evil.zip");
    let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
    zip.start_file("../evil.txt", FileOptions::default()).unwrap();
    zip.write_all(b"pwned").unwrap();
    zip.finish().unwrap();

    let dst = dir.path().join("out");
    let err = archive::extract(&path, &dst).unwrap_err();
    assert!(matches!(err, PackError::PathEscape { .. }), "{err}");
    assert!(!dir.path().join("evil.txt").exists());
}

#[cfg(unix)]
#[test]
fn zero_mode_entries_get_default_permissions() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("plain.zip");
    let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
    zip.add_directory("docs/", FileOptions::default().unix_permissions(0)).unwrap();
    zip.start_file("docs/readme.txt", FileOptions::default().unix_permissions(0)).unwrap();
    zip.write_all(b"hi").unwrap();
    zip.finish().unwrap();

    let dst = dir.path().join("out");
    archive::extract(&path, &dst).unwrap();
    assert_eq!(mode_of(&dst.join("docs/readme.txt")), 0o644);
    assert_eq!(mode_of(&dst.join("docs")), 0o755);
}

#[test]
fn jar_with_manifest_is_detected_and_streamed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("app.jar");
    let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
    zip.add_directory("META-INF/", FileOptions::default()).unwrap();
    zip.start_file("META-INF/MANIFEST.MF", FileOptions::default()).unwrap();
    zip.write_all(b"Manifest-Version: 1.0\n").unwrap();
    zip.start_file("com/example/Main.class", FileOptions::default()).unwrap();
    zip.write_all(&[0xCA, 0xFE, 0xBA, 0xBE]).unwrap();
    zip.finish().unwrap();

    assert_eq!(ArchiveKind::detect(&path).unwrap(), Some(ArchiveKind::Jar));
    let dst = dir.path().join("out");
    assert_eq!(archive::extract(&path, &dst).unwrap(), 2);
    assert_eq!(fs::read(dst.join("com/example/Main.class")).unwrap(), [0xCA, 0xFE, 0xBA, 0xBE]);
}

#[test]
fn jar_with_data_descriptor_is_read_through_central_directory() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("streamed.jar");
    let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
    zip.start_file("META-INF/MANIFEST.MF", FileOptions::default()).unwrap();
    zip.write_all(b"Manifest-Version: 1.0\n").unwrap();
    zip.start_file("com/example/Main.class", FileOptions::default()).unwrap();
    zip.write_all(&[0xCA, 0xFE, 0xBA, 0xBE]).unwrap();
    zip.finish().unwrap();

    // flag the first local header as sized by a data descriptor
    let mut bytes = fs::read(&path).unwrap();
    bytes[6] |= 0x08;
    fs::write(&path, &bytes).unwrap();

    assert_eq!(ArchiveKind::detect(&path).unwrap(), Some(ArchiveKind::Jar));
    let dst = dir.path().join("out");
    assert_eq!(archive::extract(&path, &dst).unwrap(), 2);
    assert_eq!(fs::read(dst.join("com/example/Main.class")).unwrap(), [0xCA, 0xFE, 0xBA, 0xBE]);
}

#[test]
fn recreating_an_archive_replaces_it() {
    let src = tempdir().unwrap();
    sample_tree(src.path());
    let out = tempdir().unwrap();
    let path = out.path().join("bundle.zip");
    archive::create(ArchiveKind::Zip, src.path(), &path).unwrap();

    fs::remove_file(src.path().join("release")).unwrap();
    archive::create(ArchiveKind::Zip, src.path(), &path).unwrap();

    let dst = out.path().join("out");
    archive::extract(&path, &dst).unwrap();
    assert!(!dst.join("release").exists());
    assert!(dst.join("bin/java").exists());
}

#[cfg(unix)]
#[test]
fn zip_symlink_cannot_redirect_later_entries() {
    let dir = tempdir().unwrap();
    let outside = dir.path().join("outside");
    fs::create_dir_all(&outside).unwrap();
    let path = dir.path().join("evil.zip");
    let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
    zip.add_symlink("link", outside.to_string_lossy(), FileOptions::default())
        .unwrap();
    zip.start_file("link/pwned.txt", FileOptions::default()).unwrap();
    zip.write_all(b"pwned").unwrap();
    zip.finish().unwrap();

    let err = archive::extract(&path, &dir.path().join("out")).unwrap_err();
    assert!(matches!(err, PackError::PathEscape { .. }), "{err}");
    assert!(!outside.join("pwned.txt").exists());
}

#[cfg(unix)]
#[test]
fn tar_symlink_cannot_redirect_later_entries() {
    let dir = tempdir().unwrap();
    let outside = dir.path().join("outside");
    fs::create_dir_all(&outside).unwrap();
    let path = dir.path().join("evil.tar");
    let mut builder = tar::Builder::new(File::create(&path).unwrap());

    let mut link = tar::Header::new_gnu();
    link.set_entry_type(tar::EntryType::Symlink);
    link.set_size(0);
    link.set_mode(0o777);
    builder.append_link(&mut link, "link", "../outside").unwrap();

    let data = b"pwned";
    let mut file = tar::Header::new_gnu();
    file.set_entry_type(tar::EntryType::Regular);
    file.set_size(data.len() as u64);
    file.set_mode(0o644);
    builder.append_data(&mut file, "link/pwned.txt", &data[..]).unwrap();
    builder.into_inner().unwrap();

    let err = archive::extract(&path, &dir.path().join("out")).unwrap_err();
    assert!(matches!(err, PackError::PathEscape { .. }), "{err}");
    assert!(!outside.join("pwned.txt").exists());
}
