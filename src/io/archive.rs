use crate::io::output::write_atomic;
use crate::types::{PrepError, PrepResult};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use zip::ZipArchive;

fn corrupt(path: &Path, reason: impl ToString) -> PrepError {
    PrepError::CorruptArchive {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Unpack a `.zip`, `.tar.gz`/`.tgz` or `.gz` file into `dest`, returning
/// the files written.
///
/// Any failure to open, list or decompress the archive, and any member
/// whose path would land outside `dest`, is reported as `CorruptArchive` so
/// batch callers can skip the item.
pub fn unpack<P: AsRef<Path>, Q: AsRef<Path>>(archive: P, dest: Q) -> PrepResult<Vec<PathBuf>> {
    let archive = archive.as_ref();
    let dest = dest.as_ref();
    let name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    log::debug!("Unpacking {} into {}", archive.display(), dest.display());
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        unpack_tar_gz(archive, dest)
    } else if name.ends_with(".zip") {
        unpack_zip(archive, dest)
    } else if name.ends_with(".gz") {
        unpack_gzip(archive, dest).map(|p| vec![p])
    } else {
        Err(corrupt(archive, "not a .zip, .tar.gz or .gz archive"))
    }
}

/// Relative path made only of plain components
fn is_enclosed(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        && path.components().any(|c| matches!(c, Component::Normal(_)))
}

fn unpack_zip(archive: &Path, dest: &Path) -> PrepResult<Vec<PathBuf>> {
    let file = File::open(archive).map_err(|e| corrupt(archive, e))?;
    let mut zip = ZipArchive::new(file).map_err(|e| corrupt(archive, e))?;

    let mut written = Vec::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| corrupt(archive, e))?;
        let relative = entry
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or_else(|| corrupt(archive, format!("unsafe entry name {}", entry.name())))?;
        let target = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| corrupt(archive, format!("{}: {}", entry.name(), e)))?;
        written.push(write_atomic(&target, &bytes)?);
    }
    Ok(written)
}

fn unpack_gzip(archive: &Path, dest: &Path) -> PrepResult<PathBuf> {
    let file = File::open(archive).map_err(|e| corrupt(archive, e))?;
    let mut bytes = Vec::new();
    GzDecoder::new(file)
        .read_to_end(&mut bytes)
        .map_err(|e| corrupt(archive, e))?;

    let name = archive
        .file_stem()
        .ok_or_else(|| corrupt(archive, "archive has no file name"))?;
    write_atomic(dest.join(name), &bytes)
}

fn unpack_tar_gz(archive: &Path, dest: &Path) -> PrepResult<Vec<PathBuf>> {
    let file = File::open(archive).map_err(|e| corrupt(archive, e))?;
    let mut tar = Archive::new(GzDecoder::new(file));

    let mut written = Vec::new();
    for entry in tar.entries().map_err(|e| corrupt(archive, e))? {
        let mut entry = entry.map_err(|e| corrupt(archive, e))?;
        let relative = entry.path().map_err(|e| corrupt(archive, e))?.into_owned();
        if !is_enclosed(&relative) {
            return Err(corrupt(archive, format!("unsafe entry name {}", relative.display())));
        }
        let target = dest.join(&relative);

        let kind = entry.header().entry_type();
        if kind.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if !kind.is_file() {
            log::debug!("Skipping {:?} entry {}", kind, relative.display());
            continue;
        }
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| corrupt(archive, format!("{}: {}", relative.display(), e)))?;
        written.push(write_atomic(&target, &bytes)?);
    }
    Ok(written)
}

/// Unpack every archive, skipping corrupt ones.
/// Returns the extracted files and the archives that failed.
pub fn unpack_all<P: AsRef<Path>>(archives: &[PathBuf], dest: P) -> (Vec<PathBuf>, Vec<(PathBuf, PrepError)>) {
    let mut extracted = Vec::new();
    let mut failed = Vec::new();
    for archive in archives {
        match unpack(archive, dest.as_ref()) {
            Ok(files) => extracted.extend(files),
            Err(e) => {
                log::warn!("Skipping archive {}: {}", archive.display(), e);
                failed.push((archive.clone(), e));
            }
        }
    }
    log::info!(
        "Unpacked {} archives ({} files, {} skipped)",
        archives.len() - failed.len(),
        extracted.len(),
        failed.len()
    );
    (extracted, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_zip_and_gzip_unpack() {
        let dir = TempDir::new().unwrap();
        let zip_path = dir.path().join("tiles.zip");
        {
            let mut writer = zip::ZipWriter::new(File::create(&zip_path).unwrap());
            let options = zip::write::FileOptions::default();
            writer.add_directory("sub/", options).unwrap();
            writer.start_file("sub/a.geojson", options).unwrap();
            writer.write_all(b"{}").unwrap();
            writer.finish().unwrap();
        }
        let gz_path = dir.path().join("b.geojson.gz");
        {
            let mut encoder = GzEncoder::new(File::create(&gz_path).unwrap(), Compression::default());
            encoder.write_all(b"[1]").unwrap();
            encoder.finish().unwrap();
        }

        let out = dir.path().join("out");
        let files = unpack(&zip_path, &out).unwrap();
        assert_eq!(files, vec![out.join("sub").join("a.geojson")]);
        let files = unpack(&gz_path, &out).unwrap();
        assert_eq!(std::fs::read(&files[0]).unwrap(), b"[1]");
        assert_eq!(files[0], out.join("b.geojson"));
    }

    #[test]
    fn test_tar_gz_members_are_extracted() {
        let dir = TempDir::new().unwrap();
        let tar_path = dir.path().join("AOI_2_Vegas_Train.tar.gz");
        {
            let encoder = GzEncoder::new(File::create(&tar_path).unwrap(), Compression::default());
            let mut builder = tar::Builder::new(encoder);
            for (name, body) in [
                ("geojson/buildings_img1.geojson", &b"{}"[..]),
                ("RGB-PanSharpen/RGB-PanSharpen_img1.tif", &b"II*"[..]),
            ] {
                let mut header = tar::Header::new_gnu();
                header.set_size(body.len() as u64);
                header.set_mode(0o644);
                builder.append_data(&mut header, name, body).unwrap();
            }
            builder.into_inner().unwrap().finish().unwrap();
        }

        let out = dir.path().join("out");
        let files = unpack(&tar_path, &out).unwrap();
        assert_eq!(
            files,
            vec![
                out.join("geojson").join("buildings_img1.geojson"),
                out.join("RGB-PanSharpen").join("RGB-PanSharpen_img1.tif"),
            ]
        );
        assert_eq!(std::fs::read(&files[0]).unwrap(), b"{}");
        assert!(!out.join("AOI_2_Vegas_Train.tar").exists());

        // gzip stream that is not a tar archive
        let not_tar = dir.path().join("broken.tgz");
        {
            let mut encoder = GzEncoder::new(File::create(&not_tar).unwrap(), Compression::default());
            encoder.write_all(b"not a tar header").unwrap();
            encoder.finish().unwrap();
        }
        assert!(matches!(
            unpack(&not_tar, &out),
            Err(PrepError::CorruptArchive { .. })
        ));
    }

    #[test]
    fn test_member_paths_must_stay_inside_destination() {
        assert!(is_enclosed(Path::new("geojson/a.geojson")));
        assert!(is_enclosed(Path::new("./a.tif")));
        assert!(!is_enclosed(Path::new("../a.tif")));
        assert!(!is_enclosed(Path::new("/etc/passwd")));
        assert!(!is_enclosed(Path::new("sub/../../a.tif")));
        assert!(!is_enclosed(Path::new("")));
    }

    #[test]
    fn test_corrupt_archives_are_skipped() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = TempDir::new().unwrap();
        let bad_zip = dir.path().join("bad.zip");
        std::fs::write(&bad_zip, b"definitely not a zip").unwrap();
        let bad_gz = dir.path().join("bad.gz");
        std::fs::write(&bad_gz, b"nor a gzip stream").unwrap();

        assert!(matches!(
            unpack(&bad_zip, dir.path()),
            Err(PrepError::CorruptArchive { .. })
        ));
        let (files, failed) = unpack_all(&[bad_zip, bad_gz], dir.path().join("out"));
        assert!(files.is_empty());
        assert_eq!(failed.len(), 2);
    }
}
