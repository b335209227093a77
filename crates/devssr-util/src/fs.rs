use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use walkdir::WalkDir;

/// Read a file to string, replacing invalid UTF-8 sequences with the replacement character.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn read_to_string_lossy(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write bytes to `path` through a sibling temp file and a rename.
///
/// Readers either see the previous contents or the new contents. Missing
/// parent directories are created.
///
/// # Errors
/// Returns an error if the parent cannot be created, or the write or rename fails.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("file"),
        std::process::id()
    ));

    {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        if cfg!(windows) {
            fs::copy(&temp_path, path)?;
            let _ = fs::remove_file(&temp_path);
        } else {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
    }
    Ok(())
}

/// Read every regular file below `root` into memory.
///
/// Keys are `/`-separated paths relative to `root`, sorted. A missing
/// `root` yields an empty map.
///
/// # Errors
/// Returns an error if a directory entry or file cannot be read.
pub fn collect_tree(root: &Path) -> io::Result<BTreeMap<String, Vec<u8>>> {
    let mut files = BTreeMap::new();
    if !root.exists() {
        return Ok(files);
    }

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(io::Error::other)?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        files.insert(rel, fs::read(entry.path())?);
    }

    Ok(files)
}

/// Write a set of `/`-separated relative paths below `root`.
///
/// Each file is written with [`atomic_write`]. Files already present under
/// `root` but absent from `files` are left alone.
///
/// # Errors
/// Returns the first write error encountered.
pub fn write_tree<'a, I>(root: &Path, files: I) -> io::Result<usize>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut written = 0;
    for (rel, bytes) in files {
        let mut path = root.to_path_buf();
        path.extend(rel.split('/').filter(|s| !s.is_empty()));
        atomic_write(&path, bytes)?;
        written += 1;
    }
    Ok(written)
}
