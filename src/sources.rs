//! Line sources: the live log file, gzip-compressed rotated archives, and
//! archive discovery next to the live file.

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Buffered line iterator over the live (uncompressed) log file.
pub fn live_lines(path: &Path) -> io::Result<io::Lines<BufReader<File>>> {
    Ok(BufReader::new(File::open(path)?).lines())
}

/// Line iterator over one gzip-compressed rotated archive.
pub fn archive_lines(path: &Path) -> io::Result<io::Lines<BufReader<GzDecoder<File>>>> {
    Ok(BufReader::new(GzDecoder::new(File::open(path)?)).lines())
}

/// Rotated archives of `file` in its parent directory, i.e. files named
/// `<basename>.<digits>.gz`. Sorted by file name so the scan order is
/// deterministic across platforms.
pub fn find_archives(file: &Path) -> io::Result<Vec<PathBuf>> {
    let dir = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let base = file.file_name().and_then(|n| n.to_str()).unwrap_or_default();

    let mut archives = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        if is_rotated_archive(&name, base) {
            archives.push(entry.path());
        }
    }
    archives.sort();
    Ok(archives)
}

/// `messages.3.gz` is a rotated archive of `messages`; `messages.gz`,
/// `messages.abc.gz` and `messages.3.gz.old` are not.
fn is_rotated_archive(name: &str, base: &str) -> bool {
    name.strip_prefix(base)
        .and_then(|rest| rest.strip_prefix('.'))
        .and_then(|rest| rest.strip_suffix(".gz"))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_gz(path: &Path, contents: &str) {
        let file = File::create(path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(contents.as_bytes()).unwrap();
        encoder.finish().unwrap();
    }

    #[test]
    fn test_live_lines_reads_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("messages");
        std::fs::write(&path, "one 1\ntwo 2\n").unwrap();

        let lines: Vec<String> = live_lines(&path).unwrap().map(|l| l.unwrap()).collect();
        assert_eq!(lines, vec!["one 1", "two 2"]);
    }

    #[test]
    fn test_archive_lines_decompresses() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("messages.1.gz");
        write_gz(&path, "old 10\nolder 20\n");

        let lines: Vec<String> = archive_lines(&path).unwrap().map(|l| l.unwrap()).collect();
        assert_eq!(lines, vec!["old 10", "older 20"]);
    }

    #[test]
    fn test_find_archives_matches_rotation_pattern() {
        let dir = tempdir().unwrap();
        let live = dir.path().join("messages");
        std::fs::write(&live, "live\n").unwrap();
        for name in [
            "messages.1.gz",
            "messages.12.gz",
            "messages.gz",        // no rotation number
            "messages.abc.gz",    // non-numeric rotation number
            "messages.1.gz.old",  // wrong suffix
            "other.1.gz",         // different base file
        ] {
            std::fs::write(dir.path().join(name), "x\n").unwrap();
        }

        let found = find_archives(&live).unwrap();
        let names: Vec<&str> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["messages.1.gz", "messages.12.gz"]);
    }

    #[test]
    fn test_find_archives_empty_when_none_match() {
        let dir = tempdir().unwrap();
        let live = dir.path().join("messages");
        std::fs::write(&live, "live\n").unwrap();

        assert!(find_archives(&live).unwrap().is_empty());
    }

    #[test]
    fn test_find_archives_missing_directory_errors() {
        assert!(find_archives(Path::new("/nonexistent/dir/messages")).is_err());
    }
}
