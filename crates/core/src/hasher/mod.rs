use std::io;
use std::path::Path;

use rayon::prelude::*;
use sha2::{Digest, Sha256};

/// Checksum of a file's bytes, the identity of an image in the catalog.
/// Streams the file, so large TIFF scans never sit in memory whole.
pub fn compute_sha256(path: &Path) -> io::Result<String> {
    let file = std::fs::File::open(path)?;
    let mut reader = io::BufReader::with_capacity(64 * 1024, file);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash many files in parallel on the current rayon pool. Results are in
/// input order.
pub fn compute_sha256_batch<P: AsRef<Path> + Sync>(paths: &[P]) -> Vec<io::Result<String>> {
    paths
        .par_iter()
        .map(|path| compute_sha256(path.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_sha256_known_values() {
        let tmp = tempfile::tempdir().unwrap();
        let scan = tmp.path().join("scan.jpg");
        let empty = tmp.path().join("empty.jpg");
        fs::write(&scan, b"hello world").unwrap();
        fs::write(&empty, b"").unwrap();

        assert_eq!(
            compute_sha256(&scan).unwrap(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(
            compute_sha256(&empty).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_sha256_changes_with_content() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("scan.jpg");
        fs::write(&path, b"before sync").unwrap();
        let before = compute_sha256(&path).unwrap();
        fs::write(&path, b"after sync").unwrap();
        assert_ne!(before, compute_sha256(&path).unwrap());
    }

    #[test]
    fn test_sha256_batch_keeps_order() {
        let tmp = tempfile::tempdir().unwrap();
        let path_a = tmp.path().join("a.jpg");
        let path_b = tmp.path().join("b.jpg");
        fs::write(&path_a, b"hello world").unwrap();
        fs::write(&path_b, b"").unwrap();
        let missing = tmp.path().join("missing.jpg");

        let hashes = compute_sha256_batch(&[&path_a, &missing, &path_b]);
        assert_eq!(hashes.len(), 3);
        assert_eq!(hashes[0].as_ref().unwrap(), &compute_sha256(&path_a).unwrap());
        assert!(hashes[1].is_err());
        assert_eq!(hashes[2].as_ref().unwrap(), &compute_sha256(&path_b).unwrap());
    }
}
