use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};

const CHUNK_SIZE: usize = 8192;

/// MD5 hex digest of a file's bytes, read in 8 KiB chunks.
pub fn file_md5(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buffer = [0u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Consolidated checksum of a dive: MD5 over `name:checksum\n` for each
/// member, in the caller-supplied (path-sorted) order.
pub fn dive_checksum<'a, I>(members: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut hasher = Md5::new();
    for (name, checksum) in members {
        hasher.update(format!("{name}:{checksum}\n").as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn file_md5_matches_known_vector() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        assert_eq!(
            file_md5(file.path()).unwrap(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }

    #[test]
    fn empty_file_hashes_to_empty_digest() {
        let file = NamedTempFile::new().unwrap();
        assert_eq!(
            file_md5(file.path()).unwrap(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn dive_checksum_concatenates_name_checksum_lines() {
        let members = [("AAA.ORF", "aaaa"), ("BBB.ORF", "bbbb")];
        let expected = {
            let mut hasher = Md5::new();
            hasher.update(b"AAA.ORF:aaaa\nBBB.ORF:bbbb\n");
            hex::encode(hasher.finalize())
        };
        assert_eq!(dive_checksum(members), expected);
    }

    #[test]
    fn dive_checksum_is_order_sensitive() {
        let forward = dive_checksum([("AAA.ORF", "aaaa"), ("BBB.ORF", "bbbb")]);
        let reversed = dive_checksum([("BBB.ORF", "bbbb"), ("AAA.ORF", "aaaa")]);
        assert_ne!(forward, reversed);
    }
}
