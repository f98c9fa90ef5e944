use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// SHA-256 of a file's contents, hex encoded.
pub fn hash_file(path: impl AsRef<Path>) -> io::Result<String> {
  let mut file = File::open(path)?;
  let mut hasher = Sha256::new();
  let mut buf = [0u8; 8192];
  loop {
    let n = file.read(&mut buf)?;
    if n == 0 {
      break;
    }
    hasher.update(&buf[..n]);
  }
  Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 over the hex digests of every regular file under `path`.
///
/// Files are visited in lexical path order, so the result does not depend on
/// directory listing order.
pub fn hash_directory(path: impl AsRef<Path>) -> io::Result<String> {
  let mut files = Vec::new();
  collect_files(path.as_ref(), &mut files)?;
  files.sort();

  let mut hasher = Sha256::new();
  for file in files {
    hasher.update(hash_file(&file)?.as_bytes());
  }
  Ok(hex::encode(hasher.finalize()))
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
  for entry in fs::read_dir(dir)? {
    let entry = entry?;
    let path = entry.path();
    if entry.file_type()?.is_dir() {
      collect_files(&path, files)?;
    } else {
      files.push(path);
    }
  }
  Ok(())
}
