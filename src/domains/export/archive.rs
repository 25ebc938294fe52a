use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::Path;
use zip::write::FileOptions;
use zip::ZipWriter;

use crate::errors::{MigrationError, MigrationResult};

/// Deflate every file below `src_dir` into `dest_zip`, with paths relative to `src_dir`.
pub fn create_zip_from_dir(src_dir: &Path, dest_zip: &Path) -> MigrationResult<()> {
    let file = File::create(dest_zip)?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    fn add_dir_recursively(
        zip: &mut ZipWriter<File>,
        base_dir: &Path,
        path: &Path,
        options: FileOptions,
    ) -> MigrationResult<()> {
        let mut entries = std::fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort();

        for path in entries {
            let name = path
                .strip_prefix(base_dir)
                .map_err(|e| MigrationError::Archive(e.to_string()))?
                .to_string_lossy()
                .replace('\\', "/");
            if path.is_file() {
                zip.start_file(name, options)?;
                let mut f = File::open(&path)?;
                std::io::copy(&mut f, zip)?;
            } else if path.is_dir() {
                zip.add_directory(name, options)?;
                add_dir_recursively(zip, base_dir, &path, options)?;
            }
        }
        Ok(())
    }

    add_dir_recursively(&mut zip, src_dir, src_dir, options)?;
    zip.finish()?;
    Ok(())
}

/// Hex SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> MigrationResult<String> {
    let mut hasher = Sha256::new();
    let mut file = File::open(path)?;
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
