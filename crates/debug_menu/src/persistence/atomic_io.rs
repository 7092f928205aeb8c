use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Stages `text` next to `slot_path` and renames it into place. The slot
/// holds either its previous contents or the new text, never a mix.
pub(crate) fn write_text_atomic(slot_path: &Path, text: &str) -> io::Result<()> {
    if let Some(dir) = slot_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    let staging = staging_path(slot_path);
    let written = stage(&staging, text).and_then(|()| swap_into_place(&staging, slot_path));
    if written.is_err() {
        let _ = fs::remove_file(&staging);
    }
    written
}

fn stage(staging: &Path, text: &str) -> io::Result<()> {
    let mut file = File::create(staging)?;
    file.write_all(text.as_bytes())?;
    file.sync_all()
}

// rename replaces an existing slot on every supported platform.
fn swap_into_place(staging: &Path, slot_path: &Path) -> io::Result<()> {
    fs::rename(staging, slot_path)
}

fn staging_path(slot_path: &Path) -> PathBuf {
    let mut name = slot_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "slot".into());
    name.push(".staging");
    slot_path.with_file_name(name)
}
