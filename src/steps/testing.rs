//! Fake interpreters for step tests

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write an executable `python3` shell script into `<dir>/bin`.
///
/// `$LOG_DIR` inside `body` expands to the script's own directory.
pub fn fake_runtime(dir: &Path, body: &str) -> PathBuf {
    let bin = dir.join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let path = bin.join("python3");

    let mut file = std::fs::File::create(&path).unwrap();
    write!(file, "#!/bin/sh\nLOG_DIR=\"$(dirname \"$0\")\"\n{}\n", body).unwrap();
    file.sync_all().unwrap();
    drop(file);

    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Contents of a file the fake runtime wrote next to itself
pub fn read_log(runtime: &Path, name: &str) -> String {
    let path = runtime.parent().unwrap().join(name);
    std::fs::read_to_string(path).unwrap_or_default()
}
