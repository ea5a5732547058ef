use anyhow::Result;
use std::path::Path;

/// Executable-bit probe. Platforms without Unix permission bits report
/// `false` for everything; the rest of the engine never looks at the mode
/// directly.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> Result<bool> {
    use anyhow::Context;
    use std::os::unix::fs::PermissionsExt;
    let meta = std::fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
    Ok(meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
pub fn is_executable(_path: &Path) -> Result<bool> {
    Ok(false)
}
