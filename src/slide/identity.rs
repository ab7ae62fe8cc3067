//! Slide identifier assignment.

use std::path::Path;

use uuid::Uuid;

/// Assign the slide id for a pending file.
///
/// A file whose name (or name without extension) is a valid UUID keeps that
/// exact string as its id, so every artifact is keyed by the name the
/// uploader chose. Any other name gets a freshly minted v4 UUID.
pub fn resolve_slide_id(path: &Path) -> String {
    existing_slide_id(path)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().hyphenated().to_string())
}

/// The UUID carried by the file name, if any, exactly as written.
pub fn existing_slide_id(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    if Uuid::parse_str(name).is_ok() {
        return Some(name);
    }
    let stem = path.file_stem()?.to_str()?;
    Uuid::parse_str(stem).is_ok().then_some(stem)
}
