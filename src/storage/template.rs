//! URI and object-name templates.
//!
//! Templates carry the case-sensitive placeholders `{id}`, `{level}`,
//! `{tileX}`, `{tileY}`, `{tileWidth}` and `{tileHeight}`. The generator
//! expands them to name archive entries; the serving layer expands the very
//! same templates from the properties document to locate tiles.

/// Slide id placeholder.
pub const ID: &str = "{id}";
/// Pyramid level placeholder.
pub const LEVEL: &str = "{level}";
/// Absolute level-0 left edge placeholder.
pub const TILE_X: &str = "{tileX}";
/// Absolute level-0 top edge placeholder.
pub const TILE_Y: &str = "{tileY}";
/// Clipped tile width placeholder.
pub const TILE_WIDTH: &str = "{tileWidth}";
/// Clipped tile height placeholder.
pub const TILE_HEIGHT: &str = "{tileHeight}";

/// Object naming format shared by every backend.
pub const TILE_NAMING_FORMAT: &str = "{id}/{level}/{tileX}_{tileY}_{tileWidth}_{tileHeight}.jpg";

/// Object name of a slide thumbnail.
pub const THUMBNAIL_NAMING_FORMAT: &str = "{id}_thumbnail.jpg";

/// Values substituted into a tile template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCoordinates<'a> {
    pub id: &'a str,
    pub level: usize,
    pub x: u64,
    pub y: u64,
    pub width: u32,
    pub height: u32,
}

/// Expand every tile placeholder in `template`.
pub fn expand_tile(template: &str, coords: &TileCoordinates<'_>) -> String {
    template
        .replace(ID, coords.id)
        .replace(LEVEL, &coords.level.to_string())
        .replace(TILE_X, &coords.x.to_string())
        .replace(TILE_Y, &coords.y.to_string())
        .replace(TILE_WIDTH, &coords.width.to_string())
        .replace(TILE_HEIGHT, &coords.height.to_string())
}

/// Expand only the slide id placeholder.
pub fn expand_id(template: &str, id: &str) -> String {
    template.replace(ID, id)
}

/// Join a public base URL and an object template with exactly one slash.
pub fn join_uri(base: &str, template: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        template.trim_start_matches('/')
    )
}
