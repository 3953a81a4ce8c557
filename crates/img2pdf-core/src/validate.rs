//! Name-based image format filter.
//!
//! This is a cheap pre-filter, not a security boundary: no magic bytes are
//! inspected here, so a misnamed file passes and fails later at decode time.

/// Extensions accepted as raster images (lowercase, without the dot).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif"];

/// Check whether a filename or path carries a supported image extension.
///
/// A name that is only an extension, such as `.png`, is treated as a hidden
/// file with no extension and rejected, unlike a plain suffix match.
pub fn is_supported(filename: &str) -> bool {
    extension_of(filename).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Lowercased extension of the final path component, if any.
pub fn extension_of(filename: &str) -> Option<String> {
    let name = base_name(filename);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Strip any directory components a client may have sent with the name.
///
/// Handles both `/` and `\` separators since browsers on Windows have been
/// known to send full paths.
pub fn base_name(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
}
