//! Utility functions shared across the crate.

use std::path::{Path, PathBuf};

/// Get the user's config directory following XDG conventions.
///
/// Returns `$XDG_CONFIG_HOME` if set, otherwise `$HOME/.config`.
pub fn config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
}

/// Default shared directory for staged request files.
pub fn default_staging_dir() -> PathBuf {
    std::env::temp_dir().join("img2pdf-staging")
}

/// Append `.pdf` unless the name already ends with it (case-insensitive).
pub fn with_pdf_extension(name: &str) -> String {
    if name.to_lowercase().ends_with(".pdf") {
        name.to_string()
    } else {
        format!("{name}.pdf")
    }
}

/// Path variant of [`with_pdf_extension`].
pub fn pdf_output_path(path: &Path) -> PathBuf {
    let as_str = path.to_string_lossy();
    if as_str.to_lowercase().ends_with(".pdf") {
        path.to_path_buf()
    } else {
        PathBuf::from(format!("{as_str}.pdf"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_pdf_extension() {
        assert_eq!(with_pdf_extension("album"), "album.pdf");
        assert_eq!(with_pdf_extension("album.pdf"), "album.pdf");
        assert_eq!(with_pdf_extension("ALBUM.PDF"), "ALBUM.PDF");
        assert_eq!(with_pdf_extension("scan.png"), "scan.png.pdf");
    }

    #[test]
    fn test_pdf_output_path() {
        assert_eq!(pdf_output_path(Path::new("out/book")), PathBuf::from("out/book.pdf"));
        assert_eq!(pdf_output_path(Path::new("out/book.Pdf")), PathBuf::from("out/book.Pdf"));
    }
}
