//! MIME type inference from file extensions.

const DEFAULT_MIME: &str = "application/octet-stream";

/// Fixed extension table. Anything else is `application/octet-stream`.
const MIME_TABLE: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("pdf", "application/pdf"),
    ("mp4", "video/mp4"),
    ("mov", "video/mp4"),
    ("mp3", "audio/mpeg"),
];

/// MIME type for a file name, matched case-insensitively on its extension.
pub fn mime_for_file(file_name: &str) -> &'static str {
    let Some((_, ext)) = file_name.rsplit_once('.') else {
        return DEFAULT_MIME;
    };

    MIME_TABLE
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_MIME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uppercase_extension() {
        assert_eq!(mime_for_file("photo.JPG"), "image/jpeg");
    }

    #[test]
    fn test_unknown_extension() {
        assert_eq!(mime_for_file("archive.zip"), "application/octet-stream");
    }

    #[test]
    fn test_table_entries() {
        assert_eq!(mime_for_file("a.jpeg"), "image/jpeg");
        assert_eq!(mime_for_file("a.png"), "image/png");
        assert_eq!(mime_for_file("a.gif"), "image/gif");
        assert_eq!(mime_for_file("a.webp"), "image/webp");
        assert_eq!(mime_for_file("syllabus.pdf"), "application/pdf");
        assert_eq!(mime_for_file("lesson.mov"), "video/mp4");
        assert_eq!(mime_for_file("lesson.mp4"), "video/mp4");
        assert_eq!(mime_for_file("intro.mp3"), "audio/mpeg");
    }

    #[test]
    fn test_no_extension_and_multiple_dots() {
        assert_eq!(mime_for_file("README"), "application/octet-stream");
        assert_eq!(mime_for_file("notes.v2.Pdf"), "application/pdf");
        assert_eq!(mime_for_file("image.png.bak"), "application/octet-stream");
    }
}
