use std::path::Path;

pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "svg", "avif", "tiff", "tif",
];

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "ogv", "mov", "m4v", "mkv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Kind from a file extension (case-insensitive), `None` for anything else.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    /// Kind from a declared media type such as `image/png`.
    pub fn from_mime(mime: &str) -> Option<Self> {
        if mime.starts_with("image/") {
            Some(MediaKind::Image)
        } else if mime.starts_with("video/") {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// One entry of the gallery. Built once when the gallery is assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub source: String,
    pub kind: MediaKind,
}

impl MediaItem {
    pub fn new(source: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            source: source.into(),
            kind,
        }
    }

    pub fn image(source: impl Into<String>) -> Self {
        Self::new(source, MediaKind::Image)
    }

    pub fn video(source: impl Into<String>) -> Self {
        Self::new(source, MediaKind::Video)
    }

    /// Build an item from a path, keeping the path as the source URL.
    pub fn from_rel_path(rel: &str) -> Option<Self> {
        MediaKind::from_path(Path::new(rel)).map(|kind| Self::new(rel, kind))
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }
}

pub fn is_media(path: &Path) -> bool {
    MediaKind::from_path(path).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_image_extensions() {
        assert_eq!(MediaKind::from_path(Path::new("a.jpg")), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_path(Path::new("a.PNG")), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_path(Path::new("dir/a.webp")), Some(MediaKind::Image));
    }

    #[test]
    fn kind_from_video_extensions() {
        assert_eq!(MediaKind::from_path(Path::new("clip.mp4")), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_path(Path::new("clip.WebM")), Some(MediaKind::Video));
    }

    #[test]
    fn kind_none_for_other_files() {
        assert_eq!(MediaKind::from_path(Path::new("index.html")), None);
        assert_eq!(MediaKind::from_path(Path::new("notes.txt")), None);
        assert_eq!(MediaKind::from_path(Path::new("noext")), None);
    }

    #[test]
    fn kind_from_mime() {
        assert_eq!(MediaKind::from_mime("image/png"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_mime("video/mp4"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_mime("application/pdf"), None);
        assert_eq!(MediaKind::from_mime("imagex/png"), None);
    }

    #[test]
    fn item_from_rel_path() {
        let item = MediaItem::from_rel_path("media/clip.mp4").unwrap();
        assert_eq!(item.source, "media/clip.mp4");
        assert!(item.is_video());
        assert!(MediaItem::from_rel_path("style.css").is_none());
    }
}
