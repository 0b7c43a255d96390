use std::time::{Duration, Instant};

use crate::media::MediaItem;

/// Time the displayed media stays faded out before its source is swapped.
pub const FADE_DURATION: Duration = Duration::from_millis(300);

/// 1x1 transparent GIF shown by thumbnails that have not been revealed yet.
pub const PLACEHOLDER_SRC: &str =
    "data:image/gif;base64,R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullscreenRequest {
    Enter,
    Exit,
}

#[derive(Debug, Clone)]
struct Thumbnail {
    item: MediaItem,
    loaded: bool,
}

#[derive(Debug, Clone, Copy)]
struct PendingSwap {
    target: usize,
    swap_at: Instant,
}

/// Displayed media, thumbnail strip and fullscreen flag.
///
/// Time is passed in by the caller: `select` starts the fade and `poll`
/// finishes it once `FADE_DURATION` has elapsed.
#[derive(Debug, Clone)]
pub struct Viewer {
    thumbnails: Vec<Thumbnail>,
    active: Option<usize>,
    displayed: Option<usize>,
    visible: bool,
    playing: bool,
    pending: Option<PendingSwap>,
    fullscreen: bool,
}

impl Viewer {
    pub fn new(items: Vec<MediaItem>) -> Self {
        let displayed = if items.is_empty() { None } else { Some(0) };
        Self {
            thumbnails: items
                .into_iter()
                .map(|item| Thumbnail {
                    item,
                    loaded: false,
                })
                .collect(),
            active: None,
            displayed,
            visible: true,
            playing: false,
            pending: None,
            fullscreen: false,
        }
    }

    pub fn len(&self) -> usize {
        self.thumbnails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thumbnails.is_empty()
    }

    pub fn item(&self, index: usize) -> Option<&MediaItem> {
        self.thumbnails.get(index).map(|t| &t.item)
    }

    /// Start showing `index`: fade out now, swap at `now + FADE_DURATION`.
    /// The thumbnail becomes the only active one immediately.
    pub fn select(&mut self, index: usize, now: Instant) -> bool {
        if index >= self.thumbnails.len() {
            return false;
        }
        self.visible = false;
        self.pending = Some(PendingSwap {
            target: index,
            swap_at: now + FADE_DURATION,
        });
        self.active = Some(index);
        true
    }

    /// Finish a due fade. Returns true when the displayed media changed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.pending {
            Some(swap) if now >= swap.swap_at => {
                self.pending = None;
                self.displayed = Some(swap.target);
                self.visible = true;
                // Videos are reloaded and started on every swap.
                self.playing = self.thumbnails[swap.target].item.is_video();
                true
            }
            _ => false,
        }
    }

    pub fn is_transitioning(&self) -> bool {
        self.pending.is_some()
    }

    pub fn displayed(&self) -> Option<&MediaItem> {
        self.displayed.and_then(|i| self.item(i))
    }

    pub fn displayed_index(&self) -> Option<usize> {
        self.displayed
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.active == Some(index)
    }

    /// Opacity of the displayed media: false while faded out.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Upgrade thumbnails that just entered the viewport to their real
    /// source. Each thumbnail is upgraded at most once; the indices
    /// upgraded by this call are returned.
    pub fn reveal(&mut self, visible: impl IntoIterator<Item = usize>) -> Vec<usize> {
        let mut upgraded = Vec::new();
        for index in visible {
            if let Some(thumb) = self.thumbnails.get_mut(index) {
                if !thumb.loaded {
                    thumb.loaded = true;
                    upgraded.push(index);
                }
            }
        }
        upgraded
    }

    /// Whether the thumbnail is still waiting to become visible.
    pub fn is_observed(&self, index: usize) -> bool {
        self.thumbnails.get(index).is_some_and(|t| !t.loaded)
    }

    pub fn thumbnail_src(&self, index: usize) -> Option<&str> {
        self.thumbnails.get(index).map(|t| {
            if t.loaded {
                t.item.source.as_str()
            } else {
                PLACEHOLDER_SRC
            }
        })
    }

    /// What a double-click on the displayed media should ask the platform
    /// for. The visual flag only follows `on_fullscreen_change`.
    pub fn fullscreen_request(&self, platform_is_fullscreen: bool) -> FullscreenRequest {
        if platform_is_fullscreen {
            FullscreenRequest::Exit
        } else {
            FullscreenRequest::Enter
        }
    }

    pub fn on_fullscreen_change(&mut self, is_fullscreen: bool) {
        self.fullscreen = is_fullscreen;
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }
}
