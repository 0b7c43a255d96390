use std::time::Instant;

use crate::media::MediaItem;
use crate::slideshow::Slideshow;
use crate::viewer::{FullscreenRequest, Viewer};

/// Snapshot of what the page shows: the shared index and the toggle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GalleryState {
    pub current_index: usize,
    pub slideshow_active: bool,
}

/// Viewer and slideshow driven as one unit. Both write `current_index`;
/// every event handler runs to completion before the next one.
#[derive(Debug, Clone)]
pub struct GallerySession {
    viewer: Viewer,
    slideshow: Slideshow,
    current_index: usize,
}

impl GallerySession {
    pub fn new(items: Vec<MediaItem>) -> Self {
        Self::with_slideshow(items, Slideshow::default())
    }

    pub fn with_slideshow(items: Vec<MediaItem>, slideshow: Slideshow) -> Self {
        Self {
            viewer: Viewer::new(items),
            slideshow,
            current_index: 0,
        }
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn slideshow(&self) -> &Slideshow {
        &self.slideshow
    }

    pub fn state(&self) -> GalleryState {
        GalleryState {
            current_index: self.current_index,
            slideshow_active: self.slideshow.is_running(),
        }
    }

    /// Manual selection. Stops the slideshow before returning so no pending
    /// tick can override the user's choice.
    pub fn click_thumbnail(&mut self, index: usize, now: Instant) -> bool {
        if !self.viewer.select(index, now) {
            return false;
        }
        self.current_index = index;
        self.slideshow.stop();
        true
    }

    pub fn toggle_slideshow(&mut self, now: Instant) -> bool {
        self.slideshow.toggle(now)
    }

    /// Run every slideshow tick due by `now`, then let the viewer finish
    /// its fade. Returns the number of ticks processed.
    pub fn advance(&mut self, now: Instant) -> usize {
        let ticks = self.slideshow.due_ticks(now);
        let len = self.viewer.len();
        for &tick in &ticks {
            // A single item cycles onto itself; nothing to show.
            if len <= 1 {
                continue;
            }
            self.current_index = (self.current_index + 1) % len;
            self.viewer.poll(tick);
            self.viewer.select(self.current_index, tick);
        }
        self.viewer.poll(now);
        ticks.len()
    }

    pub fn double_click(&self, platform_is_fullscreen: bool) -> FullscreenRequest {
        self.viewer.fullscreen_request(platform_is_fullscreen)
    }

    pub fn fullscreen_changed(&mut self, is_fullscreen: bool) {
        self.viewer.on_fullscreen_change(is_fullscreen);
    }

    pub fn thumbnails_visible(&mut self, indices: impl IntoIterator<Item = usize>) -> Vec<usize> {
        self.viewer.reveal(indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slideshow::{ACTIVE_SYMBOL, INACTIVE_SYMBOL, SLIDESHOW_PERIOD};
    use crate::viewer::FADE_DURATION;
    use std::time::Duration;

    fn session(n: usize) -> GallerySession {
        GallerySession::new((0..n).map(|i| MediaItem::image(format!("{i}.jpg"))).collect())
    }

    #[test]
    fn initial_state() {
        let s = session(3);
        assert_eq!(
            s.state(),
            GalleryState {
                current_index: 0,
                slideshow_active: false
            }
        );
    }

    #[test]
    fn click_sets_index_and_displays_after_fade() {
        let t0 = Instant::now();
        let mut s = session(4);
        assert!(s.click_thumbnail(2, t0));
        s.advance(t0 + FADE_DURATION);

        assert_eq!(s.state().current_index, 2);
        assert_eq!(s.viewer().displayed().unwrap().source, "2.jpg");
        let active: Vec<usize> = (0..4).filter(|&i| s.viewer().is_active(i)).collect();
        assert_eq!(active, vec![2]);
    }

    #[test]
    fn slideshow_advances_modulo_len() {
        for n in 2..6 {
            for k in 0..12u32 {
                let t0 = Instant::now();
                let mut s = session(n);
                s.click_thumbnail(1, t0);
                s.toggle_slideshow(t0);

                s.advance(t0 + SLIDESHOW_PERIOD * k);
                assert_eq!(s.state().current_index, (1 + k as usize) % n);
                assert!(s.state().slideshow_active);
            }
        }
    }

    #[test]
    fn slideshow_displays_each_tick_after_fade() {
        let t0 = Instant::now();
        let mut s = session(3);
        s.toggle_slideshow(t0);

        s.advance(t0 + SLIDESHOW_PERIOD + FADE_DURATION);
        assert_eq!(s.viewer().displayed().unwrap().source, "1.jpg");
        assert!(s.viewer().is_active(1));
    }

    #[test]
    fn manual_selection_stops_slideshow() {
        let t0 = Instant::now();
        let mut s = session(5);
        s.toggle_slideshow(t0);
        assert_eq!(s.slideshow().symbol(), ACTIVE_SYMBOL);

        s.advance(t0 + SLIDESHOW_PERIOD);
        assert_eq!(s.state().current_index, 1);

        s.click_thumbnail(3, t0 + SLIDESHOW_PERIOD + Duration::from_millis(10));
        assert!(!s.state().slideshow_active);
        assert_eq!(s.slideshow().symbol(), INACTIVE_SYMBOL);

        // No further automatic advancement
        let ticks = s.advance(t0 + SLIDESHOW_PERIOD * 20);
        assert_eq!(ticks, 0);
        assert_eq!(s.state().current_index, 3);
        assert_eq!(s.viewer().displayed().unwrap().source, "3.jpg");
    }

    #[test]
    fn empty_gallery_ticks_without_panicking() {
        let t0 = Instant::now();
        let mut s = session(0);
        s.toggle_slideshow(t0);
        assert_eq!(s.advance(t0 + SLIDESHOW_PERIOD * 3), 3);
        assert_eq!(s.state().current_index, 0);
        assert!(s.viewer().displayed().is_none());
    }

    #[test]
    fn single_item_gallery_shows_no_change() {
        let t0 = Instant::now();
        let mut s = session(1);
        s.toggle_slideshow(t0);
        s.advance(t0 + SLIDESHOW_PERIOD * 2);
        assert_eq!(s.state().current_index, 0);
        assert!(s.viewer().is_visible());
        assert!(!s.viewer().is_transitioning());
    }

    #[test]
    fn click_out_of_range_keeps_slideshow_running() {
        let t0 = Instant::now();
        let mut s = session(2);
        s.toggle_slideshow(t0);
        assert!(!s.click_thumbnail(7, t0));
        assert!(s.state().slideshow_active);
    }

    #[test]
    fn fullscreen_and_lazy_loading_forwarded() {
        let mut s = session(2);
        assert_eq!(s.double_click(false), FullscreenRequest::Enter);
        s.fullscreen_changed(true);
        assert!(s.viewer().is_fullscreen());
        assert_eq!(s.thumbnails_visible([1]), vec![1]);
        assert_eq!(s.viewer().thumbnail_src(1), Some("1.jpg"));
    }
}
