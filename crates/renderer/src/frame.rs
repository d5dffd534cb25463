//! Frame-in-flight bookkeeping.
//!
//! [`FrameTracker`] cycles frame slots and tracks swapchain image ownership.
//! [`ResizeTracker`] decides, at the start of every frame, whether to
//! render, skip because the window is minimized, or rebuild the swapchain
//! for a new framebuffer size.

/// Tracks which frame slot is being recorded and which slot last used each
/// swapchain image.
///
/// `images_in_flight[i]` holds the frame slot whose submission last
/// rendered to swapchain image `i`. When an image is acquired again while
/// that slot's fence has not been waited on, the caller must wait on it
/// before reusing the image. This happens whenever the swapchain has a
/// different number of images than there are frame slots.
#[derive(Debug, Clone)]
pub struct FrameTracker {
    /// Current frame slot (0 to max_frames_in_flight - 1)
    current_frame: usize,
    max_frames_in_flight: usize,
    images_in_flight: Vec<Option<usize>>,
    /// Swapchain image acquired for the current frame
    image_index: u32,
}

impl FrameTracker {
    pub fn new(max_frames_in_flight: usize, image_count: usize) -> Self {
        Self {
            current_frame: 0,
            max_frames_in_flight: max_frames_in_flight.max(1),
            images_in_flight: vec![None; image_count],
            image_index: 0,
        }
    }

    #[inline]
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    #[inline]
    pub fn max_frames_in_flight(&self) -> usize {
        self.max_frames_in_flight
    }

    #[inline]
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// Records `image_index` as owned by the current frame slot.
    ///
    /// Returns the slot that previously rendered to this image if it is a
    /// different slot; its fence must be waited on before recording.
    pub fn claim_image(&mut self, image_index: u32) -> Option<usize> {
        let index = image_index as usize;
        if index >= self.images_in_flight.len() {
            self.images_in_flight.resize(index + 1, None);
        }

        self.image_index = image_index;

        let previous = self.images_in_flight[index].replace(self.current_frame);
        previous.filter(|&slot| slot != self.current_frame)
    }

    /// Moves to the next frame slot.
    pub fn advance(&mut self) {
        self.current_frame = (self.current_frame + 1) % self.max_frames_in_flight;
    }

    /// Forgets image ownership after a swapchain rebuild. The current slot
    /// is kept.
    pub fn reset_images(&mut self, image_count: usize) {
        self.images_in_flight.clear();
        self.images_in_flight.resize(image_count, None);
    }

    pub fn images_in_flight(&self) -> &[Option<usize>] {
        &self.images_in_flight
    }
}

/// What the frame driver should do at the start of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAction {
    /// Acquire an image and record the frame.
    Render,
    /// The framebuffer is 0x0; skip without touching the swapchain.
    SkipMinimized,
    /// The framebuffer size changed since the last rebuild; rebuild the
    /// swapchain and skip the frame.
    Rebuild,
}

/// Framebuffer size and its generation counters.
///
/// Every resize bumps `size_generation`. Every swapchain rebuild, whether
/// started by a resize or by an out-of-date acquire or present, records the
/// current generation as `last_generation`. A resize is pending while the
/// two differ, so each resize produces at most one rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeTracker {
    width: u32,
    height: u32,
    size_generation: u64,
    last_generation: u64,
}

impl ResizeTracker {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            size_generation: 0,
            last_generation: 0,
        }
    }

    /// Records a new framebuffer size and bumps the size generation.
    pub fn resized(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.size_generation += 1;
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn size_generation(&self) -> u64 {
        self.size_generation
    }

    #[inline]
    pub fn last_generation(&self) -> u64 {
        self.last_generation
    }

    #[inline]
    pub fn is_minimized(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    pub fn has_pending_resize(&self) -> bool {
        self.size_generation != self.last_generation
    }

    /// Decides what the next frame does. A minimized framebuffer wins over
    /// a pending resize; the rebuild waits until the size is non-zero.
    pub fn next_action(&self) -> FrameAction {
        if self.is_minimized() {
            FrameAction::SkipMinimized
        } else if self.has_pending_resize() {
            FrameAction::Rebuild
        } else {
            FrameAction::Render
        }
    }

    /// Marks the current size as built. Call after every successful
    /// swapchain rebuild.
    pub fn mark_rebuilt(&mut self) {
        self.last_generation = self.size_generation;
    }
}
