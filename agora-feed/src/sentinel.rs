/// Tracks the visibility of the marker at the bottom of a listing.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct ScrollSentinel {
    visible: bool,
}

impl ScrollSentinel {
    /// Records a visibility change and returns whether the marker just came into view.
    pub fn observe(&mut self, visible: bool) -> bool {
        let appeared = visible && !self.visible;
        self.visible = visible;
        appeared
    }

    #[must_use]
    pub fn is_visible(self) -> bool {
        self.visible
    }
}

#[cfg(test)]
mod tests {
    use crate::sentinel::ScrollSentinel;

    #[test]
    fn fires_once_per_appearance() {
        let mut sentinel = ScrollSentinel::default();
        assert!(!sentinel.observe(false));
        assert!(sentinel.observe(true));
        assert!(!sentinel.observe(true));
        assert!(!sentinel.observe(true));
        assert!(sentinel.is_visible());

        assert!(!sentinel.observe(false));
        assert!(sentinel.observe(true));
    }
}
