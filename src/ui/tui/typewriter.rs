//! Character-by-character reveal of a fixed string.

use std::time::Duration;

/// Reveals `text` one character per `delay`.
///
/// The first character appears after one `delay`, matching a timer that
/// fires once per character.
#[derive(Debug, Clone)]
pub struct Typewriter {
    text: String,
    delay: Duration,
    shown: usize,
    until_next: Duration,
}

impl Typewriter {
    pub fn new(text: impl Into<String>, delay: Duration) -> Self {
        Self {
            text: text.into(),
            delay,
            shown: 0,
            until_next: delay,
        }
    }

    /// Move time forward by `dt`.
    pub fn advance(&mut self, dt: Duration) {
        let total = self.text.chars().count();
        if self.shown >= total {
            return;
        }
        if self.delay.is_zero() {
            self.shown = total;
            return;
        }

        let mut remaining = dt;
        while self.shown < total && remaining >= self.until_next {
            remaining -= self.until_next;
            self.shown += 1;
            self.until_next = self.delay;
        }
        if self.shown < total {
            self.until_next -= remaining;
        }
    }

    /// The part of the text revealed so far.
    pub fn visible(&self) -> &str {
        char_prefix(&self.text, self.shown)
    }

    pub fn is_done(&self) -> bool {
        self.shown >= self.text.chars().count()
    }
}

/// The first `count` characters of `text`.
pub fn char_prefix(text: &str, count: usize) -> &str {
    match text.char_indices().nth(count) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(150);

    #[test]
    fn test_title_reveal_timing() {
        let mut title = Typewriter::new("blacksmith", DELAY);
        assert_eq!(title.visible(), "");

        title.advance(Duration::from_millis(149));
        assert_eq!(title.visible(), "");
        title.advance(Duration::from_millis(1));
        assert_eq!(title.visible(), "b");

        title.advance(Duration::from_millis(300));
        assert_eq!(title.visible(), "bla");
        assert!(!title.is_done());

        title.advance(Duration::from_millis(1050));
        assert_eq!(title.visible(), "blacksmith");
        assert!(title.is_done());
    }

    #[test]
    fn test_many_small_steps_match_one_large_step() {
        let mut stepped = Typewriter::new("blacksmith", DELAY);
        for _ in 0..45 {
            stepped.advance(Duration::from_millis(10));
        }
        let mut jumped = Typewriter::new("blacksmith", DELAY);
        jumped.advance(Duration::from_millis(450));
        assert_eq!(stepped.visible(), jumped.visible());
        assert_eq!(stepped.visible(), "bla");
    }

    #[test]
    fn test_char_prefix_respects_boundaries() {
        assert_eq!(char_prefix("héllo", 2), "hé");
        assert_eq!(char_prefix("abc", 10), "abc");
        assert_eq!(char_prefix("", 3), "");
    }
}
