//! Token-bounded accumulation window shared by the windowed parsers.
//!
//! ```text
//! IDLE ──open()──▶ ACCUMULATING ──visit(): budget reached or last page──▶ FLUSH ──▶ IDLE
//! ```
//!
//! While accumulating, every visited page's URL joins the provenance list.
//! A page is appended to the buffer only if the running total stays
//! strictly below the budget. On flush the passage is the buffer when the
//! current page made it in, otherwise the current page's text alone.

use super::Page;
use crate::tokens;

/// What to send to the oracle when a window closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flush {
    pub passage: String,
    /// URLs of every page visited while the window was open.
    pub provenance: Vec<String>,
    /// Whether the flushing page is part of `passage` with earlier pages,
    /// as opposed to being queried on its own.
    pub buffered: bool,
}

#[derive(Debug, Clone)]
pub struct SectionWindow {
    budget: usize,
    text: String,
    tokens: usize,
    provenance: Vec<String>,
    active: bool,
}

impl SectionWindow {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            text: String::new(),
            tokens: 0,
            provenance: Vec::new(),
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Start accumulating. Reopening an active window changes nothing.
    pub fn open(&mut self) {
        self.active = true;
    }

    /// Running token total of the buffered pages.
    pub fn tokens(&self) -> usize {
        self.tokens
    }

    /// Feed the next page. Returns the flush when the window closes.
    ///
    /// Does nothing while idle.
    pub fn visit(&mut self, page: &Page) -> Option<Flush> {
        if !self.active {
            return None;
        }

        let tentative = self.tokens + tokens::count(&page.text);
        self.provenance.push(page.url.clone());

        let included = tentative < self.budget;
        if included {
            if !self.text.is_empty() {
                self.text.push('\n');
            }
            self.text.push_str(&page.text);
            self.tokens = tentative;
        }

        if tentative < self.budget && !page.is_last {
            return None;
        }

        let passage = if included {
            std::mem::take(&mut self.text)
        } else {
            page.text.clone()
        };
        let flush = Flush {
            passage,
            provenance: std::mem::take(&mut self.provenance),
            buffered: included,
        };
        self.reset();
        Some(flush)
    }

    fn reset(&mut self) {
        self.text.clear();
        self.tokens = 0;
        self.provenance.clear();
        self.active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sections::testing::pages;

    /// ASCII text of exactly `n` estimated tokens.
    fn text_of(n: usize, tag: char) -> String {
        std::iter::repeat(tag).take(n * 4).collect()
    }

    #[test]
    fn idle_window_ignores_pages() {
        let ps = pages(&["a", "b"]);
        let mut w = SectionWindow::new(10);
        assert_eq!(w.visit(&ps[1]), None);
        assert!(!w.is_active());
    }

    #[test]
    fn flushes_at_last_page_with_whole_buffer() {
        let ps = pages(&["intro", "quorum one", "two", "three"]);
        let mut w = SectionWindow::new(1000);
        assert_eq!(w.visit(&ps[0]), None);
        w.open();
        assert_eq!(w.visit(&ps[1]), None);
        assert_eq!(w.visit(&ps[2]), None);
        let flush = w.visit(&ps[3]).unwrap();
        assert_eq!(flush.passage, "quorum one\ntwo\nthree");
        assert_eq!(flush.provenance, vec!["u2", "u3", "u4"]);
        assert!(flush.buffered);
        assert!(!w.is_active());
        assert_eq!(w.tokens(), 0);
    }

    #[test]
    fn page_reaching_budget_is_queried_alone() {
        let a = text_of(6, 'a');
        let b = text_of(4, 'b');
        let c = text_of(1, 'c');
        let ps = pages(&[&a, &b, &c]);

        let mut w = SectionWindow::new(10);
        w.open();
        assert_eq!(w.visit(&ps[0]), None);
        assert_eq!(w.tokens(), 6);

        // 6 + 4 == budget: excluded from the buffer, flushed standalone.
        let flush = w.visit(&ps[1]).unwrap();
        assert_eq!(flush.passage, b);
        assert!(!flush.buffered);
        assert_eq!(flush.provenance, vec!["u1", "u2"]);

        // Back to idle: the third page is not accumulated.
        assert_eq!(w.visit(&ps[2]), None);
    }

    #[test]
    fn reopening_keeps_accumulated_state() {
        let ps = pages(&["quorum a", "quorum b", "end"]);
        let mut w = SectionWindow::new(1000);
        w.open();
        w.visit(&ps[0]);
        w.open();
        w.visit(&ps[1]);
        let flush = w.visit(&ps[2]).unwrap();
        assert_eq!(flush.provenance.len(), 3);
    }
}
