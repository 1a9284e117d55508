//! Engine-neutral element locators.
//!
//! A [`Locator`] describes a set of elements as a chain of steps applied to
//! the document. It holds no element handles, so it stays valid across
//! re-renders: every operation re-resolves it against the live page.

use std::fmt;

/// One transformation of the current element set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Descendants of each element matching a CSS selector.
    Css(String),
    /// Keep only the element at this index.
    Nth(usize),
    /// Replace each element with its previous element sibling.
    PrecedingSibling,
    /// Keep only rendered, visible elements.
    Visible,
    /// Keep elements whose text contains the needle (case-insensitive).
    HasText(String),
    /// Keep the smallest elements whose text contains the needle (case-insensitive).
    Text(String),
}

/// A chain of [`Step`]s resolving to zero or more elements.
///
/// Single-element operations (text, click, ...) act on the first element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    steps: Vec<Step>,
}

impl Locator {
    /// All elements in the document matching `selector`.
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            steps: vec![Step::Css(selector.into())],
        }
    }

    /// The innermost body elements whose text contains `needle`.
    pub fn text(needle: impl Into<String>) -> Self {
        Self::css("body *").then(Step::Text(needle.into().to_lowercase()))
    }

    /// Descendants of this locator's elements matching `selector`.
    pub fn locate(&self, selector: impl Into<String>) -> Self {
        self.clone().then(Step::Css(selector.into()))
    }

    pub fn nth(&self, index: usize) -> Self {
        self.clone().then(Step::Nth(index))
    }

    pub fn first(&self) -> Self {
        self.nth(0)
    }

    /// The element immediately before each element, e.g. the row above a table row.
    pub fn preceding_sibling(&self) -> Self {
        self.clone().then(Step::PrecedingSibling)
    }

    pub fn visible(&self) -> Self {
        self.clone().then(Step::Visible)
    }

    pub fn has_text(&self, needle: impl Into<String>) -> Self {
        self.clone().then(Step::HasText(needle.into().to_lowercase()))
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    fn then(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(" >> ")?;
            }
            match step {
                Step::Css(sel) => write!(f, "css({sel})")?,
                Step::Nth(n) => write!(f, "nth({n})")?,
                Step::PrecedingSibling => f.write_str("preceding-sibling")?,
                Step::Visible => f.write_str("visible")?,
                Step::HasText(t) => write!(f, "has-text({t:?})")?,
                Step::Text(t) => write!(f, "text({t:?})")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_appends_steps_in_order() {
        let loc = Locator::css("tr.detail").visible().nth(2).preceding_sibling().locate("a");
        assert_eq!(
            loc.steps(),
            &[
                Step::Css("tr.detail".into()),
                Step::Visible,
                Step::Nth(2),
                Step::PrecedingSibling,
                Step::Css("a".into()),
            ]
        );
    }

    #[test]
    fn text_needles_are_lowercased() {
        let loc = Locator::text("Page 1 of About");
        assert_eq!(loc.steps()[1], Step::Text("page 1 of about".into()));

        let loc = Locator::css("button").has_text("More");
        assert_eq!(loc.steps()[1], Step::HasText("more".into()));
    }

    #[test]
    fn display_is_readable() {
        let loc = Locator::css("h2").visible().first();
        assert_eq!(loc.to_string(), "css(h2) >> visible >> nth(0)");
    }

    #[test]
    fn derived_locators_leave_parent_untouched() {
        let rows = Locator::css("tr");
        let _first = rows.first();
        assert_eq!(rows.steps().len(), 1);
    }
}
