//! The token-budget fitter: render → measure → shrink until the prompt fits.

use super::element::Shrinkable;
use super::tokenizer::{DEFAULT_COUNT_MODEL, count_tokens};
use crate::Fragment;
use tracing::info;

/// Default cap on shrink iterations.
const DEFAULT_MAX_ITERATIONS: usize = 20;

/// Options for [`fit_tokens`].
#[derive(Debug, Clone)]
pub struct FitOptions {
    /// The token budget. `None` disables fitting entirely: the root is
    /// rendered once and returned unchanged.
    pub max_tokens: Option<usize>,
    /// Cap on shrink iterations before giving up best-effort.
    pub max_iterations: usize,
    /// Model identifier used to resolve the counting tokenizer.
    pub model: String,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_tokens: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            model: DEFAULT_COUNT_MODEL.to_string(),
        }
    }
}

impl FitOptions {
    /// Set the token budget.
    pub fn tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Override the shrink-iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Override the counting model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Shrink `root` until its rendered text fits the token budget.
///
/// Token counts cover only the textual parts of the fragment; image parts
/// are excluded. If the budget cannot be met within `max_iterations` shrink
/// calls, the last rendered fragment is returned as-is (best effort, not a
/// failure) and a diagnostic is logged with the final count.
pub fn fit_tokens(root: &mut dyn Shrinkable, options: &FitOptions) -> Fragment {
    let Some(max_tokens) = options.max_tokens else {
        return root.render();
    };

    let mut fragment = root.render();
    let mut n_tokens = count_tokens(&fragment.text_content(), &options.model);
    for _ in 0..options.max_iterations {
        if n_tokens <= max_tokens {
            return fragment;
        }
        root.shrink();
        fragment = root.render();
        n_tokens = count_tokens(&fragment.text_content(), &options.model);
    }

    if n_tokens > max_tokens {
        info!(
            "prompt still {n_tokens} tokens (> {max_tokens}) after {} shrink iterations, \
             returning it as is",
            options.max_iterations,
        );
    }
    fragment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::element::PromptElement;
    use crate::prompt::shrink::TailTruncator;

    /// Shrinkable that records how many times it was shrunk.
    struct CountingElement {
        shrinks: usize,
        body: String,
    }

    impl CountingElement {
        fn new(body: &str) -> Self {
            Self {
                shrinks: 0,
                body: body.to_string(),
            }
        }
    }

    impl PromptElement for CountingElement {
        fn is_visible(&self) -> bool {
            true
        }

        fn render(&self) -> Fragment {
            Fragment::Text(self.body.clone())
        }
    }

    impl Shrinkable for CountingElement {
        fn shrink(&mut self) {
            self.shrinks += 1;
        }
    }

    fn long_text() -> String {
        (0..200)
            .map(|i| format!("observation line number {i} with some payload"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn no_budget_returns_render_unchanged_without_shrinking() {
        let mut element = CountingElement::new("anything at all");
        let fragment = fit_tokens(&mut element, &FitOptions::default());
        assert_eq!(fragment.text_content(), "anything at all");
        assert_eq!(element.shrinks, 0);
    }

    #[test]
    fn within_budget_returns_immediately() {
        let mut element = CountingElement::new("tiny");
        let fragment = fit_tokens(&mut element, &FitOptions::default().tokens(10_000));
        assert_eq!(fragment.text_content(), "tiny");
        assert_eq!(element.shrinks, 0);
    }

    #[test]
    fn shrinks_until_it_fits() {
        let text = long_text();
        let full_tokens = count_tokens(&text, DEFAULT_COUNT_MODEL);
        let mut truncator = TailTruncator::new(&text, true).with_start_iteration(0);

        let budget = full_tokens / 2;
        let fragment = fit_tokens(&mut truncator, &FitOptions::default().tokens(budget));
        let fitted = count_tokens(&fragment.text_content(), DEFAULT_COUNT_MODEL);
        assert!(fitted <= budget, "{fitted} > {budget}");
    }

    #[test]
    fn impossible_budget_exhausts_iterations_without_raising() {
        let text = long_text();
        let first_pass = count_tokens(&text, DEFAULT_COUNT_MODEL);
        let mut truncator = TailTruncator::new(&text, true).with_start_iteration(0);

        let options = FitOptions::default().tokens(0).with_max_iterations(5);
        let fragment = fit_tokens(&mut truncator, &options);
        let final_tokens = count_tokens(&fragment.text_content(), DEFAULT_COUNT_MODEL);
        assert!(final_tokens <= first_pass);
        assert!(!fragment.is_empty());
    }

    #[test]
    fn image_parts_do_not_count_against_the_budget() {
        struct ImageElement;
        impl PromptElement for ImageElement {
            fn is_visible(&self) -> bool {
                true
            }
            fn render(&self) -> Fragment {
                let mut fragment = Fragment::from("caption");
                fragment.push_image("data:image/jpeg;base64,".to_string() + &"A".repeat(100_000));
                fragment
            }
        }
        impl Shrinkable for ImageElement {
            fn shrink(&mut self) {}
        }

        let caption_tokens = count_tokens("caption", DEFAULT_COUNT_MODEL);
        let mut element = ImageElement;
        let fragment = fit_tokens(&mut element, &FitOptions::default().tokens(caption_tokens));
        assert!(matches!(fragment, Fragment::Parts(_)));
    }
}
