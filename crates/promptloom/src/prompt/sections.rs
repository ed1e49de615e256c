//! The concrete section vocabulary for one web-agent step.
//!
//! The caller supplies an [`ObsSnapshot`] (what the browser collaborator
//! observed) and an [`ObsFlags`] configuration, and assembles sections into a
//! [`Group`](super::element::Group): instructions, the current observation,
//! the interaction history, the action space, and answer-format sections.
//! Section headers and ordering are part of the wire contract — the history
//! renderer and the answer parser both depend on them.

use super::diff::DiffSection;
use super::element::{PromptElement, Shrinkable, TextSection, Visibility};
use super::shrink::TailTruncator;
use crate::Fragment;
use crate::api::parse::parse_tags_strict;
use crate::error::{ConfigError, ParseError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

// ── Configuration ──────────────────────────────────────────────────

/// Which HTML rendering of the page goes into the prompt.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HtmlSource {
    /// The raw flattened DOM.
    Raw,
    /// The pruned DOM (scripts, styles and invisible nodes removed).
    #[default]
    Pruned,
}

/// Coordinate annotation mode for accessibility-tree nodes.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CoordMode {
    #[default]
    Off,
    /// Center coordinates in parentheses.
    Center,
    /// Full bounding boxes in parentheses.
    Box,
}

/// The fixed option set controlling which fragments are visible and how the
/// observation is rendered.
///
/// Immutable for the duration of one step's prompt construction; supplied by
/// the caller, never loaded from disk here.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct ObsFlags {
    /// Include the page HTML.
    pub use_html: bool,
    /// Include the accessibility tree.
    pub use_ax_tree: bool,
    /// Include the identifier of the focused element.
    pub use_focused_element: bool,
    /// Expose the previous action's error.
    pub use_error_logs: bool,
    /// Include the history of previous steps.
    pub use_history: bool,
    /// With history on, expose errors from all previous steps.
    pub use_past_error_logs: bool,
    /// With history on, include past actions.
    pub use_action_history: bool,
    /// With history on, include past chains of thought.
    pub use_think_history: bool,
    /// Show an HTML / accessibility-tree diff in each history step.
    pub use_diff: bool,
    /// Which HTML rendering to use.
    pub html_source: HtmlSource,
    /// Attach a screenshot of the page to the prompt.
    pub use_screenshot: bool,
    /// Use the set-of-marks overlay screenshot instead of the plain one.
    pub use_som: bool,
    /// Coordinate annotation mode for accessibility-tree nodes.
    pub extract_coords: CoordMode,
    /// Only show elements visible in the viewport.
    pub filter_visible_elements_only: bool,
}

impl Default for ObsFlags {
    fn default() -> Self {
        Self {
            use_html: true,
            use_ax_tree: false,
            use_focused_element: false,
            use_error_logs: false,
            use_history: false,
            use_past_error_logs: false,
            use_action_history: false,
            use_think_history: false,
            use_diff: false,
            html_source: HtmlSource::Pruned,
            use_screenshot: true,
            use_som: false,
            extract_coords: CoordMode::Off,
            filter_visible_elements_only: false,
        }
    }
}

impl ObsFlags {
    /// Deserialize a flags payload, failing fast on anything unrecognized.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        serde_json::from_value(value)
            .map_err(|e| ConfigError(format!("unrecognized observation flags payload: {e}")))
    }
}

// ── Observation collaborator snapshot ──────────────────────────────

/// One step's observation, fully materialized by the browser collaborator.
///
/// This crate only reads these fields; capturing and flattening them is the
/// collaborator's job. Screenshots arrive as already-encoded image URLs.
#[derive(Debug, Clone, Default)]
pub struct ObsSnapshot {
    pub raw_html: String,
    pub pruned_html: String,
    pub axtree_txt: String,
    pub last_action_error: String,
    pub focused_element_bid: Option<String>,
    pub screenshot_url: Option<String>,
    pub screenshot_som_url: Option<String>,
}

impl ObsSnapshot {
    fn html(&self, source: HtmlSource) -> &str {
        match source {
            HtmlSource::Raw => &self.raw_html,
            HtmlSource::Pruned => &self.pruned_html,
        }
    }
}

const VISIBLE_ELEMENTS_NOTE: &str = "Note: only elements that are visible in the viewport are \
presented. You might need to scroll the page, or open tabs or menus to see more.\n\n";

fn coord_note(mode: CoordMode) -> &'static str {
    match mode {
        CoordMode::Off => "",
        CoordMode::Center => {
            "Note: center coordinates are provided in parenthesis and are relative to the top \
             left corner of the page.\n\n"
        }
        CoordMode::Box => {
            "Note: bounding box of each object are provided in parenthesis and are relative to \
             the top left corner of the page.\n\n"
        }
    }
}

fn html_section(obs: &ObsSnapshot, flags: &Arc<ObsFlags>) -> TailTruncator {
    let note = if flags.filter_visible_elements_only {
        VISIBLE_ELEMENTS_NOTE
    } else {
        ""
    };
    let body = format!("\n## HTML:\n{note}{}\n", obs.html(flags.html_source));
    let watched = Arc::clone(flags);
    TailTruncator::new(&body, Visibility::when(move || watched.use_html)).with_start_iteration(5)
}

fn ax_tree_section(obs: &ObsSnapshot, flags: &Arc<ObsFlags>) -> TailTruncator {
    let visible_note = if flags.filter_visible_elements_only {
        VISIBLE_ELEMENTS_NOTE
    } else {
        ""
    };
    let body = format!(
        "\n## AXTree:\n{}{visible_note}{}\n",
        coord_note(flags.extract_coords),
        obs.axtree_txt,
    );
    let watched = Arc::clone(flags);
    TailTruncator::new(&body, Visibility::when(move || watched.use_ax_tree))
        .with_start_iteration(10)
}

fn error_section(error: &str, flags: &Arc<ObsFlags>, heading_prefix: &str) -> TextSection {
    let has_error = !error.is_empty();
    let watched = Arc::clone(flags);
    TextSection::new(
        format!("\n{heading_prefix}Error from previous action:\n{error}\n"),
        Visibility::when(move || watched.use_error_logs && has_error),
    )
}

fn past_error_section(error: &str, flags: &Arc<ObsFlags>) -> TextSection {
    let has_error = !error.is_empty();
    let watched = Arc::clone(flags);
    TextSection::new(
        format!("\n### Error from previous action:\n{error}\n"),
        Visibility::when(move || {
            watched.use_error_logs && watched.use_past_error_logs && has_error
        }),
    )
}

fn focused_element_section(bid: Option<&str>, flags: &ObsFlags) -> TextSection {
    let body = match bid {
        Some(bid) => format!("\n## Focused element:\nbid='{bid}'\n"),
        None => "\n## Focused element:\nNone\n".to_string(),
    };
    TextSection::new(body, flags.use_focused_element)
}

// ── Observation ────────────────────────────────────────────────────

/// Composite rendering the current step's observation: HTML, accessibility
/// tree, focused element, and last-action error, each independently gated.
///
/// Shrinking propagates to the HTML and accessibility-tree truncators (the
/// two unbounded blobs); the other subsections are fixed-size.
pub struct Observation {
    flags: Arc<ObsFlags>,
    screenshot_url: Option<String>,
    screenshot_som_url: Option<String>,
    html: TailTruncator,
    ax_tree: TailTruncator,
    focused: TextSection,
    error: TextSection,
}

impl Observation {
    pub fn new(obs: &ObsSnapshot, flags: Arc<ObsFlags>) -> Self {
        Self {
            html: html_section(obs, &flags),
            ax_tree: ax_tree_section(obs, &flags),
            focused: focused_element_section(obs.focused_element_bid.as_deref(), &flags),
            error: error_section(&obs.last_action_error, &flags, "## "),
            screenshot_url: obs.screenshot_url.clone(),
            screenshot_som_url: obs.screenshot_som_url.clone(),
            flags,
        }
    }

    /// Append the step screenshot to an assembled fragment, if configured.
    ///
    /// Promotes the fragment to the multi-part form. With `use_som` set, the
    /// set-of-marks overlay is preferred over the plain screenshot.
    pub fn attach_screenshot(&self, mut fragment: Fragment) -> Fragment {
        if self.flags.use_screenshot {
            let url = if self.flags.use_som {
                self.screenshot_som_url.as_ref()
            } else {
                self.screenshot_url.as_ref()
            };
            if let Some(url) = url {
                fragment.push_image(url.clone());
            }
        }
        fragment
    }
}

impl PromptElement for Observation {
    fn is_visible(&self) -> bool {
        true
    }

    fn render(&self) -> Fragment {
        Fragment::Text(format!(
            "\n# Observation of current step:\n{}{}{}{}\n\n",
            self.html.render().text_content(),
            self.ax_tree.render().text_content(),
            self.focused.render().text_content(),
            self.error.render().text_content(),
        ))
    }
}

impl Shrinkable for Observation {
    fn shrink(&mut self) {
        self.ax_tree.shrink();
        self.html.shrink();
    }
}

// ── History ────────────────────────────────────────────────────────

/// One past step: thought, action, error, and what changed on the page.
pub struct HistoryStep {
    flags: Arc<ObsFlags>,
    thought: String,
    action: String,
    memory: Option<String>,
    error: TextSection,
    html_diff: DiffSection,
    ax_tree_diff: DiffSection,
}

impl HistoryStep {
    pub fn new(
        previous: &ObsSnapshot,
        current: &ObsSnapshot,
        action: &str,
        memory: Option<&str>,
        thought: &str,
        flags: Arc<ObsFlags>,
    ) -> Self {
        let html_watched = Arc::clone(&flags);
        let ax_watched = Arc::clone(&flags);
        Self {
            html_diff: DiffSection::new(
                previous.html(flags.html_source),
                current.html(flags.html_source),
                Visibility::when(move || html_watched.use_html && html_watched.use_diff),
            )
            .with_prefix("\n### HTML diff:\n")
            .with_shrink_step(1),
            ax_tree_diff: DiffSection::new(
                &previous.axtree_txt,
                &current.axtree_txt,
                Visibility::when(move || ax_watched.use_ax_tree && ax_watched.use_diff),
            )
            .with_prefix("\n### Accessibility tree diff:\n")
            .with_shrink_step(1),
            error: past_error_section(&current.last_action_error, &flags),
            thought: thought.to_string(),
            action: action.to_string(),
            memory: memory.map(str::to_string),
            flags,
        }
    }
}

impl PromptElement for HistoryStep {
    fn is_visible(&self) -> bool {
        true
    }

    fn render(&self) -> Fragment {
        let mut out = String::new();
        if self.flags.use_think_history {
            out.push_str(&format!("\n### Think:\n{}\n", self.thought));
        }
        if self.flags.use_action_history {
            out.push_str(&format!("\n### Action:\n{}\n", self.action));
        }
        out.push_str(&self.error.render().text_content());
        out.push_str(&self.html_diff.render().text_content());
        out.push_str(&self.ax_tree_diff.render().text_content());
        if let Some(memory) = &self.memory {
            out.push_str(&format!("\n### Memory:\n{memory}\n"));
        }
        Fragment::Text(out)
    }
}

impl Shrinkable for HistoryStep {
    fn shrink(&mut self) {
        self.html_diff.shrink();
        self.ax_tree_diff.shrink();
    }
}

/// The history of interaction with the task, one [`HistoryStep`] per past
/// action, gated on `use_history`.
pub struct History {
    visibility: Visibility,
    steps: Vec<HistoryStep>,
}

impl History {
    /// Build the history from aligned collaborator slices.
    ///
    /// `snapshots` must hold one more entry than `actions` and `thoughts`
    /// (the initial observation plus one per step); `memories`, when given,
    /// aligns with `actions`. Misaligned inputs fail fast.
    pub fn new(
        snapshots: &[ObsSnapshot],
        actions: &[String],
        memories: Option<&[String]>,
        thoughts: &[String],
        flags: Arc<ObsFlags>,
    ) -> Result<Self, ConfigError> {
        if snapshots.len() != actions.len() + 1 {
            return Err(ConfigError(format!(
                "history needs {} snapshots for {} actions, got {}",
                actions.len() + 1,
                actions.len(),
                snapshots.len(),
            )));
        }
        if thoughts.len() != actions.len() {
            return Err(ConfigError(format!(
                "history needs one thought per action: {} thoughts, {} actions",
                thoughts.len(),
                actions.len(),
            )));
        }
        if let Some(memories) = memories
            && memories.len() != actions.len()
        {
            return Err(ConfigError(format!(
                "history needs one memory per action: {} memories, {} actions",
                memories.len(),
                actions.len(),
            )));
        }

        let steps = (1..snapshots.len())
            .map(|i| {
                HistoryStep::new(
                    &snapshots[i - 1],
                    &snapshots[i],
                    &actions[i - 1],
                    memories.map(|m| m[i - 1].as_str()),
                    &thoughts[i - 1],
                    Arc::clone(&flags),
                )
            })
            .collect();

        let watched = Arc::clone(&flags);
        Ok(Self {
            visibility: Visibility::when(move || watched.use_history),
            steps,
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl PromptElement for History {
    fn is_visible(&self) -> bool {
        self.visibility.evaluate()
    }

    fn render(&self) -> Fragment {
        if !self.is_visible() {
            return Fragment::default();
        }
        let mut parts = vec!["# History of interaction with the task:\n".to_string()];
        for (i, step) in self.steps.iter().enumerate() {
            parts.push(format!("## step {i}"));
            parts.push(step.render().text_content());
        }
        Fragment::Text(parts.join("\n") + "\n")
    }
}

impl Shrinkable for History {
    fn shrink(&mut self) {
        for step in &mut self.steps {
            step.shrink();
        }
    }
}

// ── Instructions ───────────────────────────────────────────────────

/// Goal-directed instructions for autonomous task mode.
#[derive(Debug)]
pub struct GoalInstructions {
    section: TextSection,
}

impl GoalInstructions {
    pub fn new(goal: &str, extra_instructions: Option<&str>, visible: impl Into<Visibility>) -> Self {
        let mut body = format!(
            "# Instructions\n\
             Review the current state of the page and all other information to find the best\n\
             possible next action to accomplish your goal. Your answer will be interpreted\n\
             and executed by a program, make sure to follow the formatting instructions.\n\
             \n\
             ## Goal:\n\
             {goal}\n",
        );
        if let Some(extra) = extra_instructions {
            body.push_str(&format!("\n## Extra instructions:\n\n{extra}\n"));
        }
        Self {
            section: TextSection::new(body, visible),
        }
    }
}

impl PromptElement for GoalInstructions {
    fn is_visible(&self) -> bool {
        self.section.is_visible()
    }

    fn render(&self) -> Fragment {
        self.section.render()
    }
}

/// One user/assistant exchange shown in chat-assistant mode.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Instructions for interactive chat-assistant mode, with the timestamped
/// conversation so far.
#[derive(Debug)]
pub struct ChatInstructions {
    section: TextSection,
}

impl ChatInstructions {
    pub fn new(
        chat_messages: &[ChatMessage],
        extra_instructions: Option<&str>,
        visible: impl Into<Visibility>,
    ) -> Self {
        let mut body = String::from(
            "# Instructions\n\
             \n\
             You are a UI Assistant, your goal is to help the user perform tasks using a web \
             browser. You can\n\
             communicate with the user via a chat, in which the user gives you instructions and \
             in which you\n\
             can send back messages. You have access to a web browser that both you and the user \
             can see,\n\
             and with which only you can interact via specific commands.\n\
             \n\
             Review the instructions from the user, the current state of the page and all other \
             information\n\
             to find the best possible next action to accomplish your goal. Your answer will be \
             interpreted\n\
             and executed by a program, make sure to follow the formatting instructions.\n\
             \n\
             ## Chat messages:\n\n",
        );
        body.push_str(
            &chat_messages
                .iter()
                .map(|msg| {
                    format!(
                        " - [{}] UTC Time: {} - {}",
                        msg.role,
                        msg.timestamp.format("%a %b %e %H:%M:%S %Y"),
                        msg.message,
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
        );
        if let Some(extra) = extra_instructions {
            body.push_str(&format!("\n\n## Extra instructions:\n\n{extra}\n"));
        }
        Self {
            section: TextSection::new(body, visible),
        }
    }
}

impl PromptElement for ChatInstructions {
    fn is_visible(&self) -> bool {
        self.section.is_visible()
    }

    fn render(&self) -> Fragment {
        self.section.render()
    }
}

/// The fixed system preamble for autonomous web-task mode.
pub fn system_instructions() -> TextSection {
    TextSection::new(
        "You are an agent trying to solve a web task based on the content of the page and\n\
         user instructions. You can interact with the page and explore, and send messages to \
         the user. Each time you\n\
         submit an action it will be sent to the browser and you will receive a new page.",
        true,
    )
}

/// Generic usage hints for game-like and form-heavy pages.
pub fn hints(visible: impl Into<Visibility>) -> TextSection {
    TextSection::new(
        "Note:\n\
         * Some tasks may be game like and may require to interact with the mouse position\n\
         in x, y coordinates.\n\
         * Some text field might have auto completion. To see it, you have to type a few\n\
         characters and wait until next step.\n\
         * If you have to cut and paste, don't forget to select the text first.\n\
         * Coordinate inside an SVG are relative to it's top left corner.\n\
         * Make sure to use bid to identify elements when using commands.\n",
        visible,
    )
}

/// A caution note discouraging premature submissions.
pub fn be_cautious(visible: impl Into<Visibility>) -> TextSection {
    TextSection::new(
        "\nBe very cautious. Avoid submitting anything before verifying the effect of your\n\
         actions. Take the time to explore the effect of safe actions first. For example\n\
         you can fill a few elements of a form, but don't click submit before verifying\n\
         that everything was filled correctly.\n",
        visible,
    )
}

// ── Answer-requesting sections ─────────────────────────────────────

/// Requests a chain-of-thought block from the model.
///
/// Renders nothing into the prompt body; contributes an abstract and a
/// concrete `<think>` example and parses the optional `<think>` field out of
/// the reply.
#[derive(Debug)]
pub struct ThinkSection {
    visibility: Visibility,
}

impl ThinkSection {
    pub fn new(visible: impl Into<Visibility>) -> Self {
        Self {
            visibility: visible.into(),
        }
    }

    pub fn abstract_example(&self) -> String {
        if !self.is_visible() {
            return String::new();
        }
        "\n<think>\n\
         Think step by step. If you need to make calculations such as coordinates, write them \
         here. Describe the effect\n\
         that your previous action had on the current content of the page.\n\
         </think>\n"
            .to_string()
    }

    pub fn concrete_example(&self) -> String {
        if !self.is_visible() {
            return String::new();
        }
        "\n<think>\n\
         My memory says that I filled the first name and last name, but I can't see any\n\
         content in the form. I need to explore different ways to fill the form. Perhaps\n\
         the form is not visible yet or some fields are disabled. I need to replan.\n\
         </think>\n"
            .to_string()
    }

    /// Extract the optional `<think>` field, merging multiple blocks.
    pub fn parse_answer(&self, text: &str) -> Result<HashMap<String, String>, ParseError> {
        if !self.is_visible() {
            return Ok(HashMap::new());
        }
        parse_tags_strict(text, &[], &["think"], true)
    }
}

impl Default for ThinkSection {
    fn default() -> Self {
        Self::new(true)
    }
}

impl PromptElement for ThinkSection {
    fn is_visible(&self) -> bool {
        self.visibility.evaluate()
    }

    fn render(&self) -> Fragment {
        Fragment::default()
    }
}

/// The action vocabulary collaborator.
///
/// Supplies the human-readable description shown to the model and validates
/// a submitted action; executing the action is someone else's job.
pub trait ActionSpace: Send + Sync {
    /// A description of every available action, rendered into the prompt.
    fn describe(&self) -> String;

    /// An example action, abstract (placeholder arguments) or concrete.
    fn example_action(&self, abstract_example: bool) -> String;

    /// Check that `action` belongs to the vocabulary. The error text is shown
    /// to the model verbatim inside the corrective message.
    fn validate(&self, action: &str) -> Result<(), String>;
}

/// Describes the action space and parses/validates the `<action>` answer.
pub struct ActionSpaceSection {
    action_space: Box<dyn ActionSpace>,
    body: String,
}

impl ActionSpaceSection {
    pub fn new(action_space: Box<dyn ActionSpace>) -> Self {
        let body = format!("# Action space:\n{}\n", action_space.describe());
        Self { action_space, body }
    }

    pub fn abstract_example(&self) -> String {
        format!(
            "\n<action>\n{}\n</action>\n",
            self.action_space.example_action(true)
        )
    }

    pub fn concrete_example(&self) -> String {
        format!(
            "\n<action>\n{}\n</action>\n",
            self.action_space.example_action(false)
        )
    }

    /// Extract the required `<action>` field and validate it against the
    /// vocabulary. Multiple `<action>` blocks merge into one.
    pub fn parse_answer(&self, text: &str) -> Result<HashMap<String, String>, ParseError> {
        let fields = parse_tags_strict(text, &["action"], &[], true)?;
        if let Some(action) = fields.get("action")
            && let Err(e) = self.action_space.validate(action)
        {
            return Err(ParseError(format!(
                "Error while parsing action\n: {e}\n\
                 Make sure your answer is restricted to the allowed actions.",
            )));
        }
        Ok(fields)
    }
}

impl PromptElement for ActionSpaceSection {
    fn is_visible(&self) -> bool {
        true
    }

    fn render(&self) -> Fragment {
        Fragment::Text(self.body.clone())
    }
}
