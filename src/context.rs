use serde::Deserialize;
use serde_json::Value;

/// Standard expression language tag.
pub const STANDARD_LANGUAGE: &str = "jsonata";

/// Engine options. Every field has a default so partial config files work.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    /// Language tag treated as the one standardized language.
    pub language: String,
    /// Evaluation recursion limit.
    pub max_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            language: STANDARD_LANGUAGE.to_string(),
            max_depth: 256,
        }
    }
}

impl Options {
    /// True when `tag` is unset/blank or names the standard language.
    pub fn accepts_language(&self, tag: Option<&str>) -> bool {
        match tag.map(str::trim) {
            None | Some("") => true,
            Some(t) => t.eq_ignore_ascii_case(self.language.trim()),
        }
    }
}

/// Per-evaluation state: the root input document and the current depth.
pub(crate) struct Context<'a> {
    pub(crate) root: &'a Value,
    pub(crate) depth: usize,
    pub(crate) max_depth: usize,
}

impl<'a> Context<'a> {
    pub(crate) fn new(root: &'a Value, opts: &Options) -> Self {
        Self { root, depth: 0, max_depth: opts.max_depth }
    }
}
