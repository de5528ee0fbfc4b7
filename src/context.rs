use std::path::PathBuf;

/// Default ceiling for recursive expansion.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Per-modifier AI overrides supplied by the host for one resolution.
#[derive(Debug, Clone, Default)]
pub struct AiSelection {
    /// Provider name ("openai", "anthropic"); auto-detected from the
    /// environment when absent
    pub provider: Option<String>,
    /// Model override; falls back to `TEXPAND_AI_MODEL`, then the provider
    /// default
    pub model: Option<String>,
    /// API key override; falls back to the provider's environment variable
    pub api_key: Option<String>,
}

/// Mutable state threaded through one top-level resolution and all of its
/// recursive descendants.
///
/// Not shareable across concurrent top-level resolutions; a host wanting
/// parallelism creates one context per document.
#[derive(Debug, Clone)]
pub struct ResolveContext {
    /// Base directory for resolving relative paths and glob patterns
    pub base_dir: PathBuf,
    /// Maximum recursion depth for the expand modifier
    pub max_depth: usize,
    /// AI overrides consumed by the tldr modifier
    pub tldr: AiSelection,
    /// AI overrides consumed by the translate modifier
    pub translate: AiSelection,
    /// Target-language override for translate; the `[lang]` parameter on the
    /// directive line wins over this, and `TEXPAND_TRANSLATE_LANG` is the
    /// fallback below it
    pub translate_lang: Option<String>,
    depth: usize,
}

impl Default for ResolveContext {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

impl ResolveContext {
    #[must_use]
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            max_depth: DEFAULT_MAX_DEPTH,
            tldr: AiSelection::default(),
            translate: AiSelection::default(),
            translate_lang: None,
            depth: 0,
        }
    }

    /// Current recursion depth; 0 at the top level.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// True when a further expand descent would cross the ceiling.
    #[must_use]
    pub const fn at_max_depth(&self) -> bool {
        self.depth >= self.max_depth
    }

    /// Enters one level of recursive expansion. Every `enter` must be paired
    /// with a `leave` once the descent returns, so sibling lines at the same
    /// nesting level observe the correct depth.
    pub const fn enter(&mut self) {
        self.depth += 1;
    }

    pub const fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}
