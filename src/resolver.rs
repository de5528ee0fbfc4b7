//! Include-block resolution engine.
//!
//! The document scanner captures every ```` ```include ```` block span from a
//! single snapshot of the input, resolves each block in document order, then
//! applies the substitutions back-to-front. Replacement text is never
//! re-matched within the same pass; re-scanning freshly resolved text only
//! happens through the expand modifier's explicit recursive call.

use crate::ai::AiInvoker;
use crate::context::ResolveContext;
use crate::error::{Result, TexpandError};
use crate::parser::{Modifier, ParsedLine, Protocol, parse_line};
use crate::protocol::{CLI_TIMEOUT, handle_cli, handle_glob, handle_static};
use crate::security::SecurityGate;
use regex::Regex;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Matches a fenced include block, non-greedily, across newlines.
const BLOCK_PATTERN: &str = r"(?s)```include\s*\n(.*?)```";

/// Opening marker used by the expand fast path to skip texts that cannot
/// contain a block.
const BLOCK_MARKER: &str = "```include";

/// Source-file suffix stripped to auto-detect the output path.
pub const SOURCE_SUFFIX: &str = ".texp";

/// Minimum trimmed length before tldr bothers summarizing.
const TLDR_MIN_CHARS: usize = 100;

/// Minimum trimmed length before translate bothers translating.
const TRANSLATE_MIN_CHARS: usize = 10;

/// Environment fallback for the translate target language.
pub const TRANSLATE_LANG_ENV_VAR: &str = "TEXPAND_TRANSLATE_LANG";

/// The resolution engine. Borrows its two external collaborators; one
/// resolver may serve many documents, each with its own context.
pub struct Resolver<'a> {
    gate: &'a dyn SecurityGate,
    ai: &'a dyn AiInvoker,
    block_pattern: Regex,
    cli_timeout: Duration,
}

impl<'a> Resolver<'a> {
    /// # Errors
    ///
    /// Returns `TexpandError::Regex` if the block pattern fails to compile.
    pub fn new(gate: &'a dyn SecurityGate, ai: &'a dyn AiInvoker) -> Result<Self> {
        Ok(Self {
            gate,
            ai,
            block_pattern: Regex::new(BLOCK_PATTERN)?,
            cli_timeout: CLI_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_cli_timeout(mut self, timeout: Duration) -> Self {
        self.cli_timeout = timeout;
        self
    }

    /// Resolves a document from a file.
    ///
    /// # Errors
    ///
    /// - `TexpandError::InputNotFound` if the input document doesn't exist.
    /// - `TexpandError::Io` on read failure.
    pub fn process_file(&self, input_path: &Path, ctx: &mut ResolveContext) -> Result<String> {
        if !input_path.is_file() {
            return Err(TexpandError::InputNotFound {
                path: input_path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(input_path)?;
        Ok(self.resolve_document(&content, ctx))
    }

    /// Replaces every include block in `content` with its resolved text,
    /// leaving all surrounding text untouched.
    #[must_use]
    pub fn resolve_document(&self, content: &str, ctx: &mut ResolveContext) -> String {
        // Snapshot pass: capture all spans before substituting anything, so
        // a block-open marker inside an earlier replacement can't be
        // re-matched by this pass.
        let blocks: Vec<(Range<usize>, &str)> = self
            .block_pattern
            .captures_iter(content)
            .filter_map(|captures| {
                let full = captures.get(0)?;
                let body = captures.get(1)?;
                Some((full.range(), body.as_str()))
            })
            .collect();

        if blocks.is_empty() {
            return content.to_string();
        }

        // Blocks resolve in document order; depth bookkeeping is
        // order-sensitive.
        let mut replacements = Vec::with_capacity(blocks.len());
        for (range, body) in blocks {
            replacements.push((range, self.resolve_block(body.trim(), ctx)));
        }

        let mut result = content.to_string();
        for (range, replacement) in replacements.into_iter().rev() {
            result.replace_range(range, &replacement);
        }
        result
    }

    /// Resolves each non-blank line of a block body independently and joins
    /// the results with newlines.
    #[must_use]
    pub fn resolve_block(&self, block: &str, ctx: &mut ResolveContext) -> String {
        block
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| self.resolve_line(line, ctx))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parses one directive line, consults the security gate, dispatches to
    /// the protocol handler and applies the modifier chain.
    #[must_use]
    pub fn resolve_line(&self, line: &str, ctx: &mut ResolveContext) -> String {
        let ParsedLine {
            modifiers,
            protocol,
            argument,
        } = parse_line(line);

        let decision = self.gate.check(protocol, &argument);
        if !decision.allowed {
            let noun = match protocol {
                Protocol::Cli => "Command",
                Protocol::Static | Protocol::Glob => "Path",
            };
            return format!(
                "<!-- ERROR: {noun} blocked by security policy: {} -->",
                decision.reason
            );
        }

        let mut resolved = match protocol {
            Protocol::Static => handle_static(&argument, &ctx.base_dir),
            Protocol::Cli => handle_cli(&argument, self.cli_timeout),
            Protocol::Glob => handle_glob(&argument, &ctx.base_dir),
        };

        for modifier in &modifiers {
            resolved = self.apply_modifier(modifier, resolved, ctx);
        }
        resolved
    }

    fn apply_modifier(
        &self,
        modifier: &Modifier,
        text: String,
        ctx: &mut ResolveContext,
    ) -> String {
        match modifier {
            Modifier::Expand => self.apply_expand(text, ctx),
            Modifier::Tldr => self.apply_tldr(&text, ctx),
            Modifier::Translate { lang } => self.apply_translate(&text, lang.as_deref(), ctx),
        }
    }

    fn apply_expand(&self, text: String, ctx: &mut ResolveContext) -> String {
        if !text.contains(BLOCK_MARKER) {
            return text;
        }
        if ctx.at_max_depth() {
            return format!(
                "<!-- ERROR: Maximum include depth exceeded ({}) -->\n{text}",
                ctx.max_depth
            );
        }
        ctx.enter();
        let expanded = self.resolve_document(&text, ctx);
        ctx.leave();
        expanded
    }

    fn apply_tldr(&self, text: &str, ctx: &mut ResolveContext) -> String {
        if text.trim().chars().count() < TLDR_MIN_CHARS {
            return text.to_string();
        }
        match self.ai.summarize(text, &ctx.tldr) {
            Ok(output) => format!("<!-- TL;DR ({}) -->\n{}", output.model, output.text),
            Err(e) => format!("<!-- ERROR: tldr failed: {e} -->\n{text}"),
        }
    }

    fn apply_translate(
        &self,
        text: &str,
        lang: Option<&str>,
        ctx: &mut ResolveContext,
    ) -> String {
        if text.trim().chars().count() < TRANSLATE_MIN_CHARS {
            return text.to_string();
        }

        // Priority: [lang] parameter, context override, environment default.
        let lang = lang
            .map(str::to_string)
            .or_else(|| ctx.translate_lang.clone())
            .or_else(|| {
                std::env::var(TRANSLATE_LANG_ENV_VAR)
                    .ok()
                    .filter(|v| !v.is_empty())
            });
        let Some(lang) = lang else {
            return format!(
                "<!-- ERROR: translate failed: no target language \
                 (use translate[lang] or set {TRANSLATE_LANG_ENV_VAR}) -->\n{text}"
            );
        };

        match self.ai.translate(text, &lang, &ctx.translate) {
            Ok(output) => output.text,
            Err(e) => format!("<!-- ERROR: translate failed: {e} -->\n{text}"),
        }
    }
}

/// One directive line found in a document, with the byte span of its
/// enclosing block. Used by the CLI's list and dry-run modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundDirective {
    pub line: String,
    pub parsed: ParsedLine,
    pub block_start: usize,
    pub block_end: usize,
}

/// Enumerates every directive line in `content` without resolving anything.
///
/// # Errors
///
/// Returns `TexpandError::Regex` if the block pattern fails to compile.
pub fn find_directives(content: &str) -> Result<Vec<FoundDirective>> {
    let pattern = Regex::new(BLOCK_PATTERN)?;
    let mut directives = Vec::new();

    for captures in pattern.captures_iter(content) {
        let (Some(full), Some(body)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        for line in body.as_str().lines().map(str::trim) {
            if line.is_empty() {
                continue;
            }
            directives.push(FoundDirective {
                line: line.to_string(),
                parsed: parse_line(line),
                block_start: full.start(),
                block_end: full.end(),
            });
        }
    }

    Ok(directives)
}

/// Output path auto-detected from a `.texp` input, if any.
#[must_use]
pub fn auto_output_path(input: &Path) -> Option<PathBuf> {
    input
        .to_str()
        .and_then(|s| s.strip_suffix(SOURCE_SUFFIX))
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}
