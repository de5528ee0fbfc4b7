//! # texpand
//!
//! A directive-expansion library and CLI tool for text documents. texpand
//! scans a document for fenced ```` ```include ```` blocks and replaces each
//! with resolved content: static files, shell-command output, or
//! glob-concatenated file sets, optionally post-processed by modifiers
//! (recursive expansion, AI summarization, AI translation).
//!
//! ## Directive syntax
//!
//! Each non-blank line inside a block follows
//! `(':' modifier ('[' param ']')? ':')* protocol ':' argument`:
//!
//! ````text
//! ```include
//! static: header.md
//! cli: git describe --tags
//! glob: sections/**/*.md
//! :expand:static: nested.md.texp
//! :tldr:static: long-report.md
//! :translate[it]:static: readme.md
//! footer.md
//! ```
//! ````
//!
//! Bare lines (no protocol) resolve through the static protocol. Failures
//! inside a directive degrade to inline `<!-- ERROR ... -->` markers; the
//! rest of the document still resolves.
//!
//! ## Usage
//!
//! ### As a Library
//!
//! ```no_run
//! use texpand::{MockAi, ResolveContext, Resolver, RulePolicy};
//!
//! let policy = RulePolicy::default(); // cli denied unless rules allow it
//! let resolver = Resolver::new(&policy, &MockAi)?;
//! let mut ctx = ResolveContext::default();
//!
//! let document = "Intro\n```include\nstatic: body.md\n```\nOutro";
//! let resolved = resolver.resolve_document(document, &mut ctx);
//! println!("{resolved}");
//! # Ok::<(), texpand::TexpandError>(())
//! ```
//!
//! ### As a CLI Tool
//!
//! ```bash
//! # Resolve a source document (doc.md.texp writes doc.md)
//! texpand doc.md.texp
//!
//! # Resolve from stdin to stdout
//! cat doc.md | texpand -
//!
//! # Allow specific commands through the security gate
//! texpand doc.md.texp --policy .texpand-policy.json
//! ```

pub mod ai;
pub mod context;
pub mod error;
pub mod parser;
pub mod protocol;
pub mod resolver;
pub mod security;

// Re-export main types and functions for convenience
pub use ai::{AiError, AiInvoker, AiOutput, LiveAi, MockAi};
pub use context::{AiSelection, DEFAULT_MAX_DEPTH, ResolveContext};
pub use error::{Result, TexpandError};
pub use parser::{Modifier, ParsedLine, Protocol, parse_line};
pub use resolver::{FoundDirective, Resolver, auto_output_path, find_directives};
pub use security::{Decision, Rule, RuleAction, RulePolicy, SecurityGate};
