use serde::Serialize;

/// Resolution strategy for one directive line.
///
/// The protocol set is closed, so dispatch is enum-keyed rather than going
/// through any string-to-handler lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Read a file relative to the base directory
    Static,
    /// Execute a shell command and capture stdout
    Cli,
    /// Concatenate all files matching a glob pattern
    Glob,
}

impl Protocol {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "static" => Some(Self::Static),
            "cli" => Some(Self::Cli),
            "glob" => Some(Self::Glob),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Cli => "cli",
            Self::Glob => "glob",
        }
    }
}

/// Post-processing transform applied to a protocol's resolved output.
///
/// Modifiers apply left-to-right as written in the directive line's
/// colon-delimited prefix chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modifier {
    /// Re-scan the resolved text for nested directive blocks
    Expand,
    /// AI-generated bullet summary
    Tldr,
    /// AI translation into a target language
    Translate { lang: Option<String> },
}

impl Modifier {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Expand => "expand",
            Self::Tldr => "tldr",
            Self::Translate { .. } => "translate",
        }
    }
}

/// One parsed directive line: modifier chain, protocol, argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub modifiers: Vec<Modifier>,
    pub protocol: Protocol,
    pub argument: String,
}

/// Parses one trimmed, non-empty directive line.
///
/// Grammar: `(':' name ('[' param ']')? ':')* protocol ':' argument`, or a
/// bare argument. A bare or unrecognized-protocol line resolves through the
/// static protocol, the backward-compatible default. A line whose first
/// `:`-segment matches neither a modifier nor a protocol is kept verbatim as
/// a literal static path (so `C:\path` and friends still work).
#[must_use]
pub fn parse_line(line: &str) -> ParsedLine {
    let mut modifiers = Vec::new();
    let mut rest = line;

    while let Some(after) = rest.strip_prefix(':') {
        // A lone leading colon with no closing colon is malformed; fall out
        // and treat the remainder verbatim as a static path.
        let Some(idx) = after.find(':') else { break };
        let segment = after[..idx].trim();
        let remainder = &after[idx + 1..];

        if let Some(modifier) = parse_modifier(segment) {
            modifiers.push(modifier);
            rest = remainder;
            continue;
        }

        if let Some(protocol) = Protocol::from_name(segment) {
            return ParsedLine {
                modifiers,
                protocol,
                argument: remainder.trim().to_string(),
            };
        }

        break;
    }

    if let Some((prefix, remainder)) = rest.split_once(':')
        && let Some(protocol) = Protocol::from_name(prefix.trim())
    {
        return ParsedLine {
            modifiers,
            protocol,
            argument: remainder.trim().to_string(),
        };
    }

    ParsedLine {
        modifiers,
        protocol: Protocol::Static,
        argument: rest.trim().to_string(),
    }
}

fn parse_modifier(segment: &str) -> Option<Modifier> {
    let (name, param) = match segment.find('[') {
        Some(open) if segment.ends_with(']') => (
            &segment[..open],
            Some(segment[open + 1..segment.len() - 1].to_string()),
        ),
        _ => (segment, None),
    };

    match (name, param) {
        ("expand", None) => Some(Modifier::Expand),
        ("tldr", None) => Some(Modifier::Tldr),
        ("translate", lang) => Some(Modifier::Translate {
            lang: lang.filter(|l| !l.is_empty()),
        }),
        _ => None,
    }
}
