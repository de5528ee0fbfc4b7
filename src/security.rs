use crate::parser::Protocol;
use globset::Glob;
use serde::Deserialize;

/// Shell metacharacters that are never allowed through the cli protocol,
/// regardless of configured rules.
const DANGEROUS: [char; 9] = [';', '|', '&', '$', '`', '\n', '\r', '>', '<'];

/// Outcome of a security-policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub reason: String,
}

impl Decision {
    fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Allow/deny decision point consulted before a protocol handler acts.
///
/// The cli handler never executes a command the gate has not allowed; in
/// stricter deployments static and glob path resolution is gated too.
pub trait SecurityGate {
    fn check(&self, protocol: Protocol, action: &str) -> Decision;
}

/// What a matching rule does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Deny,
}

/// One security rule. Patterns are matched exactly first, then as a
/// wildcard pattern when they contain `*`, `?` or `[`.
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    pub pattern: String,
    pub action: RuleAction,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// First-match-wins rule policy, deny by default.
///
/// Deserializes from the JSON policy file shape:
///
/// ```json
/// {
///   "cli": { "rules": [ { "pattern": "date", "action": "allow" } ] },
///   "gate_paths": false
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RulePolicy {
    #[serde(default)]
    pub cli: RuleSet,
    #[serde(default, rename = "static")]
    pub static_files: RuleSet,
    #[serde(default)]
    pub glob: RuleSet,
    /// When false (the default), static and glob resolve unconditioned and
    /// only cli commands are gated.
    #[serde(default)]
    pub gate_paths: bool,
}

impl RulePolicy {
    fn rules_for(&self, protocol: Protocol) -> &[Rule] {
        match protocol {
            Protocol::Cli => &self.cli.rules,
            Protocol::Static => &self.static_files.rules,
            Protocol::Glob => &self.glob.rules,
        }
    }
}

impl SecurityGate for RulePolicy {
    fn check(&self, protocol: Protocol, action: &str) -> Decision {
        if protocol == Protocol::Cli && action.contains(&DANGEROUS[..]) {
            return Decision::deny("Contains dangerous shell metacharacters");
        }

        if protocol != Protocol::Cli && !self.gate_paths {
            return Decision::allow("Path gating disabled");
        }

        match_rules(self.rules_for(protocol), action)
    }
}

fn match_rules(rules: &[Rule], action: &str) -> Decision {
    if rules.is_empty() {
        return Decision::deny("No rules configured (secure by default)");
    }

    for (i, rule) in rules.iter().enumerate() {
        let exact = action == rule.pattern;
        let wildcard = !exact
            && rule.pattern.contains(['*', '?', '['])
            && Glob::new(&rule.pattern)
                .map(|g| g.compile_matcher().is_match(action))
                .unwrap_or(false);

        if !exact && !wildcard {
            continue;
        }

        let mut reason = format!("Rule #{i}");
        if let Some(name) = &rule.name {
            reason.push_str(&format!(" ({name})"));
        }
        let kind = if exact { "exact match" } else { "pattern" };
        let verdict = match rule.action {
            RuleAction::Allow => "allow",
            RuleAction::Deny => "deny",
        };
        reason.push_str(&format!(": {kind} '{}' -> {verdict}", rule.pattern));

        return match rule.action {
            RuleAction::Allow => Decision::allow(reason),
            RuleAction::Deny => Decision::deny(reason),
        };
    }

    Decision::deny("No matching rule (secure by default)")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow_rule(pattern: &str) -> Rule {
        Rule {
            pattern: pattern.to_string(),
            action: RuleAction::Allow,
            name: None,
        }
    }

    fn deny_rule(pattern: &str) -> Rule {
        Rule {
            pattern: pattern.to_string(),
            action: RuleAction::Deny,
            name: None,
        }
    }

    #[test]
    fn test_cli_deny_by_default() {
        let policy = RulePolicy::default();
        let decision = policy.check(Protocol::Cli, "date");
        assert!(!decision.allowed);
        assert!(decision.reason.contains("secure by default"));
    }

    #[test]
    fn test_cli_exact_allow() {
        let mut policy = RulePolicy::default();
        policy.cli.rules.push(allow_rule("date"));
        assert!(policy.check(Protocol::Cli, "date").allowed);
        assert!(!policy.check(Protocol::Cli, "uptime").allowed);
    }

    #[test]
    fn test_cli_wildcard_allow() {
        let mut policy = RulePolicy::default();
        policy.cli.rules.push(allow_rule("git *"));
        assert!(policy.check(Protocol::Cli, "git log --oneline").allowed);
        assert!(!policy.check(Protocol::Cli, "hg log").allowed);
    }

    #[test]
    fn test_first_match_wins() {
        let mut policy = RulePolicy::default();
        policy.cli.rules.push(deny_rule("git push*"));
        policy.cli.rules.push(allow_rule("git *"));
        assert!(!policy.check(Protocol::Cli, "git push origin main").allowed);
        assert!(policy.check(Protocol::Cli, "git log").allowed);
    }

    #[test]
    fn test_dangerous_metacharacters_always_denied() {
        let mut policy = RulePolicy::default();
        policy.cli.rules.push(allow_rule("*"));
        for cmd in [
            "date; rm -rf /",
            "cat file | grep x",
            "echo $HOME",
            "ls > out.txt",
            "ls & sleep 1",
        ] {
            let decision = policy.check(Protocol::Cli, cmd);
            assert!(!decision.allowed, "{cmd} should be denied");
            assert!(decision.reason.contains("metacharacters"));
        }
    }

    #[test]
    fn test_paths_ungated_by_default() {
        let policy = RulePolicy::default();
        assert!(policy.check(Protocol::Static, "anything.md").allowed);
        assert!(policy.check(Protocol::Glob, "**/*.md").allowed);
    }

    #[test]
    fn test_gated_paths_deny_by_default() {
        let policy = RulePolicy {
            gate_paths: true,
            ..RulePolicy::default()
        };
        assert!(!policy.check(Protocol::Static, "secret.md").allowed);
    }

    #[test]
    fn test_gated_paths_with_rules() {
        let mut policy = RulePolicy {
            gate_paths: true,
            ..RulePolicy::default()
        };
        policy.static_files.rules.push(allow_rule("docs/*"));
        assert!(policy.check(Protocol::Static, "docs/a.md").allowed);
        assert!(!policy.check(Protocol::Static, "etc/passwd").allowed);
    }

    #[test]
    fn test_rule_name_in_reason() {
        let mut policy = RulePolicy::default();
        policy.cli.rules.push(Rule {
            pattern: "date".to_string(),
            action: RuleAction::Allow,
            name: Some("clock".to_string()),
        });
        let decision = policy.check(Protocol::Cli, "date");
        assert!(decision.allowed);
        assert!(decision.reason.contains("(clock)"));
    }

    #[test]
    fn test_policy_deserialization() {
        let json = r#"{
            "cli": { "rules": [
                { "pattern": "date", "action": "allow", "name": "clock" },
                { "pattern": "*", "action": "deny" }
            ]},
            "gate_paths": true
        }"#;
        let policy: RulePolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.cli.rules.len(), 2);
        assert!(policy.gate_paths);
        assert!(policy.check(Protocol::Cli, "date").allowed);
        assert!(!policy.check(Protocol::Cli, "uptime").allowed);
    }
}
