//! Content propagation rules between connected artifacts.
//!
//! The rule is chosen by the `(source kind, target kind)` pair, first match wins:
//!
//! | source         | target           | strategy                                   |
//! |----------------|------------------|--------------------------------------------|
//! | Roadmap        | Readme           | refresh the delimited roadmap section      |
//! | Config         | Implementation   | substitute `{{config.<key>}}` placeholders |
//! | same kind      | same kind        | [`SameKindPolicy`]                         |
//! | anything else  |                  | no-op                                      |

use mycelium_core::{ArtifactKind, SameKindPolicy};
use regex::{Captures, Regex};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub const ROADMAP_START: &str = "<!-- mycelium:roadmap:start -->";
pub const ROADMAP_END: &str = "<!-- mycelium:roadmap:end -->";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    RoadmapIntoReadme,
    ConfigIntoImplementation,
    SameKind(SameKindPolicy),
    NoOp,
}

impl MergeStrategy {
    /// Whether applying this strategy can ever change the target.
    pub fn may_change_target(self) -> bool {
        !matches!(
            self,
            MergeStrategy::NoOp | MergeStrategy::SameKind(SameKindPolicy::Passthrough)
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeResolver {
    same_kind: SameKindPolicy,
}

impl MergeResolver {
    pub fn new(same_kind: SameKindPolicy) -> Self {
        Self { same_kind }
    }

    pub fn strategy_for(&self, source: ArtifactKind, target: ArtifactKind) -> MergeStrategy {
        match (source, target) {
            (ArtifactKind::Roadmap, ArtifactKind::Readme) => MergeStrategy::RoadmapIntoReadme,
            (ArtifactKind::Config, ArtifactKind::Implementation) => {
                MergeStrategy::ConfigIntoImplementation
            }
            (s, t) if s == t => MergeStrategy::SameKind(self.same_kind),
            _ => MergeStrategy::NoOp,
        }
    }

    /// New content for the target given the source content.
    pub fn resolve(
        &self,
        source_kind: ArtifactKind,
        source: &str,
        target_kind: ArtifactKind,
        target: &str,
    ) -> String {
        match self.strategy_for(source_kind, target_kind) {
            MergeStrategy::RoadmapIntoReadme => update_readme_with_roadmap(target, source),
            MergeStrategy::ConfigIntoImplementation => {
                update_implementation_with_config(target, source)
            }
            MergeStrategy::SameKind(SameKindPolicy::LastWriterWins) => source.to_string(),
            MergeStrategy::SameKind(SameKindPolicy::Passthrough) | MergeStrategy::NoOp => {
                target.to_string()
            }
        }
    }
}

fn is_task_line(line: &str) -> bool {
    let t = line.trim_start();
    ["- [ ]", "- [x]", "- [X]", "* [ ]", "* [x]", "* [X]"]
        .iter()
        .any(|p| t.starts_with(p))
}

fn is_done_task(line: &str) -> bool {
    let t = line.trim_start();
    ["- [x]", "- [X]", "* [x]", "* [X]"]
        .iter()
        .any(|p| t.starts_with(p))
}

/// Readme section derived from a roadmap: checklist items with a progress line,
/// or the roadmap body minus its title when it has no checklist.
pub fn roadmap_section(roadmap: &str) -> String {
    let tasks: Vec<&str> = roadmap.lines().filter(|l| is_task_line(l)).collect();

    let mut section = String::from("## Roadmap\n\n");
    if tasks.is_empty() {
        let body: Vec<&str> = roadmap
            .lines()
            .skip_while(|l| l.trim().is_empty())
            .enumerate()
            .filter(|(i, l)| !(*i == 0 && l.starts_with("# ")))
            .map(|(_, l)| l)
            .collect();
        section.push_str(body.join("\n").trim());
        section.push('\n');
    } else {
        let done = tasks.iter().filter(|l| is_done_task(l)).count();
        let pct = done * 100 / tasks.len();
        section.push_str(&format!(
            "Progress: {}/{} tasks complete ({}%)\n\n",
            done,
            tasks.len(),
            pct
        ));
        for task in tasks {
            section.push_str(task.trim_end());
            section.push('\n');
        }
    }
    section
}

/// Replace (or append) the delimited roadmap section of a readme. Text outside
/// the markers is kept byte for byte.
///
/// The managed section is the last start marker that has an end marker after
/// it. Unpaired markers stay in place as ordinary text.
pub fn update_readme_with_roadmap(readme: &str, roadmap: &str) -> String {
    let block = format!("{}\n{}{}", ROADMAP_START, roadmap_section(roadmap), ROADMAP_END);

    if let Some(start) = readme.rfind(ROADMAP_START) {
        if let Some(end_rel) = readme[start..].find(ROADMAP_END) {
            let end = start + end_rel + ROADMAP_END.len();
            let mut out = String::with_capacity(readme.len() + block.len());
            out.push_str(&readme[..start]);
            out.push_str(&block);
            out.push_str(&readme[end..]);
            return out;
        }
    }

    let mut out = String::with_capacity(readme.len() + block.len() + 2);
    out.push_str(readme);
    if !readme.is_empty() {
        if !readme.ends_with('\n') {
            out.push('\n');
        }
        out.push('\n');
    }
    out.push_str(&block);
    out.push('\n');
    out
}

fn flatten_json(prefix: &str, value: &JsonValue, out: &mut BTreeMap<String, String>) {
    match value {
        JsonValue::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{}.{}", prefix, k)
                };
                flatten_json(&key, v, out);
            }
        }
        JsonValue::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        JsonValue::Null => {
            out.insert(prefix.to_string(), String::new());
        }
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

fn parse_key_value_lines(config: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for line in config.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        if let Some((k, v)) = line.split_once('=').or_else(|| line.split_once(':')) {
            let key = k.trim();
            if key.is_empty() {
                continue;
            }
            let value = v.trim().trim_matches('"').trim_matches('\'');
            out.insert(key.to_string(), value.to_string());
        }
    }
    out
}

/// Flattened `key -> value` view of a config file. JSON objects and TOML tables
/// are flattened with `.`; anything else is read as `key = value` / `key: value` lines.
pub fn parse_config_values(config: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if let Ok(json @ JsonValue::Object(_)) = serde_json::from_str::<JsonValue>(config) {
        flatten_json("", &json, &mut out);
        return out;
    }
    if let Ok(table) = toml::from_str::<toml::Table>(config) {
        if let Ok(json) = serde_json::to_value(&table) {
            flatten_json("", &json, &mut out);
            return out;
        }
    }
    parse_key_value_lines(config)
}

fn placeholder_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\{\{\s*config\.([A-Za-z0-9_.\-]+)\s*\}\}").ok())
        .as_ref()
}

/// Substitute `{{config.<key>}}` placeholders with values from the config.
/// Placeholders for keys the config does not define are left as they are.
pub fn update_implementation_with_config(implementation: &str, config: &str) -> String {
    let Some(pattern) = placeholder_pattern() else {
        return implementation.to_string();
    };
    let values = parse_config_values(config);
    pattern
        .replace_all(implementation, |caps: &Captures<'_>| {
            values
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROADMAP: &str = "# Plan\n\n- [x] ship graph store\n- [ ] adaptive scheduler\n  - [X] health bands\n";

    #[test]
    fn rule_order() {
        let r = MergeResolver::default();
        use ArtifactKind::*;
        assert_eq!(r.strategy_for(Roadmap, Readme), MergeStrategy::RoadmapIntoReadme);
        assert_eq!(r.strategy_for(Readme, Roadmap), MergeStrategy::NoOp);
        assert_eq!(
            r.strategy_for(Config, Implementation),
            MergeStrategy::ConfigIntoImplementation
        );
        assert_eq!(
            r.strategy_for(Readme, Readme),
            MergeStrategy::SameKind(SameKindPolicy::LastWriterWins)
        );
        assert_eq!(r.strategy_for(Other, Documentation), MergeStrategy::NoOp);
    }

    #[test]
    fn roadmap_section_is_appended_and_rest_preserved() {
        let readme = "# Project\n\nSome intro.\n";
        let out = update_readme_with_roadmap(readme, ROADMAP);
        assert!(out.starts_with(readme));
        assert!(out.contains("Progress: 2/3 tasks complete (66%)"));
        assert!(out.contains("- [ ] adaptive scheduler\n"));
        assert!(out.trim_end().ends_with(ROADMAP_END));
    }

    #[test]
    fn roadmap_section_is_replaced_in_place() {
        let readme = format!(
            "# Project\n\n{}\n## Roadmap\n\nstale\n{}\n\n## License\nMIT\n",
            ROADMAP_START, ROADMAP_END
        );
        let out = update_readme_with_roadmap(&readme, ROADMAP);
        assert!(out.starts_with("# Project\n\n"));
        assert!(out.ends_with("\n\n## License\nMIT\n"));
        assert!(!out.contains("stale"));
        assert_eq!(out.matches(ROADMAP_START).count(), 1);

        // applying again is stable
        assert_eq!(update_readme_with_roadmap(&out, ROADMAP), out);
    }

    #[test]
    fn unpaired_markers_keep_user_text() {
        let readme = format!("# P\n\nintro\n{}\nuser text kept\n", ROADMAP_START);
        let once = update_readme_with_roadmap(&readme, ROADMAP);
        assert!(once.starts_with(&readme));
        assert_eq!(once.matches(ROADMAP_END).count(), 1);

        let twice = update_readme_with_roadmap(&once, ROADMAP);
        assert!(twice.contains("user text kept"));
        assert_eq!(twice, once);

        let stray_end = format!("# P\n\n{}\nnotes\n", ROADMAP_END);
        let once = update_readme_with_roadmap(&stray_end, ROADMAP);
        assert!(once.starts_with(&stray_end));
        assert_eq!(update_readme_with_roadmap(&once, ROADMAP), once);
    }

    #[test]
    fn roadmap_without_checklist_uses_body() {
        let section = roadmap_section("\n# Vision\nGrow the network.\n\n## Q3\nSharding.\n");
        assert_eq!(section, "## Roadmap\n\nGrow the network.\n\n## Q3\nSharding.\n");
    }

    #[test]
    fn config_values_fill_known_placeholders() {
        let implementation = "const PORT: u16 = {{config.server.port}};\nconst HOST: &str = \"{{ config.server.host }}\";\nconst KEY: &str = \"{{config.missing}}\";\n// untouched\n";
        let toml_cfg = "[server]\nport = 8080\nhost = \"localhost\"\n";
        let out = update_implementation_with_config(implementation, toml_cfg);
        assert_eq!(
            out,
            "const PORT: u16 = 8080;\nconst HOST: &str = \"localhost\";\nconst KEY: &str = \"{{config.missing}}\";\n// untouched\n"
        );
    }

    #[test]
    fn config_formats() {
        let json = parse_config_values(r#"{"db": {"pool": 4, "name": "main"}, "debug": true}"#);
        assert_eq!(json["db.pool"], "4");
        assert_eq!(json["db.name"], "main");
        assert_eq!(json["debug"], "true");

        let lines = parse_config_values("# comment\nmode: fast\nretries = three\n");
        assert_eq!(lines["mode"], "fast");
        assert_eq!(lines["retries"], "three");
    }

    #[test]
    fn same_kind_policies() {
        let lww = MergeResolver::new(SameKindPolicy::LastWriterWins);
        let pass = MergeResolver::new(SameKindPolicy::Passthrough);
        let k = ArtifactKind::Documentation;
        assert_eq!(lww.resolve(k, "new", k, "old"), "new");
        assert_eq!(pass.resolve(k, "new", k, "old"), "old");
        assert!(!pass.strategy_for(k, k).may_change_target());
        assert_eq!(
            lww.resolve(ArtifactKind::Readme, "x", ArtifactKind::Config, "keep"),
            "keep"
        );
    }
}
