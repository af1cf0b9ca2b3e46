//! Post-run consistency checks on the generated dnsmasq files.
//!
//! Each check reports problems through the [`DiagnosticSink`] at error
//! severity and returns `false` when anything is wrong.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::aggregator::{exclusion_dict, Dict};
use crate::compiler::parse_directive;
use crate::config::Settings;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::fs_abstraction::FileSystem;
use crate::tree::{BlacklistTree, DOMAINS, HOSTS};
use crate::validation::normalize_domain;

/// Placeholder replaced by the node name in file patterns.
pub const NODE_PLACEHOLDER: &str = "{node}";

/// Format a list the way the check messages show it: `[a b c]`.
fn show(list: &[String]) -> String {
    format!("[{}]", list.join(" "))
}

pub struct Verifier<'a, F: FileSystem + ?Sized> {
    tree: &'a BlacklistTree,
    settings: &'a Settings,
    fs: &'a F,
    sink: &'a dyn DiagnosticSink,
}

impl<'a, F: FileSystem + ?Sized> Verifier<'a, F> {
    pub fn new(
        tree: &'a BlacklistTree,
        settings: &'a Settings,
        fs: &'a F,
        sink: &'a dyn DiagnosticSink,
    ) -> Self {
        Self {
            tree,
            settings,
            fs,
            sink,
        }
    }

    fn fail(&self, check: &str, message: String) -> bool {
        self.sink.emit(Diagnostic::error(Some(check), message));
        false
    }

    /// Pre-configured file path pattern for the configured directory.
    pub fn pre_configured_pattern(&self) -> String {
        format!(
            "{}/{}.pre-configured.{}",
            self.settings.dir.display(),
            NODE_PLACEHOLDER,
            self.settings.extension
        )
    }

    /// Generated files belonging to `node`, sorted.
    fn node_files(&self, node: &str) -> Vec<PathBuf> {
        let prefix = format!("{}.", node);
        self.fs
            .glob(&self.settings.stale_glob())
            .unwrap_or_default()
            .into_iter()
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix))
            })
            .collect()
    }

    /// Directives of one file as (domain, ip) pairs; a missing file has none.
    fn directives(&self, path: &Path) -> Vec<(String, String)> {
        self.fs
            .read_to_string(path)
            .map(|text| {
                text.lines()
                    .filter_map(parse_directive)
                    .map(|(d, ip)| (d.to_string(), ip.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn node_domains(&self, node: &str) -> Dict {
        let mut dict = Dict::new();
        for path in self.node_files(node) {
            for (domain, _) in self.directives(&path) {
                dict.insert(&domain);
            }
        }
        dict
    }

    /// Every include of both areas is present in its pre-configured file.
    ///
    /// `pattern` names the file to inspect, with `{node}` standing for the
    /// area name. Both `domains` and `hosts` areas are required.
    pub fn blacklistings(&self, pattern: &str) -> bool {
        let excludes = exclusion_dict(self.tree);
        let covering = self.node_domains(DOMAINS);
        let mut ok = true;

        for node in [DOMAINS, HOSTS] {
            let Some(area) = self.tree.area(node) else {
                ok = self.fail(
                    "blacklistings",
                    format!("Area {} missing from configuration", node),
                );
                continue;
            };
            if area.disabled {
                continue;
            }

            let want: BTreeSet<String> = area
                .include
                .iter()
                .filter_map(|d| normalize_domain(d))
                .filter(|d| !excludes.contains(d))
                .filter(|d| node == DOMAINS || !covering.covers(d))
                .collect();

            let path = PathBuf::from(pattern.replace(NODE_PLACEHOLDER, node));
            let got: BTreeSet<String> = self
                .directives(&path)
                .into_iter()
                .map(|(d, _)| d)
                .collect();

            if got != want {
                let got: Vec<String> = got.into_iter().collect();
                let want: Vec<String> = want.into_iter().collect();
                ok = self.fail(
                    "blacklistings",
                    format!(
                        "Includes not correct in {}\n\tGot: {}\n\tWant: {}",
                        path.display(),
                        show(&got),
                        show(&want)
                    ),
                );
            }
        }
        ok
    }

    /// No excluded domain appears in any generated file.
    pub fn exclusions(&self) -> bool {
        if !self.fs.exists(&self.settings.dir) {
            return self.fail(
                "exclusions",
                format!("Directory {} not found", self.settings.dir.display()),
            );
        }

        let excludes = exclusion_dict(self.tree);
        let mut ok = true;
        for node in [DOMAINS, HOSTS] {
            for path in self.node_files(node) {
                let found: Vec<String> = self
                    .directives(&path)
                    .into_iter()
                    .map(|(d, _)| d)
                    .filter(|d| excludes.contains(d))
                    .collect();
                if !found.is_empty() {
                    ok = self.fail(
                        "exclusions",
                        format!("Excluded entries found in {}: {}", path.display(), show(&found)),
                    );
                }
            }
        }
        ok
    }

    /// No hosts entry is already blocked by a domains entry.
    pub fn excluded_domains(&self) -> bool {
        let domains = self.node_domains(DOMAINS);
        let mut ok = true;
        for path in self.node_files(HOSTS) {
            let covered: Vec<String> = self
                .directives(&path)
                .into_iter()
                .map(|(d, _)| d)
                .filter(|d| domains.covers(d))
                .collect();
            if !covered.is_empty() {
                ok = self.fail(
                    "excluded_domains",
                    format!(
                        "Hosts already blocked by domains found in {}: {}",
                        path.display(),
                        show(&covered)
                    ),
                );
            }
        }
        ok
    }

    /// Generated files exist and each holds at least one directive.
    pub fn conf_files(&self) -> bool {
        let pattern = self.settings.stale_glob();
        let files = match self.fs.glob(&pattern) {
            Ok(files) => files,
            Err(e) => return self.fail("conf_files", format!("Unable to list {}: {}", pattern, e)),
        };
        if files.is_empty() {
            return self.fail("conf_files", format!("No files match {}", pattern));
        }
        let mut ok = true;
        for path in files {
            if self.directives(&path).is_empty() {
                ok = self.fail("conf_files", format!("{} has no entries", path.display()));
            }
        }
        ok
    }

    /// Every directive redirects to its area's address.
    pub fn conf_ip(&self) -> bool {
        let mut ok = true;
        for area in self.tree.areas() {
            let want = area.redirect_ip.to_string();
            for path in self.node_files(&area.name) {
                let wrong = self
                    .directives(&path)
                    .into_iter()
                    .filter(|(_, ip)| *ip != want)
                    .count();
                if wrong > 0 {
                    ok = self.fail(
                        "conf_ip",
                        format!(
                            "{} entries in {} do not redirect to {}",
                            wrong,
                            path.display(),
                            want
                        ),
                    );
                }
            }
        }
        ok
    }

    /// Run every check; all are evaluated even after a failure.
    pub fn verify_all(&self) -> bool {
        let results = [
            self.blacklistings(&self.pre_configured_pattern()),
            self.exclusions(),
            self.excluded_domains(),
            self.conf_files(),
            self.conf_ip(),
        ];
        results.iter().all(|ok| *ok)
    }
}
