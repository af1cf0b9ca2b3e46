//! dnsmasq configuration rendering, commit and stale-file cleanup.
//!
//! Each work unit owns exactly one file, `<dir>/<node>.<label>.<ext>`,
//! holding one `address=/<domain>/<ip>` directive per compiled domain.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashSet;
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::CompileError;
use crate::fs_abstraction::FileSystem;

/// Build the target path of a generated file.
///
/// # Examples
/// ```
/// use blacklist::compiler::target_path;
/// use std::path::Path;
/// let path = target_path(Path::new("/etc/dnsmasq.d"), "hosts", "pre-configured", "blacklist.conf");
/// assert_eq!(path, Path::new("/etc/dnsmasq.d/hosts.pre-configured.blacklist.conf"));
/// ```
pub fn target_path(dir: &Path, node: &str, label: &str, extension: &str) -> PathBuf {
    dir.join(format!("{}.{}.{}", node, label, extension))
}

/// Render one dnsmasq directive.
pub fn directive(domain: &str, ip: Ipv4Addr) -> String {
    format!("address=/{}/{}", domain, ip)
}

/// Split a directive line back into its domain and redirect address.
///
/// ```
/// use blacklist::compiler::parse_directive;
/// assert_eq!(parse_directive("address=/ads.example.com/0.0.0.0"), Some(("ads.example.com", "0.0.0.0")));
/// assert_eq!(parse_directive("server=/example.com/1.1.1.1"), None);
/// ```
pub fn parse_directive(line: &str) -> Option<(&str, &str)> {
    let rest = line.trim().strip_prefix("address=/")?;
    let (domain, ip) = rest.split_once('/')?;
    if domain.is_empty() {
        return None;
    }
    Some((domain, ip))
}

/// Lines that carry configuration, ignoring header comments and blanks.
fn directive_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect()
}

/// Final output of one work unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledContent {
    pub path: PathBuf,
    pub domains: Vec<String>,
    pub redirect_ip: Ipv4Addr,
    /// Where the domains came from (URLs, paths or `pre-configured`)
    pub descriptors: Vec<String>,
}

impl CompiledContent {
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn directives(&self) -> Vec<String> {
        self.domains
            .iter()
            .map(|d| directive(d, self.redirect_ip))
            .collect()
    }

    /// Render the file contents with a comment header stamped at `now`.
    pub fn render(&self, now: DateTime<Utc>) -> String {
        let mut out = format!(
            "# Generated by {} v{} at {}\n",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            now.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        for descriptor in &self.descriptors {
            out.push_str(&format!("# Source: {}\n", descriptor));
        }
        out.push_str(&format!("# Entries: {}\n", self.domains.len()));
        for line in self.directives() {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

/// What [`commit`] did with a unit's file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitOutcome {
    /// New or changed contents were written
    Written,
    /// Existing directives already matched
    Unchanged,
    /// Empty result; a previous file was removed
    Removed,
    /// Empty result and no previous file
    Skipped,
}

/// Write a unit's file if its directives changed.
///
/// Empty content writes nothing and removes any previous file at the path.
pub fn commit<F: FileSystem + ?Sized>(
    fs: &F,
    content: &CompiledContent,
    now: DateTime<Utc>,
) -> Result<CommitOutcome, CompileError> {
    let path = &content.path;

    if content.is_empty() {
        if !fs.exists(path) {
            return Ok(CommitOutcome::Skipped);
        }
        remove(fs, path)?;
        info!("Removed {} (no entries)", path.display());
        return Ok(CommitOutcome::Removed);
    }

    let directives = content.directives();
    if let Ok(existing) = fs.read_to_string(path) {
        if directive_lines(&existing) == directives {
            debug!("{} unchanged", path.display());
            return Ok(CommitOutcome::Unchanged);
        }
    }

    fs.write_atomic(path, content.render(now).as_bytes())
        .map_err(|e| CompileError::from_write(path.clone(), e))?;
    info!("Wrote {} ({} entries)", path.display(), content.domains.len());
    Ok(CommitOutcome::Written)
}

fn remove<F: FileSystem + ?Sized>(fs: &F, path: &Path) -> Result<(), CompileError> {
    match fs.remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            Err(CompileError::PermissionDenied(path.to_path_buf()))
        }
        Err(source) => Err(CompileError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Generated files found on disk for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CFile {
    pub pattern: String,
    /// Every file matching the pattern
    pub found: Vec<PathBuf>,
    /// Matches the current run will not produce
    pub stale: Vec<PathBuf>,
}

impl CFile {
    /// Scan for generated files and mark those outside `expected` as stale.
    pub fn scan<F: FileSystem + ?Sized>(
        fs: &F,
        pattern: &str,
        expected: &HashSet<PathBuf>,
    ) -> Result<Self, CompileError> {
        let found = fs.glob(pattern).map_err(|e| CompileError::StaleScan {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        let stale = found
            .iter()
            .filter(|p| !expected.contains(*p))
            .cloned()
            .collect();
        Ok(Self {
            pattern: pattern.to_string(),
            found,
            stale,
        })
    }

    /// Delete every stale file; returns the paths removed.
    pub fn remove_stale<F: FileSystem + ?Sized>(
        &self,
        fs: &F,
    ) -> Result<Vec<PathBuf>, CompileError> {
        for path in &self.stale {
            remove(fs, path)?;
            info!("Removed stale {}", path.display());
        }
        Ok(self.stale.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_abstraction::{MockFileSystem, RealFileSystem};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn content(dir: &Path, domains: &[&str]) -> CompiledContent {
        CompiledContent {
            path: target_path(dir, "domains", "url", "blacklist.conf"),
            domains: domains.iter().map(|d| d.to_string()).collect(),
            redirect_ip: Ipv4Addr::UNSPECIFIED,
            descriptors: vec!["http://example.com/list".to_string()],
        }
    }

    #[test]
    fn test_render_format() {
        let c = content(Path::new("/tmp"), &["ads.example.com", "track.example.net"]);
        let text = c.render(at(0));
        assert!(text.starts_with("# Generated by blacklist v"));
        assert!(text.contains("1970-01-01T00:00:00Z"));
        assert!(text.contains("# Source: http://example.com/list\n"));
        assert!(text.ends_with(
            "address=/ads.example.com/0.0.0.0\naddress=/track.example.net/0.0.0.0\n"
        ));
    }

    #[test]
    fn test_directive_lines_skip_header() {
        let text = "# header\n\naddress=/a.com/0.0.0.0\n# trailing\n";
        assert_eq!(directive_lines(text), vec!["address=/a.com/0.0.0.0"]);
    }

    #[test]
    fn test_commit_writes_then_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let fs = RealFileSystem;
        let c = content(temp_dir.path(), &["a.com"]);

        assert_eq!(commit(&fs, &c, at(0)).unwrap(), CommitOutcome::Written);
        let first = std::fs::read_to_string(&c.path).unwrap();

        // A later timestamp alone does not trigger a rewrite
        assert_eq!(commit(&fs, &c, at(3600)).unwrap(), CommitOutcome::Unchanged);
        assert_eq!(std::fs::read_to_string(&c.path).unwrap(), first);
    }

    #[test]
    fn test_commit_rewrites_on_change() {
        let temp_dir = TempDir::new().unwrap();
        let fs = RealFileSystem;
        commit(&fs, &content(temp_dir.path(), &["a.com"]), at(0)).unwrap();
        let c = content(temp_dir.path(), &["a.com", "b.com"]);
        assert_eq!(commit(&fs, &c, at(0)).unwrap(), CommitOutcome::Written);
        assert!(std::fs::read_to_string(&c.path)
            .unwrap()
            .contains("address=/b.com/0.0.0.0"));
    }

    #[test]
    fn test_commit_empty_removes_previous() {
        let temp_dir = TempDir::new().unwrap();
        let fs = RealFileSystem;
        commit(&fs, &content(temp_dir.path(), &["a.com"]), at(0)).unwrap();

        let empty = content(temp_dir.path(), &[]);
        assert_eq!(commit(&fs, &empty, at(0)).unwrap(), CommitOutcome::Removed);
        assert!(!empty.path.exists());
        assert_eq!(commit(&fs, &empty, at(0)).unwrap(), CommitOutcome::Skipped);
    }

    #[test]
    fn test_commit_permission_denied() {
        let mut mock_fs = MockFileSystem::new();
        mock_fs
            .expect_read_to_string()
            .returning(|_| Err(io::Error::from(io::ErrorKind::NotFound)));
        mock_fs
            .expect_write_atomic()
            .returning(|_, _| Err(io::Error::from(io::ErrorKind::PermissionDenied)));

        let c = content(Path::new("/etc/dnsmasq.d"), &["a.com"]);
        let err = commit(&mock_fs, &c, at(0)).unwrap_err();
        assert!(matches!(err, CompileError::PermissionDenied(_)));
    }

    #[test]
    fn test_commit_write_error() {
        let mut mock_fs = MockFileSystem::new();
        mock_fs
            .expect_read_to_string()
            .returning(|_| Err(io::Error::from(io::ErrorKind::NotFound)));
        mock_fs
            .expect_write_atomic()
            .returning(|_, _| Err(io::Error::new(io::ErrorKind::Other, "disk full")));

        let c = content(Path::new("/etc/dnsmasq.d"), &["a.com"]);
        let err = commit(&mock_fs, &c, at(0)).unwrap_err();
        assert!(matches!(err, CompileError::Write { .. }));
    }

    #[test]
    fn test_scan_marks_stale() {
        let temp_dir = TempDir::new().unwrap();
        let fs = RealFileSystem;
        let keep = target_path(temp_dir.path(), "domains", "url", "blacklist.conf");
        let old = target_path(temp_dir.path(), "zones", "url", "blacklist.conf");
        std::fs::write(&keep, "x").unwrap();
        std::fs::write(&old, "x").unwrap();
        std::fs::write(temp_dir.path().join("unrelated.conf"), "x").unwrap();

        let pattern = format!("{}/*blacklist.conf", temp_dir.path().display());
        let expected: HashSet<PathBuf> = [keep.clone()].into_iter().collect();
        let cfile = CFile::scan(&fs, &pattern, &expected).unwrap();
        assert_eq!(cfile.found.len(), 2);
        assert_eq!(cfile.stale, vec![old.clone()]);

        assert_eq!(cfile.remove_stale(&fs).unwrap(), vec![old.clone()]);
        assert!(!old.exists());
        assert!(keep.exists());
        assert!(temp_dir.path().join("unrelated.conf").exists());
    }

    #[test]
    fn test_compile_then_scan_finds_nothing_stale() {
        let temp_dir = TempDir::new().unwrap();
        let fs = RealFileSystem;
        let c = content(temp_dir.path(), &["a.com"]);
        commit(&fs, &c, at(0)).unwrap();

        let pattern = format!("{}/*blacklist.conf", temp_dir.path().display());
        let expected: HashSet<PathBuf> = [c.path.clone()].into_iter().collect();
        let cfile = CFile::scan(&fs, &pattern, &expected).unwrap();
        assert!(cfile.stale.is_empty());
        assert!(cfile.remove_stale(&fs).unwrap().is_empty());
    }

    #[test]
    fn test_scan_error_is_stale_scan() {
        let mut mock_fs = MockFileSystem::new();
        mock_fs
            .expect_glob()
            .returning(|_| Err(io::Error::new(io::ErrorKind::InvalidInput, "bad pattern")));
        let err = CFile::scan(&mock_fs, "[", &HashSet::new()).unwrap_err();
        assert!(matches!(err, CompileError::StaleScan { .. }));
    }

    #[test]
    fn test_remove_stale_tolerates_vanished_file() {
        let mut mock_fs = MockFileSystem::new();
        mock_fs
            .expect_remove_file()
            .returning(|_| Err(io::Error::from(io::ErrorKind::NotFound)));
        let cfile = CFile {
            pattern: String::new(),
            found: vec![PathBuf::from("/x.conf")],
            stale: vec![PathBuf::from("/x.conf")],
        };
        assert!(cfile.remove_stale(&mock_fs).is_ok());
    }
}
