//! Package-install detection and manifest verification.
//!
//! A package manager can exit 0 without recording anything (wrong working
//! directory, typo'd package, a workspace root elsewhere). After an install
//! command succeeds, the project manifest is read back and every requested
//! package must appear in it.

use std::collections::BTreeSet;

use sandpiper_core::sandbox::Sandbox;

/// Package ecosystems whose installs we can verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ecosystem {
    Node,
    Cargo,
}

impl Ecosystem {
    pub fn manifest(&self) -> &'static str {
        match self {
            Self::Node => "package.json",
            Self::Cargo => "Cargo.toml",
        }
    }
}

/// One install command found in a shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub ecosystem: Ecosystem,
    /// Directory the command ran in, relative to the sandbox root.
    pub dir: Option<String>,
    pub packages: Vec<String>,
}

impl InstallRequest {
    pub fn manifest_path(&self) -> String {
        match &self.dir {
            Some(dir) => format!("{}/{}", dir.trim_end_matches('/'), self.ecosystem.manifest()),
            None => self.ecosystem.manifest().to_string(),
        }
    }
}

/// Result of checking one install against its manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Verified { manifest: String, packages: Vec<String> },
    Missing { manifest: String, missing: Vec<String> },
    ManifestUnreadable { manifest: String, reason: String },
}

/// Flags that consume the following token.
const VALUE_FLAGS: &[&str] = &[
    "--features",
    "-F",
    "--rename",
    "--path",
    "--git",
    "--branch",
    "--tag",
    "--rev",
    "--registry",
    "--package",
    "-p",
    "--manifest-path",
    "--target",
    "--prefix",
    "--filter",
];

/// Find every package install in a shell command line.
///
/// Segments are split on `&&`, `||`, `;` and newlines; a preceding `cd <dir>`
/// sets the directory whose manifest is checked.
pub fn detect_installs(command: &str) -> Vec<InstallRequest> {
    let mut requests = Vec::new();
    let mut dir: Option<String> = None;

    for segment in split_segments(command) {
        let tokens: Vec<String> = segment
            .split_whitespace()
            .map(|t| t.trim_matches(|c| c == '"' || c == '\'').to_string())
            .collect();
        let Some(first) = tokens.first() else { continue };

        if first == "cd" {
            dir = change_dir(dir.as_deref(), tokens.get(1).map(String::as_str));
            continue;
        }

        let (ecosystem, rest) = match (first.as_str(), tokens.get(1).map(String::as_str)) {
            ("npm", Some("install" | "i" | "add")) => (Ecosystem::Node, &tokens[2..]),
            ("yarn", Some("add")) => (Ecosystem::Node, &tokens[2..]),
            ("pnpm", Some("add" | "install" | "i")) => (Ecosystem::Node, &tokens[2..]),
            ("cargo", Some("add")) => (Ecosystem::Cargo, &tokens[2..]),
            _ => continue,
        };

        let packages = package_args(rest, ecosystem);
        if !packages.is_empty() {
            requests.push(InstallRequest {
                ecosystem,
                dir: dir.clone(),
                packages,
            });
        }
    }
    requests
}

/// Apply `cd target` to a sandbox-relative directory.
fn change_dir(current: Option<&str>, target: Option<&str>) -> Option<String> {
    let target = target?;
    if target.starts_with('/') || target.starts_with('~') {
        return Some(target.to_string());
    }
    let mut parts: Vec<&str> = current
        .map(|c| c.split('/').filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();
    for part in target.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() { None } else { Some(parts.join("/")) }
}

fn split_segments(command: &str) -> Vec<String> {
    command
        .replace("&&", "\n")
        .replace("||", "\n")
        .replace(';', "\n")
        .lines()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn package_args(tokens: &[String], ecosystem: Ecosystem) -> Vec<String> {
    let mut packages = Vec::new();
    let mut skip_next = false;
    for token in tokens {
        if skip_next {
            skip_next = false;
            continue;
        }
        if token.starts_with('-') {
            skip_next = VALUE_FLAGS.contains(&token.as_str());
            continue;
        }
        // Redirections and pipes end the argument list.
        if token.starts_with('>')
            || token.starts_with('|')
            || (token.starts_with('2') && token.contains('>'))
        {
            break;
        }
        let name = strip_version(token, ecosystem);
        if !name.is_empty() {
            packages.push(name);
        }
    }
    packages
}

/// `react@18` → `react`, `@types/node@^20` → `@types/node`, `serde@1.0` → `serde`.
pub fn strip_version(spec: &str, ecosystem: Ecosystem) -> String {
    match ecosystem {
        Ecosystem::Node => {
            if let Some(scoped) = spec.strip_prefix('@') {
                match scoped.split_once('@') {
                    Some((name, _)) => format!("@{name}"),
                    None => spec.to_string(),
                }
            } else {
                spec.split('@').next().unwrap_or(spec).to_string()
            }
        }
        Ecosystem::Cargo => spec.split('@').next().unwrap_or(spec).to_string(),
    }
}

/// Names declared in a manifest's dependency tables.
pub fn declared_packages(ecosystem: Ecosystem, manifest: &str) -> Result<BTreeSet<String>, String> {
    let tables: &[&str] = match ecosystem {
        Ecosystem::Node => &[
            "dependencies",
            "devDependencies",
            "optionalDependencies",
            "peerDependencies",
        ],
        Ecosystem::Cargo => &["dependencies", "dev-dependencies", "build-dependencies"],
    };

    let mut names = BTreeSet::new();
    match ecosystem {
        Ecosystem::Node => {
            let doc: serde_json::Value =
                serde_json::from_str(manifest).map_err(|e| format!("invalid package.json: {e}"))?;
            for table in tables {
                if let Some(deps) = doc.get(*table).and_then(|v| v.as_object()) {
                    names.extend(deps.keys().cloned());
                }
            }
        }
        Ecosystem::Cargo => {
            let doc: toml::Table =
                manifest.parse().map_err(|e| format!("invalid Cargo.toml: {e}"))?;
            for table in tables {
                if let Some(deps) = doc.get(*table).and_then(|v| v.as_table()) {
                    names.extend(deps.keys().cloned());
                }
            }
        }
    }
    Ok(names)
}

/// Read the manifest for `request` and check every package is declared.
pub async fn verify(sandbox: &dyn Sandbox, request: &InstallRequest) -> Verification {
    let manifest = request.manifest_path();
    let body = match sandbox.read_file(&manifest).await {
        Ok(body) => body,
        Err(e) => {
            return Verification::ManifestUnreadable {
                manifest,
                reason: e.to_string(),
            };
        }
    };

    let declared = match declared_packages(request.ecosystem, &body) {
        Ok(names) => names,
        Err(reason) => return Verification::ManifestUnreadable { manifest, reason },
    };

    let missing: Vec<String> = request
        .packages
        .iter()
        .filter(|p| !declared.contains(*p))
        .cloned()
        .collect();

    if missing.is_empty() {
        Verification::Verified {
            manifest,
            packages: request.packages.clone(),
        }
    } else {
        Verification::Missing { manifest, missing }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_npm_install_with_versions_and_scopes() {
        let found = detect_installs("npm install react@18 @types/node@^20 @tanstack/query --save-dev");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].ecosystem, Ecosystem::Node);
        assert_eq!(found[0].packages, vec!["react", "@types/node", "@tanstack/query"]);
        assert_eq!(found[0].manifest_path(), "package.json");
    }

    #[test]
    fn bare_install_is_not_a_package_install() {
        assert!(detect_installs("npm install").is_empty());
        assert!(detect_installs("pnpm i --frozen-lockfile").is_empty());
        assert!(detect_installs("npm run build").is_empty());
    }

    #[test]
    fn tracks_cd_before_install() {
        let found = detect_installs("cd frontend && yarn add zod && cd .. && cargo add serde@1 -F derive");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].manifest_path(), "frontend/package.json");
        assert_eq!(found[1].ecosystem, Ecosystem::Cargo);
        assert_eq!(found[1].packages, vec!["serde"]);
        assert_eq!(found[1].manifest_path(), "Cargo.toml");
    }

    #[test]
    fn nested_cd_resolves() {
        let found = detect_installs("cd apps/web; cd ../api && npm i express");
        assert_eq!(found[0].manifest_path(), "apps/api/package.json");
    }

    #[test]
    fn reads_node_manifest_tables() {
        let manifest = r#"{"dependencies": {"react": "^18"}, "devDependencies": {"vite": "^5"}}"#;
        let names = declared_packages(Ecosystem::Node, manifest).unwrap();
        assert!(names.contains("react"));
        assert!(names.contains("vite"));
    }

    #[test]
    fn reads_cargo_manifest_tables() {
        let manifest = "[package]\nname = \"x\"\n\n[dependencies]\nserde = \"1\"\n\n[dev-dependencies]\ntempfile = \"3\"\n";
        let names = declared_packages(Ecosystem::Cargo, manifest).unwrap();
        assert!(names.contains("serde"));
        assert!(names.contains("tempfile"));
        assert!(!names.contains("x"));
    }

    #[test]
    fn strips_versions() {
        assert_eq!(strip_version("lodash@4.17.21", Ecosystem::Node), "lodash");
        assert_eq!(strip_version("@scope/pkg", Ecosystem::Node), "@scope/pkg");
        assert_eq!(strip_version("tokio@1.40", Ecosystem::Cargo), "tokio");
    }
}
