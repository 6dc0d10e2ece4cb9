// ABOUTME: File synchronization into running sandboxes over the session command channel
// ABOUTME: Classifies batches to pick the cheapest rebuild action; pushes files best-effort

use crate::types::{ProjectFile, RebuildAction};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use skiff_daytona::DaytonaApi;
use tracing::{debug, warn};

/// File names that force a full rebuild when touched
const CONFIG_FILES: &[&str] = &["package.json", "pnpm-lock.yaml", "index.html"];

/// File name prefixes for build configuration (vite.config.ts, tsconfig.app.json, ...)
const CONFIG_PREFIXES: &[&str] = &[
    "vite.config",
    "tsconfig",
    "tailwind.config",
    "postcss.config",
    "eslint.config",
    ".env",
];

const COMPONENT_EXTENSIONS: &[&str] = &["tsx", "jsx", "ts", "js", "vue", "svelte"];
const STYLE_EXTENSIONS: &[&str] = &["css", "scss", "sass", "less"];

/// Result of pushing a file batch into a sandbox
#[derive(Debug, Default)]
pub struct SyncReport {
    pub written: usize,
    pub errors: Vec<String>,
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn extension(path: &str) -> Option<&str> {
    file_name(path).rsplit_once('.').map(|(_, ext)| ext)
}

/// True for dependency-manifest and build-config files
pub fn is_config_file(path: &str) -> bool {
    let name = file_name(path);
    CONFIG_FILES.contains(&name) || CONFIG_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// True for UI-component source files
pub fn is_component_file(path: &str) -> bool {
    !is_config_file(path)
        && extension(path).is_some_and(|ext| COMPONENT_EXTENSIONS.contains(&ext))
}

/// True for stylesheets
pub fn is_style_file(path: &str) -> bool {
    extension(path).is_some_and(|ext| STYLE_EXTENSIONS.contains(&ext))
}

/// Pick the rebuild action for a batch, by fixed precedence.
///
/// Config beats component beats style; exactly one action is chosen even when
/// several categories are present in the same batch.
pub fn classify_rebuild(files: &[ProjectFile]) -> RebuildAction {
    if files.iter().any(|f| is_config_file(&f.path)) {
        RebuildAction::Full
    } else if files.iter().any(|f| is_component_file(&f.path)) {
        RebuildAction::Optimized
    } else if files.iter().any(|f| is_style_file(&f.path)) {
        RebuildAction::StyleOnly
    } else {
        RebuildAction::None
    }
}

/// Push a batch of files into a sandbox through a command session.
///
/// Each file gets its parent directories created, then its content written via
/// a base64 payload so arbitrary bytes survive the shell. A failed write is
/// recorded per file and the batch continues; partial progress is preserved.
pub async fn push_files(
    api: &dyn DaytonaApi,
    sandbox_id: &str,
    session_id: &str,
    workdir: &str,
    files: &[ProjectFile],
) -> SyncReport {
    let mut report = SyncReport::default();

    for file in files {
        let relative = file.path.trim_start_matches('/');
        let target = format!("{}/{}", workdir, relative);

        if let Some((dir, _)) = target.rsplit_once('/') {
            let mkdir = format!("mkdir -p '{}'", dir);
            if let Err(e) = api.exec(sandbox_id, session_id, &mkdir).await {
                warn!("mkdir failed for {}: {}", dir, e);
            }
        }

        let payload = BASE64.encode(file.content.as_bytes());
        let write = format!("echo '{}' | base64 -d > '{}'", payload, target);

        match api.exec(sandbox_id, session_id, &write).await {
            Ok(result) if result.succeeded() => {
                debug!("Wrote {} ({} bytes)", target, file.content.len());
                report.written += 1;
            }
            Ok(result) => {
                report.errors.push(format!(
                    "{}: write exited with code {}: {}",
                    file.path,
                    result.exit_code,
                    result.output.trim()
                ));
            }
            Err(e) => {
                report.errors.push(format!("{}: {}", file.path, e));
            }
        }
    }

    report
}
