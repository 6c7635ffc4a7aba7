//! SlotForge CLI - Bridge interface for hosts
//!
//! Commands: fields, bind, render, sequence
//! Outputs JSON to stdout, logs to stderr (RUST_LOG)
//! Returns 2 when any slot value was rejected or a slot is orphaned

use clap::{Parser, Subcommand};
use futures::executor::block_on;
use log::{info, warn};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use slotforge_core::assets::{hydrate_media, FileAssetLoader};
use slotforge_core::binder::{BindReport, SlotIssue};
use slotforge_core::export::{DirectorySink, ExportDriver, ExportKind};
use slotforge_core::slots::{FormField, LoadIssue};
use slotforge_core::{EditSession, EngineConfig, Preset, UserContentMap};

#[derive(Parser)]
#[command(name = "slotforge-cli")]
#[command(about = "SlotForge CLI - Content-Slot Templating Engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root for relative media paths (defaults to the preset's directory)
    #[arg(long, global = true)]
    assets_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the end-user form fields of every page
    Fields {
        #[arg(short, long)]
        preset: PathBuf,
    },

    /// Bind user content and report what was applied
    Bind {
        #[arg(short, long)]
        preset: PathBuf,

        /// JSON object of field name (or slot id) to value
        #[arg(long)]
        content: PathBuf,
    },

    /// Export one PNG per page plus a manifest
    Render {
        #[arg(short, long)]
        preset: PathBuf,

        #[arg(long)]
        content: Option<PathBuf>,

        #[arg(short, long)]
        out: PathBuf,
    },

    /// Export a timed frame sequence per page
    Sequence {
        #[arg(short, long)]
        preset: PathBuf,

        #[arg(long)]
        content: Option<PathBuf>,

        /// Frames per second (defaults to the configured rate)
        #[arg(long)]
        fps: Option<u32>,

        #[arg(long)]
        duration_ms: u64,

        #[arg(short, long)]
        out: PathBuf,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PageFields {
    page_index: u32,
    fields: Vec<FormField>,
    load_issues: Vec<LoadIssue>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PageOutcome {
    page_index: u32,
    load_issues: Vec<LoadIssue>,
    bind: BindReport,
    media_issues: Vec<SlotIssue>,
    frame_digest: Option<String>,
}

impl PageOutcome {
    fn rejected(&self) -> bool {
        !self.bind.issues.is_empty() || !self.media_issues.is_empty()
    }
}

struct Output {
    value: serde_json::Value,
    rejected: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output.value).unwrap());
            if output.rejected {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            let output = serde_json::json!({ "success": false, "error": e });
            println!("{}", serde_json::to_string(&output).unwrap());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<Output, String> {
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path).map_err(|e| format!("Failed to load config: {}", e))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Fields { preset } => {
            let preset = load_preset(&preset)?;
            let pages: Vec<_> = preset
                .load_pages()
                .into_iter()
                .map(|loaded| PageFields {
                    page_index: loaded.page.index,
                    fields: loaded.slots.form_fields(&loaded.page),
                    load_issues: loaded.report.issues,
                })
                .collect();
            let rejected = pages.iter().any(|p| !p.load_issues.is_empty());
            Ok(Output {
                value: serde_json::json!({ "success": true, "presetId": preset.id, "pages": pages }),
                rejected,
            })
        }

        Commands::Bind { preset: path, content } => {
            let preset = load_preset(&path)?;
            let content = load_content(Some(&content))?;
            let loader = asset_loader(cli.assets_dir, &path);
            let (_, outcomes) = prepare(&preset, &content, &loader, &config)?;
            let rejected = outcomes.iter().any(PageOutcome::rejected);
            Ok(Output {
                value: serde_json::json!({ "success": !rejected, "presetId": preset.id, "pages": outcomes }),
                rejected,
            })
        }

        Commands::Render { preset: path, content, out } => {
            export(&path, content.as_deref(), &out, cli.assets_dir, &config, |_| ExportKind::Still)
        }

        Commands::Sequence { preset: path, content, fps, duration_ms, out } => {
            export(&path, content.as_deref(), &out, cli.assets_dir, &config, |driver| match fps {
                Some(fps) => ExportKind::Sequence { fps, duration_ms },
                None => driver.default_sequence(duration_ms),
            })
        }
    }
}

fn load_preset(path: &Path) -> Result<Preset, String> {
    Preset::load(path).map_err(|e| format!("Failed to load preset {}: {}", path.display(), e))
}

fn load_content(path: Option<&Path>) -> Result<UserContentMap, String> {
    let Some(path) = path else {
        return Ok(UserContentMap::new());
    };
    let json = fs::read_to_string(path).map_err(|e| format!("Failed to read content: {}", e))?;
    serde_json::from_str(&json).map_err(|e| format!("Invalid content: {}", e))
}

fn asset_loader(assets_dir: Option<PathBuf>, preset_path: &Path) -> FileAssetLoader {
    let root = assets_dir.unwrap_or_else(|| {
        preset_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    });
    FileAssetLoader::new(root)
}

/// Load every page, decode designer media, bind `content` and wait for the
/// user's images.
fn prepare(
    preset: &Preset,
    content: &UserContentMap,
    loader: &FileAssetLoader,
    config: &EngineConfig,
) -> Result<(Vec<EditSession>, Vec<PageOutcome>), String> {
    let mut sessions = vec![];
    let mut outcomes = vec![];

    for mut loaded in preset.load_pages() {
        let hydration = block_on(hydrate_media(&mut loaded.page, loader));
        for (source, e) in &hydration.failed {
            warn!("designer media {} unavailable: {}", source, e);
        }

        let load_issues = loaded.report.issues.clone();
        let mut session = EditSession::from_loaded(loaded, config);
        let bound = session.apply_now(content.clone()).map_err(|e| e.to_string())?;
        let updates = block_on(session.settle_media(loader)).map_err(|e| e.to_string())?;
        let frame_digest = session
            .frame()
            .map(|frame| frame.digest())
            .transpose()
            .map_err(|e| e.to_string())?;

        outcomes.push(PageOutcome {
            page_index: session.page().index,
            load_issues,
            bind: bound.report,
            media_issues: updates.into_iter().filter_map(|u| u.issue).collect(),
            frame_digest,
        });
        sessions.push(session);
    }
    Ok((sessions, outcomes))
}

fn export(
    path: &Path,
    content: Option<&Path>,
    out: &Path,
    assets_dir: Option<PathBuf>,
    config: &EngineConfig,
    kind: impl Fn(&ExportDriver) -> ExportKind,
) -> Result<Output, String> {
    let preset = load_preset(path)?;
    let content = load_content(content)?;
    let loader = asset_loader(assets_dir, path);
    let (sessions, outcomes) = prepare(&preset, &content, &loader, config)?;

    let driver = ExportDriver::from_config(config);
    let kind = kind(&driver);
    let mut sink = DirectorySink::create(out).map_err(|e| e.to_string())?;
    let mut manifests = vec![];

    for session in &sessions {
        let scope = session.export_scope().map_err(|e| e.to_string())?;
        let manifest = driver
            .export(&scope, &preset.id, &content, kind, &mut sink)
            .map_err(|e| e.to_string())?;
        let manifest_path = sink.write_manifest(&manifest).map_err(|e| e.to_string())?;
        info!("wrote {}", manifest_path.display());

        let files: Vec<_> = manifest
            .files
            .iter()
            .map(|f| serde_json::json!({ "filename": f.filename, "hash": f.hash, "timestampMs": f.timestamp_ms }))
            .collect();
        manifests.push(serde_json::json!({
            "pageIndex": manifest.page_index,
            "manifest": manifest_path,
            "manifestHash": manifest.manifest_hash,
            "jobHash": manifest.job_hash,
            "files": files,
        }));
    }

    let rejected = outcomes.iter().any(PageOutcome::rejected);
    Ok(Output {
        value: serde_json::json!({
            "success": !rejected,
            "presetId": preset.id,
            "pages": outcomes,
            "exports": manifests,
        }),
        rejected,
    })
}
