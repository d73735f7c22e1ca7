//! runme-identity: assign document and cell identities to Markdown notebooks.
//!
//! Usage:
//!   # Rewrite files in place using RUNME_LIFECYCLE_IDENTITY (default: All)
//!   cargo run -p runme-engine --bin runme-identity -- README.md docs/*.md
//!
//!   # Only report files that would change (exit code 1 if any)
//!   cargo run -p runme-engine --bin runme-identity -- --check README.md
//!
//!   # Also write a session outputs document
//!   cargo run -p runme-engine --bin runme-identity -- --session 01HFA08N6F66WSG09RR9XEP0T6 README.md

use clap::Parser;
use runme_core::LifecycleSetting;
use runme_engine::{
    init_tracing, DocumentKey, DocumentStore, EngineConfig, FsDocumentStore, LogFormat,
    SaveOrchestrator, TelemetryConfig,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Assign Runme identities to Markdown notebooks.
#[derive(Parser, Debug)]
#[command(name = "runme-identity", version)]
#[command(about = "Assign Runme document and cell identities to Markdown notebooks")]
struct Args {
    /// Lifecycle identity setting: None, Doc, Cell or All (overrides RUNME_LIFECYCLE_IDENTITY)
    #[arg(short, long)]
    lifecycle: Option<LifecycleSetting>,

    /// Report files that would change without writing them
    #[arg(long)]
    check: bool,

    /// Also write a session outputs document for this session id
    #[arg(long, value_name = "SESSION_ID", conflicts_with = "check")]
    session: Option<String>,

    /// Log format: pretty or json (overrides RUNME_LOG_FORMAT)
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Notebook files
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("runme-identity: {e}");
            return ExitCode::from(2);
        }
    };
    if let Some(lifecycle) = args.lifecycle {
        config.lifecycle = lifecycle;
    }
    if let Some(log_format) = args.log_format {
        config.log_format = log_format;
    }

    if let Err(e) = init_tracing(&TelemetryConfig::with_format(config.log_format)) {
        eprintln!("runme-identity: {e}");
    }

    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            eprintln!("runme-identity: cannot read working directory: {e}");
            return ExitCode::from(2);
        }
    };

    let orchestrator = SaveOrchestrator::new();
    let store = FsDocumentStore::new();
    let mut failed = false;
    let mut pending = false;

    for file in &args.files {
        let key = DocumentKey::from(file.as_path());

        if args.check {
            let text = match store.read(&key).await {
                Ok(text) => text,
                Err(e) => {
                    eprintln!("{}: {e}", file.display());
                    failed = true;
                    continue;
                }
            };
            match orchestrator.save(key, &text, config.lifecycle) {
                Ok(outcome) if outcome.changed => {
                    println!("would update {} (+{} identities)", file.display(), outcome.assigned.len());
                    pending = true;
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("{}: {e}", file.display());
                    failed = true;
                }
            }
            continue;
        }

        match orchestrator.save_file(&store, key, config.lifecycle).await {
            Ok(outcome) if outcome.changed => {
                println!("updated {} (+{} identities)", file.display(), outcome.assigned.len());
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {e}", file.display());
                failed = true;
                continue;
            }
        }

        if let Some(session_id) = &args.session {
            // Absolute on both sides so the notebook can be found from the outputs.
            let notebook = absolute(&cwd, file);
            let outputs_dir = config
                .session_outputs_dir
                .as_deref()
                .map(|dir| absolute(&cwd, dir));
            match orchestrator
                .save_session_outputs(
                    &store,
                    notebook,
                    session_id,
                    outputs_dir.as_deref(),
                    LifecycleSetting::None,
                )
                .await
            {
                Ok(outputs) => println!("wrote {outputs}"),
                Err(e) => {
                    eprintln!("{}: {e}", file.display());
                    failed = true;
                }
            }
        }
    }

    if failed {
        ExitCode::from(2)
    } else if pending {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

fn absolute(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}
