// src/main.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use debsync::control::Control;
use debsync::{
    ensure_tagged, import_from_directory, tracker, HttpTracker, ImportOptions, Nvr, StoreClient,
    SyncOptions, TagRules, TrackerSession,
};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "debsync")]
#[command(author, version, about = "Migrate Debian builds from an artifact store into a build tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import and tag every build listed in a manifest tree
    Sync {
        /// Source store base URL, eg. https://store.example.com
        #[arg(long)]
        store_url: String,
        /// Tracker hub gateway URL
        #[arg(long)]
        hub_url: String,
        /// SCM URL template with a {name} placeholder,
        /// eg. git://example.com/packages/{name}
        #[arg(long)]
        scm_template: String,
        /// Tracker user name that will own all new builds
        #[arg(long)]
        owner: String,
        /// Show what would happen, but don't do it
        #[arg(long)]
        dryrun: bool,
        /// Directory tree of builds-*.txt manifest files
        directory: PathBuf,
    },
    /// Report builds whose source files are incomplete in the store
    Missing {
        /// Source store base URL
        #[arg(long)]
        store_url: String,
        /// Directory tree of builds-*.txt manifest files
        directory: PathBuf,
    },
    /// Import one already-fetched build directory into the tracker
    Upload {
        /// Tracker hub gateway URL
        #[arg(long)]
        hub_url: String,
        /// SCM URL for this build, eg. git://...
        #[arg(long)]
        scm_url: String,
        /// Tracker user name that owns this build
        #[arg(long)]
        owner: String,
        /// Tag the build after import, eg. ceph-3.2-xenial
        #[arg(long)]
        tag: Option<String>,
        /// Show what would happen, but don't do it
        #[arg(long)]
        dryrun: bool,
        /// Parent directory of a .dsc file
        directory: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Commands::Sync {
            store_url,
            hub_url,
            scm_template,
            owner,
            dryrun,
            directory,
        } => {
            let store = StoreClient::new(&store_url)?;
            let session = HttpTracker::new(&hub_url)?;
            let opts = SyncOptions {
                scm_template,
                owner,
                dryrun,
            };
            let report =
                debsync::sync::run(&session, &store, &directory, &TagRules::default(), &opts)?;
            info!(
                "{} builds processed, {} failed",
                report.processed, report.failed
            );
            if !report.is_clean() {
                bail!("{} builds failed to sync", report.failed);
            }
            Ok(())
        }
        Commands::Missing {
            store_url,
            directory,
        } => {
            let store = StoreClient::new(&store_url)?;
            let incomplete = debsync::missing::run(&store, &directory, &TagRules::default())?;
            if incomplete > 0 {
                bail!("{incomplete} builds are missing files in the store");
            }
            Ok(())
        }
        Commands::Upload {
            hub_url,
            scm_url,
            owner,
            tag,
            dryrun,
            directory,
        } => {
            let session = HttpTracker::new(&hub_url)?;
            tracker::verify_user(&session, &owner)?;
            if let Some(tag) = &tag {
                tracker::verify_tag(&session, tag)?;
            }

            // Bail early if this build already exists.
            let dsc_path = debsync::import::find_one_file(&directory, "dsc")?;
            let dsc = Control::from_path(&dsc_path)?;
            let version = dsc
                .get("version")
                .context("descriptor has no Version field")?;
            let nvr = Nvr::parse(&format!("{}_{}", dsc.source()?, version))
                .context("descriptor yields an invalid NVR")?;
            if let Some(existing) = session.get_build(&nvr.tracker_key())? {
                bail!("{} already exists in the tracker", existing.nvr());
            }

            let opts = ImportOptions {
                owner,
                scm_url,
                skip_log: false,
                dryrun,
            };
            let buildinfo = import_from_directory(&session, &directory, &opts)?;

            match tag {
                Some(tag) => ensure_tagged(&session, &buildinfo, &BTreeSet::from([tag]), dryrun)?,
                None => info!("not tagging {}", buildinfo.nvr()),
            }
            Ok(())
        }
    }
}
