//! # fnpack CLI interface
//!
//! Command parsing and orchestration glue for the `fnpack` binary. Every
//! packaging and upload decision lives in the `fnpack` library; this module
//! loads config, builds the concrete store and enumerator, and reports.
//!
//! - `package`: build every artifact the plan needs into the staging directory
//! - `upload`: upload descriptors and already-built artifacts
//! - `deploy`: both, packaging first
//!
//! [`run`] is the async entrypoint shared by `main` and integration tests.

use crate::load_config::{load_config, CliConfig};
use crate::upload::store_from_config;
use anyhow::Result;
use clap::{Parser, Subcommand};
use fnpack::deploy::{deploy, package_service, plan_service, upload_service};
use fnpack::naming::ServiceNaming;
use fnpack::prune::NpmEnumerator;
use fnpack::upload::UploadSummary;
use std::path::PathBuf;

/// CLI for fnpack: package functions and ship them to an object store.
#[derive(Parser)]
#[clap(
    name = "fnpack",
    version,
    about = "Package serverless functions into zip artifacts and upload them"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build every planned artifact into the staging directory
    Package {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Upload descriptors and previously built artifacts
    Upload {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Package, then upload
    Deploy {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

fn naming_for(config: &CliConfig) -> Result<ServiceNaming> {
    let naming = ServiceNaming::new(config.service.service.clone());
    match &config.service.descriptor_pattern {
        Some(pattern) => naming
            .with_descriptor_pattern(pattern)
            .map_err(|e| anyhow::anyhow!("Invalid descriptor_pattern `{pattern}`: {e}")),
        None => Ok(naming),
    }
}

fn print_uploads(summary: &UploadSummary) {
    println!(
        "Uploaded {} descriptor(s), {} unit artifact(s){}",
        summary.descriptors.uploaded(),
        summary.units.uploaded(),
        if summary.service.is_some() {
            " and the service artifact"
        } else {
            ""
        }
    );
}

/// Async CLI entrypoint for `main` and integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Package { config } => {
            let config = load_config(config)?;
            let naming = naming_for(&config)?;
            tracing::info!(command = "package", service = %config.service.service, "Packaging service");

            let plan = plan_service(&config.service, &naming)?;
            let packaged = package_service(&config.service, &plan, &NpmEnumerator::new())
                .map_err(|e| {
                    tracing::error!(command = "package", error = %e, "Packaging failed");
                    anyhow::Error::new(e)
                })?;
            for artifact in &packaged {
                println!("Packaged {}", artifact.display());
            }
            tracing::info!(command = "package", artifacts = packaged.len(), "Packaging complete");
            Ok(())
        }
        Commands::Upload { config } => {
            let config = load_config(config)?;
            let naming = naming_for(&config)?;
            let store = store_from_config(&config.store, config.store_token.clone())
                .map_err(|e| anyhow::anyhow!("Failed to construct store: {e}"))?;
            tracing::info!(command = "upload", service = %config.service.service, "Uploading service");

            let plan = plan_service(&config.service, &naming)?;
            let summary = upload_service(&config.service, &plan, &naming, store.as_ref())
                .await
                .map_err(|e| {
                    tracing::error!(command = "upload", error = %e, "Upload failed");
                    anyhow::Error::new(e)
                })?;
            print_uploads(&summary);
            tracing::info!(command = "upload", "Upload complete");
            Ok(())
        }
        Commands::Deploy { config } => {
            let config = load_config(config)?;
            let naming = naming_for(&config)?;
            let store = store_from_config(&config.store, config.store_token.clone())
                .map_err(|e| anyhow::anyhow!("Failed to construct store: {e}"))?;
            tracing::info!(command = "deploy", service = %config.service.service, "Deploying service");

            match deploy(&config.service, &naming, &NpmEnumerator::new(), store.as_ref()).await {
                Ok(report) => {
                    for artifact in &report.packaged {
                        println!("Packaged {}", artifact.display());
                    }
                    print_uploads(&report.uploads);
                    println!("Deploy {} complete", report.run_id);
                    tracing::info!(command = "deploy", run_id = %report.run_id, "Deploy complete");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "deploy", error = %e, "Deploy failed");
                    Err(anyhow::Error::new(e))
                }
            }
        }
    }
}
