//! Contiv installer CLI.
//!
//! Installs the Contiv network plugin into the Kubernetes cluster this host
//! is the master of.

use std::io::IsTerminal;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use contiv_installer::cli::Cli;
use contiv_installer::cluster::{KubeCluster, Netctl, OpensslGenerator};
use contiv_installer::manifest::DirectoryFragments;
use contiv_installer::pipeline::resolve_parameters;
use contiv_installer::resolver::{PresuppliedInput, SecretPrompt, TerminalPrompt};
use contiv_installer::validator::PrerequisitesValidator;
use contiv_installer::{ui, InstallError, InstallPaths, InstallResult, Pipeline};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            ui::print_error(e.render().to_string().trim());
            ui::print_usage_hint(&Cli::usage());
            return ExitCode::FAILURE;
        }
    };

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("info,contiv_installer=debug")
    } else {
        EnvFilter::new("warn,contiv_installer=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Installation aborted");
            ui::print_error(&e.to_string());
            if e.is_usage() {
                ui::print_usage_hint(&Cli::usage());
            }
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> InstallResult<()> {
    if !nix::unistd::Uid::effective().is_root() {
        return Err(InstallError::Privilege);
    }

    ui::print_banner();

    let prompt: Box<dyn SecretPrompt> = if std::io::stdin().is_terminal() {
        Box::new(TerminalPrompt)
    } else {
        Box::new(PresuppliedInput(None))
    };
    let params = resolve_parameters(cli.raw_parameters(), prompt.as_ref())?;

    let paths = InstallPaths::default().with_netctl_source(&cli.netctl_binary);
    PrerequisitesValidator::new(params.tls_cert.is_none(), &paths.netctl_source)
        .validate()
        .map_err(|e| InstallError::external("Checking prerequisites", e))?;

    let cluster = KubeCluster::connect(cli.kubeconfig.as_deref())
        .await
        .map_err(|e| InstallError::external("Connecting to the cluster", e))?;

    let mut pipeline = Pipeline::new(
        Box::new(cluster),
        Box::new(Netctl::new(&paths.netctl_destination)),
        Box::new(OpensslGenerator::default()),
    )
    .with_paths(paths)
    .with_prompt(prompt);
    if let Some(dir) = &cli.template_dir {
        pipeline = pipeline.with_fragments(Box::new(DirectoryFragments::new(dir)));
    }

    let report = pipeline.run_resolved(params).await?;
    ui::print_summary(&report);
    Ok(())
}
