//! UI helpers for the installer CLI.
//!
//! Provides consistent formatting for console output during installation.

use colored::{ColoredString, Colorize};

use crate::pipeline::InstallReport;
use crate::validator::Missing;

/// Print the installer banner.
pub fn print_banner() {
    println!(
        "\n{}\n  {}\n",
        "Contiv network plugin installer".cyan().bold(),
        "Kubernetes networking with optional ACI fabric integration".bright_black()
    );
}

fn print_section(title: &str) {
    let rule = "─".repeat(title.chars().count() + 4);
    println!("\n{}\n  {}\n{}", rule.bright_black(), title.cyan().bold(), rule.bright_black());
}

/// Print a `[n/total]` stage line.
pub fn print_progress_step(current: u8, total: u8, message: &str) {
    let counter = format!("[{current}/{total}]");
    println!("{} {}", counter.cyan(), message.bold());
}

fn status(marker: ColoredString, message: &str) {
    println!("{marker} {message}");
}

pub fn print_success(message: &str) {
    status("✓".green().bold(), message);
}

pub fn print_warning(message: &str) {
    status("!".yellow().bold(), &message.yellow().to_string());
}

/// Errors go to standard error.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message);
}

pub fn print_info(message: &str) {
    status("·".blue(), message);
}

/// Print the preflight outcome in one block.
pub fn print_preflight(missing: &[Missing]) {
    if missing.is_empty() {
        print_success("Prerequisites satisfied");
        return;
    }
    println!("Prerequisites:");
    for m in missing {
        let marker = if m.critical {
            "missing".red().bold()
        } else {
            "optional".yellow()
        };
        println!("  {marker:>8} {}: {}", m.name, m.remedy.bright_black());
    }
}

fn print_kv(key: &str, value: &str) {
    println!("  {:<18}{}", format!("{key}:").bright_black(), value);
}

/// Print what was installed and how to start using netctl.
pub fn print_summary(report: &InstallReport) {
    print_section("Contiv installed");

    let params = &report.params;
    print_kv("Netmaster", &params.master);
    print_kv("Cluster store", &params.effective_cluster_store());
    print_kv("Forwarding mode", &params.forwarding_mode.to_string());
    print_kv(
        "APIC integration",
        if report.fabric_enabled() { "enabled" } else { "disabled" },
    );
    print_kv("Manifest", &report.manifest_path.display().to_string());
    if report.tls_generated {
        print_info("Auth proxy is using a generated self-signed certificate");
    }

    if let Some(backup) = &report.dns_backup {
        print_kv("kube-dns backup", &backup.display().to_string());
    }

    print_section("Next steps");
    println!("Manage Contiv with netctl, for example:");
    let netmaster = params.netmaster_url();
    for args in [
        "global set --fwd-mode routing",
        "global set --fabric-mode aci",
        "net create -t default --subnet=20.1.1.0/24 default-net",
        "global info",
    ] {
        println!("  {}", format!("netctl --netmaster {netmaster} {args}").bright_black());
    }
}

/// Print the hint shown after a usage error.
pub fn print_usage_hint(usage: &str) {
    println!();
    println!("{usage}");
}
