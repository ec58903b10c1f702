use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::{self, Write};
use std::sync::Arc;
use wipeout::command::SystemRunner;
use wipeout::exec::select_handler;
use wipeout::facts::SysfsFacts;
use wipeout::safety::ConfigFile;
use wipeout::{SafetyLevel, WipeOrchestrator, WipeRequest};

#[derive(Parser)]
#[command(name = "wipeout")]
#[command(about = "Secure disk erasure with hidden-area (HPA/DCO) detection and removal")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Safety configuration file (JSON)
    #[arg(long, global = true, env = "WIPEOUT_SAFETY_CONFIG")]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List detected block devices with their classification
    List {
        /// Show warnings and recommendations per device
        #[arg(short, long)]
        detailed: bool,
    },

    /// Classify a single device
    Classify {
        /// Device path (e.g., /dev/sda)
        device: String,
    },

    /// Detect hidden capacity areas (HPA/DCO)
    DetectHidden {
        /// Device path
        device: String,
    },

    /// Remove a Host Protected Area, exposing the native capacity
    RemoveHpa {
        /// Device path
        device: String,
    },

    /// Restore the factory Device Configuration Overlay (IRREVERSIBLE)
    RemoveDco {
        /// Device path
        device: String,
    },

    /// Wipe a device
    Wipe {
        /// Device path
        device: String,

        /// Wipe method (secure, quick, zero, dd, hdparm, trim, format)
        #[arg(short, long, default_value = "secure")]
        method: String,

        /// Number of overwrite passes
        #[arg(short, long, default_value = "3")]
        passes: u32,

        /// Skip post-wipe verification
        #[arg(long)]
        no_verify: bool,

        /// Remove a detected HPA before wiping
        #[arg(long)]
        remove_hpa: bool,

        /// Remove a detected DCO before wiping (IRREVERSIBLE)
        #[arg(long)]
        remove_dco: bool,

        /// Skip the interactive confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

fn build_orchestrator(config: Option<&str>) -> WipeOrchestrator {
    let config_file = match config {
        Some(path) => ConfigFile::new(path),
        None => ConfigFile::new(
            ConfigFile::default_path().unwrap_or_else(|| "/etc/wipeout/safety.json".into()),
        ),
    };
    WipeOrchestrator::new(
        Arc::new(SysfsFacts::new()),
        Arc::new(SystemRunner::new()),
        select_handler(),
        Arc::new(config_file),
    )
}

fn safety_badge(level: SafetyLevel) -> colored::ColoredString {
    match level {
        SafetyLevel::Critical => "CRITICAL".red().bold(),
        SafetyLevel::Dangerous => "DANGEROUS".red(),
        SafetyLevel::WarningRequired => "WARNING".yellow(),
        SafetyLevel::SafeToWipe => "SAFE".green(),
        SafetyLevel::Unknown => "UNKNOWN".dimmed(),
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} Type YES to continue: ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(answer.trim() == "YES")
}

fn list_devices(orchestrator: &WipeOrchestrator, detailed: bool) -> Result<()> {
    let devices = orchestrator.list_devices()?;
    if devices.is_empty() {
        println!("No block devices found (insufficient permissions?)");
        return Ok(());
    }

    for device in &devices {
        let c = orchestrator.classify_device(&device.path);
        println!(
            "{}  [{}]  role={:?}  confidence={:.2}",
            device,
            safety_badge(c.safety),
            c.role,
            c.confidence
        );
        if detailed {
            for warning in &c.warnings {
                println!("    {} {}", "!".yellow(), warning);
            }
            for rec in &c.recommendations {
                println!("    {} {}", "-".dimmed(), rec);
            }
        }
    }
    Ok(())
}

fn show_classification(orchestrator: &WipeOrchestrator, device: &str) {
    let c = orchestrator.classify_device(device);
    println!("Device:        {device}");
    println!("Role:          {:?}", c.role);
    println!("Safety:        {}", safety_badge(c.safety));
    println!("Boot priority: {}", c.boot_priority);
    println!("Confidence:    {:.2}", c.confidence);
    println!(
        "System: {}  Boot: {}  Mounted: {}  Writable: {}  Removable: {}  External: {}",
        c.is_system_disk, c.is_boot_disk, c.is_mounted, c.is_writable, c.is_removable, c.is_external
    );
    for warning in &c.warnings {
        println!("{} {}", "!".yellow(), warning);
    }
    for rec in &c.recommendations {
        println!("{} {}", "-".dimmed(), rec);
    }
}

fn show_hidden_report(orchestrator: &WipeOrchestrator, device: &str) {
    let report = orchestrator.detect_hidden(device);
    println!("Detection method: {}", report.detection_method);
    if let Some(current) = report.current_max_sectors {
        println!("Current max:  {current} sectors");
    }
    if let Some(native) = report.native_max_sectors {
        println!("Native max:   {native} sectors");
    }
    if let Some(accessible) = report.accessible_sectors {
        println!("Accessible:   {accessible} sectors");
    }
    if report.hpa_detected {
        println!(
            "{} HPA detected: {} sectors hidden (removable: {})",
            "!".red().bold(),
            report.hpa_sectors,
            report.can_remove_hpa
        );
    } else {
        println!("{} No HPA detected", "ok".green());
    }
    if report.dco_detected {
        println!(
            "{} DCO detected: {} sectors hidden (removable: {})",
            "!".red().bold(),
            report.dco_sectors,
            report.can_remove_dco
        );
    } else {
        println!("{} No DCO detected", "ok".green());
    }
    if let Some(error) = &report.error {
        println!("{} {}", "!".yellow(), error);
    }
}

async fn run_wipe(orchestrator: &WipeOrchestrator, request: WipeRequest) -> Result<()> {
    let device = request.device.clone();
    let classification = orchestrator.classify_device(&device);
    println!(
        "Wiping {} [{}] via '{}' with {} passes",
        device,
        safety_badge(classification.safety),
        request.method,
        request.passes
    );
    for warning in &classification.warnings {
        println!("{} {}", "!".yellow(), warning);
    }

    // Force only suppresses this prompt; the safety gate is not affected
    if !request.force && !confirm(&format!("About to irreversibly erase {device}."))? {
        println!("Aborted.");
        return Ok(());
    }

    let handle = orchestrator.submit(request);
    let mut progress = handle.progress.clone();
    let printer = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let snapshot = progress.borrow().clone();
            println!(
                "[{}] pass {}/{}  {:.1}%  {}/s  elapsed {}",
                snapshot.phase,
                snapshot.current_pass,
                snapshot.total_passes,
                snapshot.percent(),
                human_bytes(snapshot.throughput_bps),
                humantime::format_duration(std::time::Duration::from_secs(
                    snapshot.elapsed_secs as u64
                )),
            );
        }
    });

    let result = handle.wait().await;
    printer.abort();

    println!();
    for line in &result.trail {
        println!("  {line}");
    }
    if result.success {
        println!("{} wipe of {} completed", "OK".green().bold(), result.device);
    } else {
        let kind = result
            .error
            .as_ref()
            .map(|e| e.kind())
            .unwrap_or("Unknown");
        println!(
            "{} wipe of {} ended in state {} ({kind})",
            "FAILED".red().bold(),
            result.device,
            result.reached
        );
        if let Some(error) = &result.error {
            println!("  {error}");
            for suggestion in error.suggestions() {
                println!("  - {suggestion}");
            }
        }
        std::process::exit(1);
    }
    Ok(())
}

/// Convert bytes/sec to a readable string
fn human_bytes(bps: f64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    if bps <= 0.0 {
        return "0B".to_string();
    }
    let mut val = bps;
    let mut i = 0usize;
    while val >= 1024.0 && i + 1 < units.len() {
        val /= 1024.0;
        i += 1;
    }
    format!("{:.2}{}", val, units[i])
}

#[cfg(unix)]
fn setup_signal_handlers() -> Result<()> {
    use signal_hook::consts::SIGINT;
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT])?;
    std::thread::spawn(move || {
        for _ in signals.forever() {
            eprintln!("\nInterrupt received; finishing at the next safe boundary...");
            wipeout::set_interrupted();
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers() -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
fn is_root() -> bool {
    true
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "wipeout=debug".into()),
            )
            .init();
    }

    setup_signal_handlers()?;

    let destructive = matches!(
        &cli.command,
        Commands::Wipe { .. } | Commands::RemoveHpa { .. } | Commands::RemoveDco { .. }
    );
    if destructive && !is_root() {
        eprintln!("Error: this command requires root privileges.");
        std::process::exit(1);
    }

    let orchestrator = build_orchestrator(cli.config.as_deref());

    match cli.command {
        Commands::List { detailed } => list_devices(&orchestrator, detailed)?,
        Commands::Classify { device } => show_classification(&orchestrator, &device),
        Commands::DetectHidden { device } => show_hidden_report(&orchestrator, &device),
        Commands::RemoveHpa { device } => match orchestrator.remove_hpa(&device) {
            Ok(sectors) => println!("HPA removed: {sectors} sectors exposed"),
            Err(e) => {
                eprintln!("HPA removal failed: {e}");
                std::process::exit(1);
            }
        },
        Commands::RemoveDco { device } => {
            if !confirm(&format!(
                "DCO restore on {device} is IRREVERSIBLE and may reduce the device feature set."
            ))? {
                println!("Aborted.");
                return Ok(());
            }
            match orchestrator.remove_dco(&device) {
                Ok(sectors) => println!("DCO restored: {sectors} sectors exposed"),
                Err(e) => {
                    eprintln!("DCO removal failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Wipe {
            device,
            method,
            passes,
            no_verify,
            remove_hpa,
            remove_dco,
            force,
        } => {
            let mut request = WipeRequest::new(device, method);
            request.passes = passes;
            request.verify = !no_verify;
            request.remove_hpa = remove_hpa;
            request.remove_dco = remove_dco;
            request.force = force;
            run_wipe(&orchestrator, request).await?;
        }
    }

    Ok(())
}
