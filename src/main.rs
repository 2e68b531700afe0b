use anyhow::{bail, Context, Result};
use forensicflow_intake::api::{HttpIntakeClient, IntakeApi};
use forensicflow_intake::config::{ensure_logs_dir, get_logs_dir, load_config};
use forensicflow_intake::events::{IntakeEvent, IntakeEventPayload};
use forensicflow_intake::logging::{init_logging, read_activity_log};
use forensicflow_intake::upload_queue::{
    resolve_status, CaseId, FileType, IntakeSnapshot, LifecycleController,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

const USAGE: &str = "Usage:
  forensicflow-intake upload <case_id> --type <UFDR|JSON|XML|CSV|PDF|Image> <file>...
  forensicflow-intake status <case_id>
  forensicflow-intake log [max_lines]";

const DEFAULT_LOG_LINES: usize = 50;

#[derive(Debug, PartialEq)]
struct UploadArgs {
    case_id: CaseId,
    file_type: FileType,
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    ensure_logs_dir()?;
    let logs_dir = get_logs_dir()?;
    if let Err(e) = init_logging(&logs_dir) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match command.as_str() {
        "upload" => run_upload(parse_upload_args(&args[1..])?).await,
        "status" => run_status(parse_case_id(args.get(1))?).await,
        "log" => run_log(&logs_dir, args.get(1)),
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
}

fn parse_case_id(arg: Option<&String>) -> Result<CaseId> {
    let raw = arg.context("Missing <case_id>")?;
    raw.parse::<CaseId>()
        .with_context(|| format!("Invalid case id: {}", raw))
}

fn parse_upload_args(args: &[String]) -> Result<UploadArgs> {
    let case_id = parse_case_id(args.first())?;
    let mut file_type = None;
    let mut files = Vec::new();

    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--type" | "-t" => {
                let value = rest.next().context("--type needs a value")?;
                let parsed = FileType::from_str(value)
                    .with_context(|| format!("Unknown file type: {}", value))?;
                file_type = Some(parsed);
            }
            _ => files.push(PathBuf::from(arg)),
        }
    }

    let file_type = file_type.context("Missing --type")?;
    if files.is_empty() {
        bail!("No files given\n\n{}", USAGE);
    }

    Ok(UploadArgs {
        case_id,
        file_type,
        files,
    })
}

async fn run_upload(args: UploadArgs) -> Result<()> {
    let config = load_config().context("Failed to load configuration")?;
    let client = HttpIntakeClient::new(&config)?;
    let controller =
        LifecycleController::new(args.case_id, Arc::new(client), config.poll_settings());
    let mut rx = controller.subscribe();

    controller.open();
    for rejected in controller.add_paths(&args.files).await {
        eprintln!("✗ {}: {}", rejected.file_name, rejected.reason);
    }
    if controller.queue().is_empty() {
        bail!("No valid files to upload");
    }

    let submitted = tokio::select! {
        result = controller.submit(args.file_type) => result,
        _ = tokio::signal::ctrl_c() => {
            println!("Interrupted, closing");
            controller.close();
            return Ok(());
        }
    };

    let outcome = match submitted {
        Ok(outcome) => outcome,
        Err(e) => {
            print_snapshot(&controller.snapshot());
            controller.close();
            return Err(e).context("Upload failed");
        }
    };

    if outcome.assigned_ids.is_empty() {
        print_snapshot(&controller.snapshot());
        controller.close();
        bail!("No file was accepted by the server");
    }

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(event) => {
                    print_event(&event);
                    if event.ends_polling() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    eprintln!("(skipped {} events)", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted, closing");
                break;
            }
        }
    }

    print_snapshot(&controller.snapshot());
    controller.close();
    Ok(())
}

async fn run_status(case_id: CaseId) -> Result<()> {
    let config = load_config().context("Failed to load configuration")?;
    let client = HttpIntakeClient::new(&config)?;
    let response = client.fetch_status(case_id).await?;

    if response.files.is_empty() {
        println!("No files for case {}", case_id);
        return Ok(());
    }

    println!("{:>8}  {:<12}  {}", "ID", "STATUS", "SERVER STATUS");
    for record in &response.files {
        println!(
            "{:>8}  {:<12}  {}",
            record.id,
            resolve_status(record).to_string(),
            record.status_str()
        );
    }
    Ok(())
}

fn run_log(logs_dir: &Path, max_lines: Option<&String>) -> Result<()> {
    let max_lines = match max_lines {
        Some(raw) => raw
            .parse::<usize>()
            .with_context(|| format!("Invalid line count: {}", raw))?,
        None => DEFAULT_LOG_LINES,
    };

    for entry in read_activity_log(logs_dir, Some(max_lines))? {
        println!(
            "{} [{}] {}: {}",
            entry.timestamp, entry.level, entry.component, entry.message
        );
    }
    Ok(())
}

fn print_event(event: &IntakeEvent) {
    match &event.payload {
        IntakeEventPayload::FilesAdded { count } => println!("• {} file(s) queued", count),
        IntakeEventPayload::UploadComplete { uploaded, failed } => {
            println!("📤 Upload finished: {} accepted, {} failed", uploaded, failed)
        }
        IntakeEventPayload::StatusMerged { tick, changed } => {
            if *changed > 0 {
                println!("🔄 Poll #{}: {} file(s) changed", tick, changed);
            }
        }
        IntakeEventPayload::ProcessingComplete {
            completed,
            failed,
            queued,
        } => println!(
            "✓ Processing finished: {} completed, {} failed, {} queued",
            completed, failed, queued
        ),
        IntakeEventPayload::PollingAbandoned { reason } => {
            println!("⚠️ Stopped polling: {}", reason)
        }
        IntakeEventPayload::Reset => {}
    }
}

fn print_snapshot(snapshot: &IntakeSnapshot) {
    println!();
    println!(
        "{:<40}  {:<11}  {:>4}  {:>8}  {}",
        "FILE", "STATUS", "%", "ID", "ERROR"
    );
    for item in &snapshot.items {
        println!(
            "{:<40}  {:<11}  {:>4}  {:>8}  {}",
            item.file_name(),
            item.status.to_string(),
            item.progress,
            item.id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
            item.error.as_deref().unwrap_or("")
        );
    }
    if let Some(banner) = &snapshot.error_banner {
        println!("\nErrors: {}", banner);
    }
}
