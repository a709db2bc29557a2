use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::anyhow;
use chrono::DateTime;
use dotenvy::dotenv;
use tracing::{error, info, warn};

mod config;
mod db;
mod error;
mod pipeline;
mod providers;
mod utils;

use config::Config;
use db::CaptureStore;
use pipeline::{run_capture, CaptureRequest};
use providers::{NarrativeClient, StabilityClient};
use utils::logging::init_logging;
use utils::timing::RunTimer;

/// Exit status for a missing input photo, distinguishable from the generic
/// failure status so the kiosk shell can tell the two apart.
const EXIT_MISSING_IMAGE: u8 = 2;

fn usage() -> &'static str {
    "Usage: past_lives_booth --image <path> --profession <text> --age <years> --db <path>\n\
     \x20      past_lives_booth list --db <path> [--limit <n>] [--json]\n\
     \x20      past_lives_booth show --db <path> --id <n> [--out <dir>]"
}

#[derive(Debug, PartialEq)]
struct ListArgs {
    db_path: PathBuf,
    limit: i64,
    json: bool,
}

#[derive(Debug, PartialEq)]
struct ShowArgs {
    db_path: PathBuf,
    id: i64,
    out_dir: Option<PathBuf>,
}

fn flag_value<'a>(args: &'a [String], index: &mut usize, flag: &str) -> anyhow::Result<&'a str> {
    *index += 1;
    args.get(*index)
        .map(|value| value.as_str())
        .ok_or_else(|| anyhow!("Missing value for {flag}"))
}

fn parse_capture_args(args: &[String]) -> anyhow::Result<CaptureRequest> {
    let mut image_path: Option<PathBuf> = None;
    let mut profession: Option<String> = None;
    let mut age: Option<i64> = None;
    let mut db_path: Option<PathBuf> = None;

    let mut index = 1;
    while index < args.len() {
        match args[index].as_str() {
            "--image" => {
                image_path = Some(PathBuf::from(flag_value(args, &mut index, "--image")?));
            }
            "--profession" => {
                profession = Some(flag_value(args, &mut index, "--profession")?.to_string());
            }
            "--age" => {
                let value = flag_value(args, &mut index, "--age")?;
                age = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| anyhow!("Invalid --age value: {value}"))?,
                );
            }
            "--db" => {
                db_path = Some(PathBuf::from(flag_value(args, &mut index, "--db")?));
            }
            "--help" | "-h" => {
                return Err(anyhow!(usage()));
            }
            other => {
                return Err(anyhow!("Unknown argument: {other}\n{}", usage()));
            }
        }
        index += 1;
    }

    Ok(CaptureRequest {
        image_path: image_path.ok_or_else(|| anyhow!("--image is required\n{}", usage()))?,
        profession: profession.ok_or_else(|| anyhow!("--profession is required\n{}", usage()))?,
        age: age.ok_or_else(|| anyhow!("--age is required\n{}", usage()))?,
        db_path: db_path.ok_or_else(|| anyhow!("--db is required\n{}", usage()))?,
    })
}

fn parse_list_args(args: &[String]) -> anyhow::Result<ListArgs> {
    let mut db_path: Option<PathBuf> = None;
    let mut limit = 20i64;
    let mut json = false;

    let mut index = 2;
    while index < args.len() {
        match args[index].as_str() {
            "--db" => {
                db_path = Some(PathBuf::from(flag_value(args, &mut index, "--db")?));
            }
            "--limit" => {
                let value = flag_value(args, &mut index, "--limit")?;
                limit = value
                    .parse::<i64>()
                    .map_err(|_| anyhow!("Invalid --limit value: {value}"))?
                    .max(1);
            }
            "--json" => {
                json = true;
            }
            other => {
                return Err(anyhow!("Unknown list argument: {other}\n{}", usage()));
            }
        }
        index += 1;
    }

    Ok(ListArgs {
        db_path: db_path.ok_or_else(|| anyhow!("--db is required\n{}", usage()))?,
        limit,
        json,
    })
}

fn parse_show_args(args: &[String]) -> anyhow::Result<ShowArgs> {
    let mut db_path: Option<PathBuf> = None;
    let mut id: Option<i64> = None;
    let mut out_dir: Option<PathBuf> = None;

    let mut index = 2;
    while index < args.len() {
        match args[index].as_str() {
            "--db" => {
                db_path = Some(PathBuf::from(flag_value(args, &mut index, "--db")?));
            }
            "--id" => {
                let value = flag_value(args, &mut index, "--id")?;
                id = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| anyhow!("Invalid --id value: {value}"))?,
                );
            }
            "--out" => {
                out_dir = Some(PathBuf::from(flag_value(args, &mut index, "--out")?));
            }
            other => {
                return Err(anyhow!("Unknown show argument: {other}\n{}", usage()));
            }
        }
        index += 1;
    }

    Ok(ShowArgs {
        db_path: db_path.ok_or_else(|| anyhow!("--db is required\n{}", usage()))?,
        id: id.ok_or_else(|| anyhow!("--id is required\n{}", usage()))?,
        out_dir,
    })
}

fn format_timestamp(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|moment| moment.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn blob_extension(bytes: &[u8]) -> &'static str {
    infer::get(bytes).map(|kind| kind.extension()).unwrap_or("bin")
}

async fn run_capture_mode(config: &Config, args: &[String]) -> anyhow::Result<ExitCode> {
    let request = parse_capture_args(args)?;

    if !request.image_path.exists() {
        error!("input image not found: {}", request.image_path.display());
        eprintln!("ERROR: image not found: {}", request.image_path.display());
        return Ok(ExitCode::from(EXIT_MISSING_IMAGE));
    }

    if config.narrative_api_key.trim().is_empty() {
        return Err(anyhow!("NARRATIVE_API_KEY is required for a capture run"));
    }
    if config.stability_api_key.trim().is_empty() {
        return Err(anyhow!("STABILITY_API_KEY is required for a capture run"));
    }
    if request.profession.trim().is_empty() {
        warn!("profession is empty; prompts will carry a blank profession");
    }

    let narrative = NarrativeClient::new(config);
    let transformer = StabilityClient::new(config);

    let mut timer = RunTimer::start(&request.profession, request.age);
    match run_capture(&narrative, &transformer, &request).await {
        Ok(id) => {
            timer.complete("success", Some(format!("capture_id={id}")));
            println!("Saved capture #{id}");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            timer.complete("error", Some(err.to_string()));
            Err(err.into())
        }
    }
}

async fn run_list_mode(args: &[String]) -> anyhow::Result<ExitCode> {
    let list = parse_list_args(args)?;
    if !list.db_path.exists() {
        return Err(anyhow!("record store not found: {}", list.db_path.display()));
    }

    let store = CaptureStore::connect(&list.db_path).await?;
    let summaries = store.list_captures(list.limit).await?;
    let total = store.count_captures().await?;
    store.close().await;

    if list.json {
        for summary in &summaries {
            println!("{}", serde_json::to_string(summary)?);
        }
        return Ok(ExitCode::SUCCESS);
    }

    for summary in &summaries {
        let preview: String = summary.description.chars().take(60).collect();
        println!(
            "#{:<5} {}  original={}B edited={}B  {}",
            summary.id,
            format_timestamp(summary.timestamp),
            summary.original_bytes,
            summary.edited_bytes,
            preview
        );
    }
    println!("{} capture(s) total", total);
    Ok(ExitCode::SUCCESS)
}

async fn run_show_mode(args: &[String]) -> anyhow::Result<ExitCode> {
    let show = parse_show_args(args)?;
    if !show.db_path.exists() {
        return Err(anyhow!("record store not found: {}", show.db_path.display()));
    }

    let store = CaptureStore::connect(&show.db_path).await?;
    let row = store.fetch_capture(show.id).await?;
    store.close().await;

    let Some(capture) = row else {
        return Err(anyhow!("no capture found with id {}", show.id));
    };

    println!("Capture #{}", capture.id);
    println!("Taken:       {}", format_timestamp(capture.timestamp));
    println!("Original:    {} bytes", capture.original_image.len());
    println!("Edited:      {} bytes", capture.edited_image.len());
    println!("Description:\n{}", capture.description);

    if let Some(out_dir) = show.out_dir {
        std::fs::create_dir_all(&out_dir)?;
        let original_path = out_dir.join(format!(
            "capture-{}-original.{}",
            capture.id,
            blob_extension(&capture.original_image)
        ));
        let edited_path = out_dir.join(format!(
            "capture-{}-edited.{}",
            capture.id,
            blob_extension(&capture.edited_image)
        ));
        std::fs::write(&original_path, &capture.original_image)?;
        std::fs::write(&edited_path, &capture.edited_image)?;
        info!(
            "wrote {} and {}",
            original_path.display(),
            edited_path.display()
        );
        println!("Wrote {}", original_path.display());
        println!("Wrote {}", edited_path.display());
    }

    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };
    let _guards = init_logging(&config.log_level);

    let args: Vec<String> = env::args().collect();
    let result = match args.get(1).map(|mode| mode.as_str()) {
        Some("list") => run_list_mode(&args).await,
        Some("show") => run_show_mode(&args).await,
        None => Err(anyhow!(usage())),
        _ => run_capture_mode(&config, &args).await,
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            error!("run failed: {err:#}");
            eprintln!("ERROR: {err}");
            for cause in err.chain().skip(1) {
                eprintln!("  caused by: {cause}");
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|part| part.to_string()).collect()
    }

    #[test]
    fn capture_args_parse_all_four_flags() {
        let args = to_args(&[
            "past_lives_booth",
            "--image",
            "photo.jpg",
            "--profession",
            "blacksmith",
            "--age",
            "47",
            "--db",
            "captures.db",
        ]);
        let request = parse_capture_args(&args).unwrap();
        assert_eq!(request.image_path, PathBuf::from("photo.jpg"));
        assert_eq!(request.profession, "blacksmith");
        assert_eq!(request.age, 47);
        assert_eq!(request.db_path, PathBuf::from("captures.db"));
    }

    #[test]
    fn capture_args_accept_negative_age() {
        let args = to_args(&[
            "past_lives_booth",
            "--image",
            "p.jpg",
            "--profession",
            "sailor",
            "--age",
            "-1",
            "--db",
            "c.db",
        ]);
        assert_eq!(parse_capture_args(&args).unwrap().age, -1);
    }

    #[test]
    fn capture_args_require_every_flag() {
        let args = to_args(&["past_lives_booth", "--image", "p.jpg"]);
        let err = parse_capture_args(&args).unwrap_err().to_string();
        assert!(err.contains("--profession is required"));
    }

    #[test]
    fn capture_args_reject_non_integer_age() {
        let args = to_args(&[
            "past_lives_booth",
            "--image",
            "p.jpg",
            "--profession",
            "x",
            "--age",
            "old",
            "--db",
            "c.db",
        ]);
        let err = parse_capture_args(&args).unwrap_err().to_string();
        assert!(err.contains("Invalid --age"));
    }

    #[test]
    fn list_args_default_limit_and_json() {
        let args = to_args(&["past_lives_booth", "list", "--db", "c.db"]);
        let list = parse_list_args(&args).unwrap();
        assert_eq!(list.limit, 20);
        assert!(!list.json);
    }

    #[test]
    fn show_args_parse_id_and_out() {
        let args = to_args(&[
            "past_lives_booth",
            "show",
            "--db",
            "c.db",
            "--id",
            "7",
            "--out",
            "exports",
        ]);
        let show = parse_show_args(&args).unwrap();
        assert_eq!(show.id, 7);
        assert_eq!(show.out_dir, Some(PathBuf::from("exports")));
    }

    #[test]
    fn unknown_flag_is_rejected_with_usage() {
        let args = to_args(&["past_lives_booth", "--bogus"]);
        let err = parse_capture_args(&args).unwrap_err().to_string();
        assert!(err.contains("Unknown argument"));
        assert!(err.contains("Usage:"));
    }
}
