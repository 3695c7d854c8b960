use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tafel_designer::app::Remixer;
use tafel_designer::composer::load_sources;
use tafel_designer::models::{Config, GenerationOutcome, LegCount, SourceImage, TableSelection};
use tafel_designer::{server, Error};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "tafel-designer")]
#[command(about = "Remix images into custom table designs using Gemini")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Remix 1-5 images into a new image.
    Remix(RemixArgs),
    /// Run the HTTP API.
    Serve {
        /// Address to bind, overrides BIND_ADDR.
        #[arg(long)]
        bind: Option<String>,
    },
}

#[derive(Debug, clap::Args)]
struct RemixArgs {
    /// Input image; repeat for multiple images (1-5).
    #[arg(short = 'i', long = "image", required = true)]
    images: Vec<PathBuf>,

    /// Instruction for the model. Three images without a prompt run the table workflow.
    #[arg(long)]
    prompt: Option<String>,

    /// Room photo appended as a fourth image; only used with exactly 3 input images.
    #[arg(short = 'r', long)]
    room_image: Option<PathBuf>,

    /// Number of table legs.
    #[arg(long, value_parser = parse_legs_arg)]
    legs: Option<LegCount>,

    /// Directory to save the remixed images, overrides OUTPUT_DIR.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn parse_legs_arg(input: &str) -> std::result::Result<LegCount, String> {
    input.parse().map_err(|e: Error| e.to_string())
}

/// What a `remix` invocation will send.
enum RemixPlan {
    Table(TableSelection),
    Freeform {
        images: Vec<SourceImage>,
        prompt: Option<String>,
    },
}

async fn plan_remix(args: &RemixArgs) -> tafel_designer::Result<RemixPlan> {
    let room = match &args.room_image {
        Some(path) if args.images.len() != 3 => {
            warn!(
                "--room-image is designed for the 3-image table workflow (vorm, onderstel, kleur), got {} image(s). Ignoring {}",
                args.images.len(),
                path.display()
            );
            None
        }
        Some(path) if !path.exists() => {
            warn!("Room image not found: {}", path.display());
            None
        }
        Some(path) => {
            info!("Adding room image: {}", path.display());
            Some(SourceImage::from_path(path).await?)
        }
        None => None,
    };

    let mut sources = load_sources(&args.images).await?;
    if args.prompt.is_some() || sources.len() != 3 {
        sources.extend(room);
        return Ok(RemixPlan::Freeform {
            images: sources,
            prompt: args.prompt.clone(),
        });
    }

    let finish = sources.remove(2);
    let base = sources.remove(1);
    let shape = sources.remove(0);

    Ok(RemixPlan::Table(TableSelection {
        shape,
        base,
        finish,
        room,
        legs: args.legs,
    }))
}

async fn run_remix(config: Config, args: RemixArgs) -> tafel_designer::Result<GenerationOutcome> {
    let config = Config {
        output_dir: args.output_dir.clone().unwrap_or(config.output_dir),
        ..config
    };
    let remixer = Remixer::new(&config)?;

    match plan_remix(&args).await? {
        RemixPlan::Table(selection) => remixer.generate_table(selection).await,
        RemixPlan::Freeform { images, prompt } => remixer.generate_freeform(images, prompt).await,
    }
}

fn report_outcome(outcome: &GenerationOutcome, output_dir: &Path) {
    for artifact in &outcome.artifacts {
        println!("{}", output_dir.join(artifact).display());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tafel_designer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();
    let config = Config::from_env()?;

    let result = match args.command {
        Command::Remix(remix_args) => {
            let output_dir = remix_args
                .output_dir
                .clone()
                .unwrap_or_else(|| config.output_dir.clone());
            run_remix(config, remix_args)
                .await
                .map(|outcome| report_outcome(&outcome, &output_dir))
        }
        Command::Serve { bind } => {
            let config = Config {
                bind_addr: bind.unwrap_or(config.bind_addr),
                ..config
            };
            server::serve(&config).await
        }
    };

    match result {
        Ok(()) => Ok(()),
        Err(Error::Configuration(msg)) => {
            error!("{}", msg);
            error!("Set GEMINI_API_KEY in your environment or in a .env file.");
            std::process::exit(1);
        }
        Err(e) => {
            error!("Failed: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(images: Vec<PathBuf>) -> RemixArgs {
        RemixArgs {
            images,
            prompt: None,
            room_image: None,
            legs: None,
            output_dir: None,
        }
    }

    fn write_images(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|name| {
                let path = dir.join(name);
                std::fs::write(&path, [0x89, 0x50, 0x4E, 0x47]).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_parse_legs_arg() {
        assert_eq!(parse_legs_arg("3").unwrap(), LegCount::Three);
        assert!(parse_legs_arg("7").unwrap_err().contains("2, 3, 4"));
    }

    #[test]
    fn test_cli_requires_images() {
        assert!(CliArgs::try_parse_from(["tafel-designer", "remix"]).is_err());
        let parsed = CliArgs::try_parse_from([
            "tafel-designer",
            "remix",
            "-i",
            "a.png",
            "-i",
            "b.png",
            "--legs",
            "4",
        ])
        .unwrap();
        match parsed.command {
            Command::Remix(remix) => {
                assert_eq!(remix.images.len(), 2);
                assert_eq!(remix.legs, Some(LegCount::Four));
            }
            Command::Serve { .. } => panic!("expected remix"),
        }
    }

    #[tokio::test]
    async fn test_three_images_with_room_plan_table() {
        let dir = tempfile::tempdir().unwrap();
        let images = write_images(dir.path(), &["vorm.png", "onderstel.png", "kleur.png"]);
        let room = write_images(dir.path(), &["kamer.png"]).remove(0);

        let mut remix = args(images);
        remix.room_image = Some(room);
        remix.legs = Some(LegCount::Two);

        match plan_remix(&remix).await.unwrap() {
            RemixPlan::Table(selection) => {
                assert_eq!(selection.shape.name, "vorm.png");
                assert_eq!(selection.finish.name, "kleur.png");
                assert_eq!(selection.room.unwrap().name, "kamer.png");
                assert_eq!(selection.legs, Some(LegCount::Two));
            }
            RemixPlan::Freeform { .. } => panic!("expected table plan"),
        }
    }

    #[tokio::test]
    async fn test_missing_room_image_falls_back_to_showroom() {
        let dir = tempfile::tempdir().unwrap();
        let mut remix = args(write_images(dir.path(), &["a.png", "b.png", "c.png"]));
        remix.room_image = Some(dir.path().join("missing.png"));

        match plan_remix(&remix).await.unwrap() {
            RemixPlan::Table(selection) => assert!(selection.room.is_none()),
            RemixPlan::Freeform { .. } => panic!("expected table plan"),
        }
    }

    #[tokio::test]
    async fn test_room_image_ignored_for_other_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mut remix = args(write_images(dir.path(), &["a.png", "b.png"]));
        remix.room_image = Some(write_images(dir.path(), &["kamer.png"]).remove(0));

        match plan_remix(&remix).await.unwrap() {
            RemixPlan::Freeform { images, prompt } => {
                assert_eq!(images.len(), 2);
                assert!(prompt.is_none());
            }
            RemixPlan::Table(_) => panic!("expected freeform plan"),
        }
    }

    #[tokio::test]
    async fn test_prompt_overrides_table_workflow() {
        let dir = tempfile::tempdir().unwrap();
        let mut remix = args(write_images(dir.path(), &["a.png", "b.png", "c.png"]));
        remix.prompt = Some("Stack them".to_string());

        assert!(matches!(
            plan_remix(&remix).await.unwrap(),
            RemixPlan::Freeform { .. }
        ));
    }

    #[tokio::test]
    async fn test_prompt_with_room_image_sends_four_images() {
        let dir = tempfile::tempdir().unwrap();
        let mut remix = args(write_images(dir.path(), &["a.png", "b.png", "c.png"]));
        remix.room_image = Some(write_images(dir.path(), &["kamer.png"]).remove(0));
        remix.prompt = Some("Put it by the window".to_string());

        match plan_remix(&remix).await.unwrap() {
            RemixPlan::Freeform { images, prompt } => {
                let names: Vec<&str> = images.iter().map(|i| i.name.as_str()).collect();
                assert_eq!(names, ["a.png", "b.png", "c.png", "kamer.png"]);
                assert_eq!(prompt.as_deref(), Some("Put it by the window"));
            }
            RemixPlan::Table(_) => panic!("expected freeform plan"),
        }
    }
}
