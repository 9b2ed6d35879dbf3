// CLI layer: subcommand definitions and the user-facing flows. Each
// subcommand fetches its own fresh access token, performs one API call
// through `ApiClient` and prints the result.

use crate::api::{ApiClient, Article, Credentials};
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

/// WeChat Official Account publishing tool.
#[derive(Parser)]
#[command(name = "wechat-mp", version, about = "Create, upload and publish WeChat Official Account content")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Fetch a fresh access token and print the bare token to stdout
    GetAccessToken,
    /// Create an article draft from a JSON file
    CreateArticle {
        /// Path to the article JSON file
        #[arg(long, value_name = "PATH")]
        article: PathBuf,
    },
    /// Upload a local image and print its media id and URL
    UploadImage {
        /// Path to the image file
        #[arg(long, value_name = "PATH")]
        file: PathBuf,
    },
    /// Send a previously created draft to all subscribers
    PublishArticle {
        /// Media id of an existing draft
        #[arg(
            long,
            value_name = "ID",
            conflicts_with = "article",
            required_unless_present = "article"
        )]
        media_id: Option<String>,
        /// Path to an article JSON file; the draft is created first
        #[arg(long, value_name = "PATH")]
        article: Option<PathBuf>,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

/// Dispatch a parsed command against the API client.
pub fn run(api: ApiClient, command: Command) -> Result<()> {
    match command {
        Command::GetAccessToken => {
            // No spinner here: stdout must carry the token and nothing else
            // so the output stays machine-consumable.
            let credentials = Credentials::from_env()?;
            let token = api.fetch_access_token(&credentials)?;
            println!("{}", token);
        }
        Command::CreateArticle { article } => {
            let credentials = Credentials::from_env()?;
            let media_id = create_draft_flow(&api, &credentials, &article)?;
            println!("Article draft created successfully!");
            println!("Media ID: {}", media_id);
            println!("Use this media_id to publish the article.");
        }
        Command::UploadImage { file } => {
            if !file.exists() {
                bail!("image file does not exist: {}", file.display());
            }
            let credentials = Credentials::from_env()?;
            let spinner = spinner("Uploading...");
            let result = api
                .fetch_access_token(&credentials)
                .and_then(|token| api.upload_image(&token, &file));
            spinner.finish_and_clear();
            let upload = result?;
            println!("Image uploaded successfully!");
            println!("Media ID: {}", upload.media_id);
            println!("URL: {}", upload.url);
        }
        Command::PublishArticle {
            media_id,
            article,
            yes,
        } => {
            let credentials = Credentials::from_env()?;
            let media_id = match (media_id, article) {
                (Some(id), _) => id,
                (None, Some(path)) => {
                    let id = create_draft_flow(&api, &credentials, &path)?;
                    println!("Using created media_id: {}", id);
                    id
                }
                // clap enforces one of the two; kept as a guard.
                (None, None) => bail!("either --media-id or --article is required"),
            };
            if !yes {
                let proceed = Confirm::new()
                    .with_prompt("Send this article to ALL subscribers?")
                    .default(false)
                    .interact()?;
                if !proceed {
                    println!("Aborted.");
                    return Ok(());
                }
            }
            let spinner = spinner("Publishing...");
            let result = api
                .fetch_access_token(&credentials)
                .and_then(|token| api.mass_send(&token, &media_id));
            spinner.finish_and_clear();
            let msg_id = result?;
            println!("Article published successfully!");
            println!("Message ID: {}", msg_id);
            println!("Note: for subscription accounts the send happens immediately.");
        }
    }
    Ok(())
}

/// Load and validate an article file, then create the draft. Validation
/// happens before any network traffic, including the token fetch.
fn create_draft_flow(api: &ApiClient, credentials: &Credentials, path: &Path) -> Result<String> {
    let article = Article::from_file(path)?;
    article.validate()?;
    let spinner = spinner("Creating draft...");
    let result = api
        .fetch_access_token(credentials)
        .and_then(|token| api.create_draft(&token, &article));
    spinner.finish_and_clear();
    result
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner} {msg}").unwrap());
    pb.set_message(msg.to_string());
    pb
}
