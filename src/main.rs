//! Moodfeed command-line client

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use moodfeed::data::{Mood, MoodFilter};
use moodfeed::error::Notice;
use moodfeed::service::{PostDraft, StatusDraft};
use moodfeed::{Session, config};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Moodfeed - mood-tagged social feed client
#[derive(Parser, Debug)]
#[command(name = "moodfeed")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Print Prometheus metrics after the command
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the post feed, newest first
    Feed {
        /// Mood to show, or "all"
        #[arg(long, default_value = "all")]
        mood: String,
    },

    /// Show active statuses
    Statuses,

    /// Publish a post
    Post {
        /// Post text
        content: String,

        #[arg(long, default_value = "love")]
        mood: String,

        /// Hide the author from the feed
        #[arg(long)]
        anonymous: bool,

        #[arg(long)]
        location: Option<String>,

        /// Image, audio or video file to attach
        #[arg(long, requires = "content_type")]
        media: Option<PathBuf>,

        /// MIME type of the attached file
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Share a status for the next 24 hours
    Status {
        /// Up to 10 characters
        #[arg(long)]
        content: Option<String>,

        #[arg(long)]
        emoji: Option<String>,

        #[arg(long)]
        mood: Option<String>,

        /// Audio clip to attach
        #[arg(long, requires = "content_type")]
        audio: Option<PathBuf>,

        /// MIME type of the audio clip
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Like or unlike a post
    Like { post_id: String },

    /// Like or unlike a status
    LikeStatus { status_id: String },

    /// Follow or unfollow a user
    Follow { user_id: String },

    /// List your notes
    Notes,

    /// Show the signed-in user
    Whoami,

    /// End the session
    SignOut,
}

fn init_tracing(format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "moodfeed=info".into());

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report(notice: &Notice) {
    eprintln!("[{:?}] {}: {}", notice.severity, notice.title, notice.description);
}

async fn read_file(path: &PathBuf) -> Result<(String, Vec<u8>)> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok((name, bytes))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = config::AppConfig::load()?;

    // 2. Initialize tracing/logging
    init_tracing(&config.logging.format);

    // 3. Initialize metrics
    moodfeed::metrics::init_metrics();

    // 4. Start session
    let session = Session::from_config(config).await?;
    for notice in session.notices() {
        report(notice);
    }

    let outcome = run(&session, cli.command).await;

    if cli.metrics {
        print!("{}", moodfeed::metrics::render()?);
    }

    match outcome {
        Ok(true) => session.sign_out().await?,
        Ok(false) => session.end(),
        Err(error) => {
            session.end();
            return Err(error);
        }
    }
    Ok(())
}

/// Run one command; `Ok(true)` asks for sign-out
async fn run(session: &Session, command: Commands) -> Result<bool> {
    match command {
        Commands::Feed { mood } => {
            let filter = MoodFilter::parse(&mood)?;
            let refresh = session.refresh_feed(filter).await;
            if let Some(notice) = &refresh.listing.notice {
                report(notice);
            }
            print_json(&refresh.listing.items)?;
        }
        Commands::Statuses => {
            let listing = session.statuses.list_active_statuses().await;
            if let Some(notice) = &listing.notice {
                report(notice);
            }
            print_json(&listing.items)?;
        }
        Commands::Post {
            content,
            mood,
            anonymous,
            location,
            media,
            content_type,
        } => {
            let mut draft = PostDraft::new(content, Mood::parse(&mood)?);
            draft.is_anonymous = anonymous;
            draft.location = location;
            if let (Some(path), Some(content_type)) = (media, content_type) {
                let (name, bytes) = read_file(&path).await?;
                let media = session
                    .media
                    .upload(&name, &content_type, bytes)
                    .await
                    .inspect_err(|error| report(&error.notice()))?;
                draft = draft.with_media(media);
            }
            let (_, display) = session
                .composer
                .publish(draft)
                .await
                .inspect_err(|error| report(&error.notice()))?;
            print_json(&display)?;
        }
        Commands::Status {
            content,
            emoji,
            mood,
            audio,
            content_type,
        } => {
            let mut draft = StatusDraft {
                content,
                emoji,
                mood: mood.as_deref().map(Mood::parse).transpose()?,
                audio: None,
            };
            if let (Some(path), Some(content_type)) = (audio, content_type) {
                let (name, bytes) = read_file(&path).await?;
                draft.audio = Some(
                    session
                        .media
                        .upload_audio(&name, &content_type, bytes)
                        .await
                        .inspect_err(|error| report(&error.notice()))?,
                );
            }
            let status = session
                .statuses
                .create_status(draft)
                .await
                .inspect_err(|error| report(&error.notice()))?;
            print_json(&status)?;
        }
        Commands::Like { post_id } => {
            let state = session
                .toggle_post_like(&post_id)
                .await
                .inspect_err(|error| report(&error.notice()))?;
            println!("liked={} count={}", state.liked, state.like_count);
        }
        Commands::LikeStatus { status_id } => {
            let state = session
                .statuses
                .toggle_like(&status_id)
                .await
                .inspect_err(|error| report(&error.notice()))?;
            println!("liked={} count={}", state.liked, state.like_count);
        }
        Commands::Follow { user_id } => {
            let following = session
                .toggle_follow(&user_id)
                .await
                .inspect_err(|error| report(&error.notice()))?;
            println!("following={following}");
        }
        Commands::Notes => {
            let notes = session
                .notes
                .list()
                .await
                .inspect_err(|error| report(&error.notice()))?;
            print_json(&notes)?;
        }
        Commands::Whoami => match session.viewer() {
            Some(user) => {
                let stats = session.profiles.follow_stats(&user.id).await?;
                print_json(&serde_json::json!({ "user": user, "follow_stats": stats }))?;
            }
            None => println!("Not signed in"),
        },
        Commands::SignOut => return Ok(true),
    }
    Ok(false)
}
