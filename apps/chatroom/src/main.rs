use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use room_sync::{
    collaborators::FileBlob,
    config::load_settings,
    grouping::DisplayMessage,
    http::RestBackend,
    RoomSynchronizer, SessionContext, SyncCollaborators,
};
use shared::domain::{FallbackIdentity, MemberId, RoomId};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    room_id: String,
    #[arg(long)]
    user_id: String,
    /// Bearer token; falls back to `APP__AUTH_TOKEN` / the settings file.
    #[arg(long)]
    token: Option<String>,
    /// Name shown for senders missing from the member list.
    #[arg(long)]
    target: Option<String>,
    #[arg(long, default_value = "")]
    rank: String,
    /// Files to upload into the room, in order.
    #[arg(long = "upload")]
    uploads: Vec<PathBuf>,
    #[arg(long)]
    leave: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let settings = load_settings();
    settings.validate()?;
    let session = SessionContext {
        local_user: MemberId::new(args.user_id.clone()),
        auth_token: args.token.clone().or_else(|| settings.auth_token.clone()),
    };
    let rest = Arc::new(RestBackend::for_session(&settings.api_base_url, &session)?);

    let fallback = args.target.as_ref().map(|name| FallbackIdentity {
        name: name.clone(),
        rank: args.rank.clone(),
        avatar_url: settings.default_avatar.clone(),
    });
    let sync = RoomSynchronizer::new(session, settings, SyncCollaborators::from_rest(rest));

    let room_id = RoomId::new(args.room_id.clone());
    sync.open_room(&room_id, fallback).await?;

    if let Some(title) = sync.conversation_title(&room_id).await {
        println!("== {title}");
    }
    for row in sync.decorate(&room_id).await {
        println!("{}", render_row(&row));
    }

    if !args.uploads.is_empty() {
        let mut files = Vec::with_capacity(args.uploads.len());
        for path in &args.uploads {
            files.push(read_blob(path).await?);
        }
        let report = sync.upload_files(&room_id, files).await?;
        for failure in &report.failures {
            eprintln!(
                "upload failed: {} ({:?}): {}",
                failure.file_name, failure.stage, failure.reason
            );
        }
        println!("-- files in room");
        for file in &report.file_list {
            println!("{}  {}", file.original_name, file.size_label());
        }
    }

    if args.leave {
        sync.leave_room(&room_id).await?;
        info!(room_id = %room_id, "left room");
    } else {
        sync.close_room(&room_id).await;
    }

    Ok(())
}

fn render_row(row: &DisplayMessage) -> String {
    let message = &row.message;
    if row.is_banner {
        return format!("   --- {} ---", message.content);
    }
    let time = message.send_time.with_timezone(&Local).format("%p %I:%M");
    let who = if row.is_mine {
        "me".to_string()
    } else if row.hide_profile {
        " ".repeat(row.sender_label.chars().count())
    } else {
        row.sender_label.clone()
    };
    match &message.file_url {
        Some(storage_name) => format!("[{time}] {who}: [file] {} ({storage_name})", message.content),
        None => format!("[{time}] {who}: {}", message.content),
    }
}

async fn read_blob(path: &Path) -> Result<FileBlob> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok(FileBlob {
        file_name,
        mime_type: mime_guess::from_path(path).first_raw().map(str::to_string),
        bytes,
    })
}
