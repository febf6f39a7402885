use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod scan;
mod session;
mod state;

use config::Config;
use error::Result;
use session::Session;
use state::data::{CatalogItem, Tag};

/// Local media library with hierarchical tags
#[derive(Debug, Parser)]
#[command(name = "media-shelf", version, about)]
struct Cli {
    /// Library database file (overrides the config file)
    #[arg(long, global = true, env = "MEDIA_SHELF_DB")]
    db: Option<PathBuf>,

    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan a folder (one level deep) and add new entries
    Add { folder: PathBuf },
    /// List catalog items
    List {
        /// Only items carrying this tag
        #[arg(long)]
        tag: Option<i64>,
        #[arg(long)]
        json: bool,
    },
    /// Remove items whose file or folder no longer exists
    Validate,
    /// Remove all items and associations, keeping tags
    Clear,
    /// Show the tag tree
    Tags {
        #[arg(long)]
        json: bool,
    },
    /// Tag management
    #[command(subcommand)]
    Tag(TagCommand),
    /// Load on-disk details for every item
    Details,
}

#[derive(Debug, Subcommand)]
enum TagCommand {
    Add {
        name: String,
        #[arg(long)]
        parent: Option<i64>,
    },
    Rename { id: i64, name: String },
    /// Delete a tag with all of its descendants
    Delete { id: i64 },
    /// Re-parent a tag; omit --parent to make it a root
    Move {
        id: i64,
        #[arg(long)]
        parent: Option<i64>,
    },
    /// Set a display color; omit it to clear
    Color { id: i64, color: Option<String> },
    Assign { item: i64, tag: i64 },
    Unassign { item: i64, tag: i64 },
    /// Show the tags of one item
    Show { item: i64 },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "media_shelf=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::resolve(cli.db, cli.config.as_deref())?;
    let mut session = Session::start(config).await?;

    match cli.command {
        Command::Add { folder } => {
            let outcome = session.add_folder(&folder).await?;
            println!(
                "Added {} new entries ({} scanned, {} already known).",
                outcome.added,
                outcome.scanned,
                outcome.scanned - outcome.added
            );
            print_items(&session.view().items);
        }
        Command::List { tag, json } => {
            let items = match tag {
                Some(tag_id) => session.items_tagged(tag_id).await?,
                None => session.view().items.clone(),
            };
            if json {
                println!("{}", to_json(&items)?);
            } else {
                print_items(&items);
            }
        }
        Command::Validate => {
            let pruned = session.validate().await?;
            println!("Removed {} missing entries.", pruned);
        }
        Command::Clear => {
            session.clear_library().await?;
            println!("Library cleared. Tags were kept.");
        }
        Command::Tags { json } => {
            if json {
                println!("{}", to_json(&session.view().tags)?);
            } else {
                print_forest(&session.view().tags, 0);
                let total: usize = session.view().tags.iter().map(Tag::subtree_len).sum();
                println!("{} tags.", total);
            }
        }
        Command::Tag(command) => run_tag_command(&mut session, command).await?,
        Command::Details => {
            let (tx, mut rx) = mpsc::channel(64);
            session.load_details(tx);
            while let Some(details) = rx.recv().await {
                println!("{}", to_json(&details)?);
            }
        }
    }

    Ok(())
}

async fn run_tag_command(session: &mut Session, command: TagCommand) -> Result<()> {
    match command {
        TagCommand::Add { name, parent } => {
            let id = session.add_tag(name, parent).await?;
            println!("Created tag {}.", id);
        }
        TagCommand::Rename { id, name } => session.rename_tag(id, name).await?,
        TagCommand::Delete { id } => session.delete_tag(id).await?,
        TagCommand::Move { id, parent } => session.move_tag(id, parent).await?,
        TagCommand::Color { id, color } => session.set_tag_color(id, color).await?,
        TagCommand::Assign { item, tag } => {
            if !session.assign_tag(item, tag).await? {
                println!("Item {} already had tag {}.", item, tag);
            }
        }
        TagCommand::Unassign { item, tag } => {
            if !session.unassign_tag(item, tag).await? {
                println!("Item {} did not have tag {}.", item, tag);
            }
        }
        TagCommand::Show { item } => {
            for tag in session.tags_for_item(item).await? {
                println!("{:>5}  {}", tag.id, tag.name);
            }
            return Ok(());
        }
    }

    print_forest(&session.view().tags, 0);
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn print_items(items: &[CatalogItem]) {
    for item in items {
        let id = item.id.unwrap_or_default();
        if item.is_folder {
            println!("{:>5}  [dir]  {}  ({})", id, item.name, item.path);
        } else {
            println!("{:>5}  {:>10}  {}  ({})", id, item.size, item.name, item.path);
        }
    }
    println!("{} items in library.", items.len());
}

fn print_forest(tags: &[Tag], depth: usize) {
    for tag in tags {
        let color = tag.color.as_deref().map(|c| format!(" {}", c)).unwrap_or_default();
        println!("{}{:>5}  {}{}", "  ".repeat(depth), tag.id, tag.name, color);
        print_forest(&tag.children, depth + 1);
    }
}
