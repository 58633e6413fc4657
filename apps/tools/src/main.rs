use anyhow::Result;
use clap::{Parser, Subcommand};
use controller::{CatalogOp, Codecs, ControllerContext};
use shared::domain::{CatalogKind, Rank, UserId};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/bot.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sets a rank, registering the user first if needed.
    SetRank { user_id: i64, rank: Rank },
    AddCatalog { kind: CatalogKind, name: String },
    RemoveCatalog { kind: CatalogKind, name: String },
    ListCatalog { kind: CatalogKind },
    ListUsers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;
    let context = ControllerContext::new(storage, Codecs::default());
    let mut controller = context.open().await?;

    match cli.command {
        Command::SetRank { user_id, rank } => {
            let user_id = UserId(user_id);
            let user = match controller.find_user(user_id).await? {
                Some(_) => controller.appoint(user_id, rank).await?,
                None => controller.register_user(user_id, rank).await?,
            };
            println!("user_id={} rank={}", user.user_id, user.rank);
        }
        Command::AddCatalog { kind, name } => {
            let entry = controller
                .manage_catalog(kind, &name, CatalogOp::Create)
                .await?;
            println!("created {kind} id={} name={}", entry.id.0, entry.name);
        }
        Command::RemoveCatalog { kind, name } => {
            let entry = controller
                .manage_catalog(kind, &name, CatalogOp::Remove)
                .await?;
            println!("removed {kind} id={} name={}", entry.id.0, entry.name);
        }
        Command::ListCatalog { kind } => {
            for entry in controller.list_catalog(kind).await? {
                println!("{}\t{}", entry.id.0, entry.name);
            }
        }
        Command::ListUsers => {
            for user in controller.list_users().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    user.user_id,
                    user.rank,
                    user.rating,
                    user.full_name()
                );
            }
        }
    }

    controller.commit().await?;
    Ok(())
}
