use std::process;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;

use littlelemon_lib::categories::display_label;
use littlelemon_lib::config::AppConfig;
use littlelemon_lib::profile::{NotificationPrefs, Profile};
use littlelemon_lib::state::AppState;
use littlelemon_lib::AppError;

/// Exit code when the menu table cannot be created.
const STARTUP_EXIT_CODE: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "littlelemon", about = "Little Lemon menu and profile", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Browse and maintain the cached menu.
    #[command(subcommand)]
    Menu(MenuCommand),
    /// Inspect and edit the stored user profile.
    #[command(subcommand)]
    Profile(ProfileCommand),
}

#[derive(Debug, Subcommand)]
enum MenuCommand {
    /// List dishes, optionally filtered by category and name.
    List {
        /// Restrict to these categories (repeatable).
        #[arg(long = "category", short = 'c')]
        categories: Vec<String>,
        /// Substring to look for in dish names.
        #[arg(long, short = 's', default_value = "")]
        search: String,
        #[arg(long)]
        json: bool,
    },
    /// Show the selectable categories.
    Categories {
        #[arg(long)]
        json: bool,
    },
    /// Delete every cached dish and fetch the menu again.
    Reset,
    /// Report where the cache lives and how many rows it holds.
    Status {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
enum ProfileCommand {
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Store the first name and email captured during onboarding.
    Onboard {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        email: String,
    },
    /// Replace the full profile.
    Set(ProfileArgs),
    /// Clear every stored profile field.
    Logout,
}

#[derive(Debug, Args)]
struct ProfileArgs {
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    phone: String,
    #[arg(long)]
    image: Option<String>,
    #[arg(long)]
    order_status: bool,
    #[arg(long)]
    password_change: bool,
    #[arg(long)]
    special_offers: bool,
    #[arg(long)]
    newsletter: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err}");
            process::exit(1);
        }
    };

    let _log_guard = match config.log_dir.as_deref() {
        Some(dir) => match littlelemon_lib::logging::init_logging_with_file(dir) {
            Ok(guard) => Some(guard),
            Err(err) => {
                littlelemon_lib::init_logging();
                tracing::warn!(target: "littlelemon", event = "file_logging_unavailable", error = %err);
                None
            }
        },
        None => {
            littlelemon_lib::init_logging();
            None
        }
    };

    match handle_cli(cli.command, config).await {
        Ok(code) => process::exit(code),
        Err(err) => {
            if let Some(app) = err.downcast_ref::<AppError>() {
                if app.is_startup() {
                    eprintln!("Error: {app}");
                    process::exit(STARTUP_EXIT_CODE);
                }
            }
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    }
}

async fn handle_cli(command: Commands, config: AppConfig) -> Result<i32> {
    let state = AppState::open(config)
        .await
        .context("open application state")?;
    let result = match command {
        Commands::Menu(menu) => handle_menu_command(&state, menu).await,
        Commands::Profile(profile) => handle_profile_command(&state, profile),
    };
    state.close().await;
    result
}

async fn handle_menu_command(state: &AppState, command: MenuCommand) -> Result<i32> {
    match command {
        MenuCommand::List {
            categories,
            search,
            json,
        } => {
            state.menu.start().await?;
            if !categories.is_empty() || !search.is_empty() {
                state.menu.set_categories(categories);
                state.menu.set_search_text(search);
                state.menu.refresh_now().await;
            }
            let view = state.menu.view();
            if let Some(err) = view.error {
                return Err(err.into());
            }
            if json {
                let base = &state.config.image_base_url;
                let rows: Vec<_> = view
                    .dishes
                    .iter()
                    .map(|dish| {
                        json!({
                            "id": dish.id,
                            "name": dish.name,
                            "price": dish.price,
                            "description": dish.description,
                            "category": dish.category,
                            "image_url": dish.image_url(base),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for dish in &view.dishes {
                    println!(
                        "{:<28} {:>8}  {}",
                        dish.name,
                        dish.formatted_price(),
                        display_label(&dish.category)
                    );
                }
            }
            Ok(0)
        }
        MenuCommand::Categories { json } => {
            state.menu.start().await?;
            let categories = state.menu.categories();
            if json {
                println!("{}", serde_json::to_string_pretty(&categories)?);
            } else {
                for category in categories {
                    println!("{}", display_label(&category));
                }
            }
            Ok(0)
        }
        MenuCommand::Reset => {
            state.menu.start().await.or_else(|err| {
                if err.is_startup() {
                    Err(err)
                } else {
                    Ok(())
                }
            })?;
            state.menu.reload().await?;
            println!("Menu reloaded: {} dishes", state.menu.dishes().len());
            Ok(0)
        }
        MenuCommand::Status { json } => {
            littlelemon_lib::schema::ensure_schema(&state.pool).await?;
            let rows = state.store.count().await?;
            if json {
                let payload = json!({
                    "db_path": state.db_path.display().to_string(),
                    "rows": rows,
                    "menu_url": state.config.menu_url,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Database: {}", state.db_path.display());
                println!("Dishes:   {rows}");
            }
            Ok(0)
        }
    }
}

fn handle_profile_command(state: &AppState, command: ProfileCommand) -> Result<i32> {
    match command {
        ProfileCommand::Show { json } => {
            let profile = state.profile.load();
            if json {
                let payload = json!({
                    "onboarded": state.profile.is_onboarded(),
                    "initials": profile.initials(),
                    "profile": profile,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Name:  {} {}", profile.first_name, profile.last_name);
                println!("Email: {}", profile.email);
                println!("Phone: {}", profile.phone_number);
            }
            Ok(0)
        }
        ProfileCommand::Onboard { first_name, email } => {
            state.profile.onboard(&first_name, &email)?;
            Ok(0)
        }
        ProfileCommand::Set(args) => {
            let profile = Profile {
                first_name: args.first_name,
                last_name: args.last_name,
                email: args.email,
                phone_number: args.phone,
                image: args.image,
                notifications: NotificationPrefs {
                    order_status: args.order_status,
                    password_change: args.password_change,
                    special_offers: args.special_offers,
                    newsletter: args.newsletter,
                },
            };
            state.profile.save(&profile)?;
            Ok(0)
        }
        ProfileCommand::Logout => {
            state.profile.logout()?;
            Ok(0)
        }
    }
}
