//! Soap Calculator
//!
//! A cold process soap recipe calculator: fatty acid profile, soap
//! qualities, lye and water for a blend of oils.

mod calculator;
mod config;
mod db;
mod describe;
mod import;
mod models;
mod session;

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::calculator::RecipeReport;
use crate::config::Settings;
use crate::db::{RecipeBook, SqliteRecipeStore};
use crate::describe::Describer;
use crate::models::{AdditiveEntry, OilLine, RecipeInput};
use crate::session::Workbench;

/// Most essential oil or powder entries per recipe
const MAX_ADDITIVES: usize = 3;

#[derive(Parser)]
#[command(name = "soap-calculator")]
#[command(about = "Cold process soap recipe calculator")]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, default_value = "soap_data.db")]
    database: PathBuf,

    /// Path to a TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct RecipeArgs {
    /// Oil and weight in grams, e.g. "Olive Oil=500" (repeatable)
    #[arg(short, long = "oil", required = true)]
    oils: Vec<String>,

    /// Superfat (lye discount) in percent
    #[arg(short, long)]
    superfat: Option<f64>,

    /// Water as percent of total oil weight
    #[arg(short, long)]
    water: Option<f64>,

    /// Essential oil and weight in grams, e.g. "Lavender=20"
    #[arg(short, long = "essential-oil")]
    essential_oils: Vec<String>,

    /// Powder and weight in grams, e.g. "Pink clay=10"
    #[arg(short, long = "powder")]
    powders: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Load a table of common soaping oils
    LoadSample,

    /// Import oil sheets (*.csv) from a directory
    Import {
        /// Directory to scan for oil sheets
        dir: PathBuf,

        /// Clear existing oils before import
        #[arg(long)]
        clear: bool,
    },

    /// List all oils in the database
    ListOils,

    /// Show details for a specific oil
    Oil {
        /// Oil name
        name: String,
    },

    /// Calculate a recipe
    Calc {
        #[command(flatten)]
        recipe: RecipeArgs,

        /// Save the result under this name (defaults to a timestamped name)
        #[arg(long, num_args = 0..=1, default_missing_value = "")]
        save: Option<String>,
    },

    /// List saved recipes
    List,

    /// Show a saved recipe exactly as it was saved
    Show {
        /// Recipe id
        id: String,
    },

    /// Recalculate a saved recipe from its stored inputs
    Recalc {
        /// Recipe id
        id: String,

        /// Save the recalculated result as a new recipe
        #[arg(long, num_args = 0..=1, default_missing_value = "")]
        save: Option<String>,
    },

    /// Delete a saved recipe
    Delete {
        /// Recipe id
        id: String,
    },
}

fn init_logging(cli: &Cli) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let settings = Settings::load(cli.config.as_deref())?;
    let conn = Connection::open(&cli.database)
        .with_context(|| format!("Failed to open {}", cli.database.display()))?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at: {}", cli.database.display());
        }

        Commands::LoadSample => {
            let count = load_sample_data(&conn)?;
            println!("Loaded {} sample oils", count);
        }

        Commands::Import { dir, clear } => {
            if clear {
                log::info!("Clearing existing oils...");
                db::clear_oils(&conn)?;
            }

            let stats = import::import_to_database(&conn, &dir)?;
            println!("{}", stats);
        }

        Commands::ListOils => {
            let oils = db::list_oils(&conn)?;
            if oils.is_empty() {
                println!("No oils in database. Run 'import' or 'load-sample' first.");
            } else {
                println!("{:<30} {:>8} {:>6}", "Oil", "SAP", "INS");
                println!("{}", "-".repeat(46));
                for oil in oils {
                    println!("{:<30} {:>8.3} {:>6.0}", oil.name, oil.sap, oil.ins);
                }
            }
        }

        Commands::Oil { name } => match db::get_oil(&conn, &name)? {
            Some(oil) => {
                println!("Oil: {}", oil.name);
                println!("  SAP (NaOH): {}", oil.sap);
                println!("  INS: {}", oil.ins);
                println!("  Fatty acids:");
                for (acid, fraction) in oil.fatty_acids.iter() {
                    println!("    {:<11} {:>5.1}%", acid.name(), fraction);
                }
            }
            None => println!("Oil '{}' not found", name),
        },

        Commands::Calc { recipe, save } => {
            let input = build_input(&conn, &settings, &recipe)?;
            let describer = describe::from_settings(&settings.describer);
            let mut bench = Workbench::new(settings.describer.top_oils);

            if run_calculation(&mut bench, describer.as_ref(), &input).await {
                if let Some(name) = save {
                    save_recipe(&conn, &bench, &input, &name);
                }
            }
        }

        Commands::List => {
            let book = RecipeBook::open(SqliteRecipeStore::new(&conn));
            if book.recipes().is_empty() {
                println!("No saved recipes.");
            } else {
                println!("{:<38} {:<30} {:>10}", "Id", "Name", "Oils (g)");
                println!("{}", "-".repeat(80));
                for r in book.recipes() {
                    println!(
                        "{:<38} {:<30} {:>10.1}",
                        r.id, r.name, r.results.properties.total_weight
                    );
                }
            }
        }

        Commands::Show { id } => {
            let book = RecipeBook::open(SqliteRecipeStore::new(&conn));
            let Some(recipe) = book.find(&id) else {
                println!("Recipe '{}' not found", id);
                return Ok(());
            };

            let mut bench = Workbench::new(settings.describer.top_oils);
            let input = bench.load(recipe);
            println!("Recipe: {}", recipe.name);
            print_input(&input);
            if let Some(result) = bench.ready_result() {
                println!("{}", RecipeReport { result });
            }
        }

        Commands::Recalc { id, save } => {
            let book = RecipeBook::open(SqliteRecipeStore::new(&conn));
            let Some(recipe) = book.find(&id) else {
                println!("Recipe '{}' not found", id);
                return Ok(());
            };
            let input = recipe.to_input();
            drop(book);

            let describer = describe::from_settings(&settings.describer);
            let mut bench = Workbench::new(settings.describer.top_oils);
            if run_calculation(&mut bench, describer.as_ref(), &input).await {
                if let Some(name) = save {
                    save_recipe(&conn, &bench, &input, &name);
                }
            }
        }

        Commands::Delete { id } => {
            let mut book = RecipeBook::open(SqliteRecipeStore::new(&conn));
            if book.delete(&id) {
                println!("Deleted recipe {}", id);
            } else {
                println!("Recipe '{}' not found", id);
            }
        }
    }

    Ok(())
}

/// Parse "name=grams"; negative weights become zero
fn parse_weighted(raw: &str) -> Result<(String, f64)> {
    let Some((name, weight)) = raw.rsplit_once('=') else {
        bail!("Expected NAME=GRAMS, got '{}'", raw);
    };
    let weight: f64 = weight
        .trim()
        .parse()
        .with_context(|| format!("Invalid weight in '{}'", raw))?;
    Ok((name.trim().to_string(), weight.max(0.0)))
}

fn parse_additives(raw: &[String], kind: &str) -> Result<Vec<AdditiveEntry>> {
    if raw.len() > MAX_ADDITIVES {
        bail!("At most {} {} entries per recipe", MAX_ADDITIVES, kind);
    }
    raw.iter()
        .map(|r| parse_weighted(r).map(|(name, weight)| AdditiveEntry { name, weight }))
        .collect()
}

/// Snapshot the command-line recipe, resolving oils against the database
fn build_input(conn: &Connection, settings: &Settings, args: &RecipeArgs) -> Result<RecipeInput> {
    let mut oils = Vec::new();
    for raw in &args.oils {
        let (name, weight) = parse_weighted(raw)?;
        let Some(oil) = db::get_oil(conn, &name)? else {
            bail!("Unknown oil '{}'. Run 'list-oils' to see available oils.", name);
        };
        oils.push(OilLine { oil, weight });
    }

    Ok(RecipeInput {
        oils,
        superfat: args.superfat.unwrap_or(settings.default_superfat),
        water_percent: args.water.unwrap_or(settings.default_water_percent),
        essential_oils: parse_additives(&args.essential_oils, "essential oil")?,
        powders: parse_additives(&args.powders, "powder")?,
    })
}

/// Calculate, print the report, and say whether a result was produced
async fn run_calculation(
    bench: &mut Workbench,
    describer: &dyn Describer,
    input: &RecipeInput,
) -> bool {
    let Some(pending) = bench.begin(input) else {
        println!("Total oil weight is zero. Give at least one oil a weight to calculate.");
        return false;
    };

    let p = &pending.result.properties;
    log::info!(
        "Lye {:.1} g, water {:.1} g for {:.1} g of oils; generating description...",
        p.lye_amount,
        p.water_amount,
        p.total_weight
    );

    let described = session::describe(describer, &pending).await;
    let settled = bench.settle(described).cloned();
    log::debug!("Request {} finished in state {:?}", pending.request_id, bench.state());

    match settled {
        Some(result) => {
            println!("{}", RecipeReport { result: &result });
            true
        }
        None => false,
    }
}

/// Save the settled result; returns whether it reached the database
fn save_recipe(conn: &Connection, bench: &Workbench, input: &RecipeInput, name: &str) -> bool {
    let Some(result) = bench.ready_result() else {
        log::warn!("Nothing to save until the description has settled");
        return false;
    };

    let name = if name.trim().is_empty() {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        format!("Recipe {}", secs)
    } else {
        name.trim().to_string()
    };

    let mut book = RecipeBook::open(SqliteRecipeStore::new(conn));
    match book.save(&name, input, result) {
        Ok(saved) => {
            println!("Saved recipe '{}' ({})", saved.name, saved.id);
            true
        }
        Err(e) => {
            println!("Warning: recipe '{}' was not saved: {:#}", name, e);
            false
        }
    }
}

fn print_input(input: &RecipeInput) {
    println!("  Superfat: {}%", input.superfat);
    println!("  Water: {}% of oils", input.water_percent);
    println!("  Oils:");
    for line in &input.oils {
        println!("    {} @ {} g", line.oil.name, line.weight);
    }
    println!();
}

/// Load a table of common soaping oils for use without external data
fn load_sample_data(conn: &Connection) -> Result<usize> {
    use crate::models::{FattyAcidProfile, OilSpec};

    // name, sap, ins, [lauric, myristic, palmitic, stearic, ricinoleic, oleic, linoleic, linolenic]
    let table: [(&str, f64, f64, [f64; 8]); 10] = [
        ("Olive Oil", 0.135, 109.0, [0.0, 0.0, 14.0, 3.0, 0.0, 69.0, 12.0, 1.0]),
        ("Coconut Oil", 0.183, 258.0, [48.0, 19.0, 9.0, 3.0, 0.0, 8.0, 2.0, 0.0]),
        ("Palm Oil", 0.142, 145.0, [0.0, 1.0, 44.0, 5.0, 0.0, 39.0, 10.0, 0.0]),
        ("Castor Oil", 0.128, 95.0, [0.0, 0.0, 0.0, 0.0, 90.0, 4.0, 4.0, 0.0]),
        ("Shea Butter", 0.128, 116.0, [0.0, 0.0, 5.0, 40.0, 0.0, 48.0, 6.0, 0.0]),
        ("Sweet Almond Oil", 0.136, 97.0, [0.0, 0.0, 7.0, 0.0, 0.0, 71.0, 18.0, 0.0]),
        ("Cocoa Butter", 0.137, 157.0, [0.0, 0.0, 28.0, 33.0, 0.0, 35.0, 3.0, 0.0]),
        ("Avocado Oil", 0.133, 99.0, [0.0, 0.0, 20.0, 2.0, 0.0, 58.0, 12.0, 0.0]),
        ("Sunflower Oil", 0.134, 63.0, [0.0, 0.0, 7.0, 4.0, 0.0, 16.0, 70.0, 1.0]),
        ("Rice Bran Oil", 0.128, 70.0, [0.0, 1.0, 22.0, 3.0, 0.0, 38.0, 34.0, 2.0]),
    ];

    for (name, sap, ins, [la, my, pa, st, ri, ol, li, ln]) in table {
        let oil = OilSpec {
            name: name.to_string(),
            sap,
            ins,
            fatty_acids: FattyAcidProfile {
                lauric: la,
                myristic: my,
                palmitic: pa,
                stearic: st,
                ricinoleic: ri,
                oleic: ol,
                linoleic: li,
                linolenic: ln,
            },
        };
        db::upsert_oil(conn, &oil)?;
    }

    Ok(table.len())
}
