use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ideatree_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS};
use ideatree_contracts::models::ModelRegistry;
use ideatree_contracts::regulation::{RegulationTable, JURISDICTIONS};
use ideatree_contracts::tree::NodeRef;
use ideatree_engine::{ActionOutcome, EngineConfig, IdeaEngine, Session};

#[derive(Debug, Parser)]
#[command(name = "ideatree", version, about = "Food R&D idea tree explorer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive session: grow, prune and export an idea tree.
    Chat(ChatArgs),
    /// One-shot base tree generation and export.
    Generate(GenerateArgs),
    /// One-shot recipe plus additive regulation table.
    Recipe(RecipeArgs),
}

#[derive(Debug, Args)]
struct CommonArgs {
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    api_key: Option<String>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    prompts_dir: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    keyword: String,
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    report: Option<PathBuf>,
    #[arg(long)]
    analysis: Option<PathBuf>,
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Debug, Parser)]
struct RecipeArgs {
    #[arg(long)]
    concept: String,
    #[arg(long = "country", value_delimiter = ',', required = true)]
    countries: Vec<String>,
    #[arg(long)]
    json: bool,
    #[command(flatten)]
    common: CommonArgs,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("ideatree error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Generate(args) => run_generate(args),
        Command::Recipe(args) => run_recipe(args),
    }
}

fn build_engine(common: &CommonArgs) -> Result<IdeaEngine> {
    let config = EngineConfig::from_env()
        .with_model(common.model.clone())
        .with_api_key(common.api_key.clone())
        .with_prompts_dir(common.prompts_dir.clone())
        .with_events_path(common.events.clone());
    let engine = IdeaEngine::new(&config)?;
    // Only a requested model can fall back; the implicit default is silent.
    if config.model.is_some() {
        if let Some(reason) = engine.last_fallback_reason() {
            eprintln!("{reason}");
        }
    }
    Ok(engine)
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let mut engine = build_engine(&args.common)?;
    let stdin = io::stdin();
    let mut line = String::new();

    println!(
        "Idea tree chat started (model {}). Type a keyword or /help.",
        engine.model().name
    );

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        let intent = parse_intent(input);
        if intent.action == "noop" {
            continue;
        }
        if intent.action == "quit" {
            break;
        }

        // Stale paths and failed writes are reported; the session carries on.
        if let Err(err) = dispatch(&mut engine, &intent) {
            println!("Error: {err:#}");
        }
    }
    Ok(())
}

fn dispatch(engine: &mut IdeaEngine, intent: &Intent) -> Result<()> {
    match intent.action.as_str() {
        "help" => {
            println!("Commands: {}", CHAT_HELP_COMMANDS.join(" "));
            println!("<ref> is a dotted path like 0.2.1 or an id prefix like @3f2a.");
        }
        "generate" => {
            let keyword = intent.arg_str("keyword").unwrap_or_default();
            println!("Generating idea tree...");
            let outcome = engine.generate_base_tree(keyword)?;
            print_outcome(&outcome);
            if outcome.changed {
                print!("{}", render_tree(engine.session()));
            }
        }
        "expand" => {
            let node_ref = node_ref_arg(intent)?;
            println!("Expanding {node_ref}...");
            let outcome = engine.expand_node(&node_ref)?;
            print_outcome(&outcome);
            if outcome.changed {
                print!("{}", render_tree(engine.session()));
            }
        }
        "remove" => {
            let outcome = engine.remove_node(&node_ref_arg(intent)?)?;
            print_outcome(&outcome);
            print!("{}", render_tree(engine.session()));
        }
        "favorite" => {
            let outcome = engine.favorite_node(&node_ref_arg(intent)?)?;
            print_outcome(&outcome);
        }
        "show_favorites" => {
            let favorites = engine.session().favorite_nodes();
            if favorites.is_empty() {
                println!("No favorites yet. Use /favorite <ref>.");
            }
            for (path, node) in favorites {
                println!("[{path}] {}  @{}", node.title, node.id.short());
            }
        }
        "show_tree" => {
            print!("{}", render_tree(engine.session()));
        }
        "report" => {
            println!("Writing report...");
            let outcome = engine.generate_report()?;
            print_outcome(&outcome);
            if outcome.changed {
                println!("{}", engine.session().report);
            }
        }
        "analysis" => {
            println!("Analyzing...");
            let outcome = engine.generate_analysis()?;
            print_outcome(&outcome);
            if outcome.changed {
                println!("{}", engine.session().analysis);
            }
        }
        "export" => {
            let requested = intent.arg_str("path").map(PathBuf::from);
            let path = engine.export_to(requested.as_deref())?;
            println!("Exported to {}", path.display());
        }
        "recipe" => {
            let concept = intent.arg_str("concept").unwrap_or_default();
            println!("Building recipe and checking regulations...");
            let outcome = engine.analyze_recipe(concept, &intent.arg_list("countries"))?;
            print_outcome(&outcome);
            if outcome.changed {
                if let Some(analysis) = engine.session().recipe.as_ref() {
                    print_recipe_summary(analysis);
                    print!("{}", render_table(&analysis.table));
                }
            }
        }
        "show_countries" => {
            for place in JURISDICTIONS {
                println!("{:<20} {}", place.name, place.reference_url);
            }
        }
        "set_model" => match intent.arg_str("model") {
            Some(requested) => {
                let selection = engine.set_model(requested)?;
                if let Some(reason) = selection.fallback_reason.as_deref() {
                    println!("{reason}");
                }
                println!(
                    "Model set to {} ({})",
                    selection.model.name, selection.model.provider
                );
            }
            None => {
                println!(
                    "Model: {} ({})",
                    engine.model().name,
                    engine.model().provider
                );
                let registry = ModelRegistry::new(None);
                let available: Vec<&str> =
                    registry.list().map(|spec| spec.name.as_str()).collect();
                println!("Available: {}", available.join(", "));
            }
        },
        "ping" => {
            let outcome = engine.ping()?;
            print_outcome(&outcome);
            if outcome.message.is_none() {
                println!("Connection test failed.");
            }
        }
        "clear" => {
            engine.clear()?;
            println!("Session cleared.");
        }
        "unknown" => {
            let command = intent.arg_str("command").unwrap_or_default();
            println!("Unknown command: /{command}. Type /help.");
        }
        other => {
            println!("Unhandled action: {other}");
        }
    }
    Ok(())
}

fn node_ref_arg(intent: &Intent) -> Result<NodeRef> {
    let raw = intent
        .arg_str("ref")
        .with_context(|| format!("/{} needs a node path or @id", intent.action))?;
    Ok(raw.parse::<NodeRef>()?)
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let mut engine = build_engine(&args.common)?;
    let outcome = engine.generate_base_tree(&args.keyword)?;
    print_outcome(&outcome);
    if engine.session().forest.is_empty() {
        eprintln!("No idea tree was generated.");
        return Ok(1);
    }
    print!("{}", render_tree(engine.session()));

    let path = engine.export_to(args.out.as_deref())?;
    println!("Exported to {}", path.display());

    let mut status = 0;
    if let Some(report_path) = args.report.as_deref() {
        let outcome = engine.generate_report()?;
        if !save_generated(&outcome, &engine.session().report, report_path, "Report")? {
            status = 1;
        }
    }
    if let Some(analysis_path) = args.analysis.as_deref() {
        let outcome = engine.generate_analysis()?;
        if !save_generated(&outcome, &engine.session().analysis, analysis_path, "Analysis")? {
            status = 1;
        }
    }
    Ok(status)
}

/// Writes `text` only when the action actually produced it.
fn save_generated(outcome: &ActionOutcome, text: &str, path: &Path, label: &str) -> Result<bool> {
    print_outcome(outcome);
    if !outcome.changed {
        eprintln!("{label} was not generated; {} not written.", path.display());
        return Ok(false);
    }
    write_text(path, text)?;
    println!("{label} written to {}", path.display());
    Ok(true)
}

fn run_recipe(args: RecipeArgs) -> Result<i32> {
    let mut engine = build_engine(&args.common)?;
    let outcome = engine.analyze_recipe(&args.concept, &args.countries)?;
    print_outcome(&outcome);
    let Some(analysis) = engine.session().recipe.as_ref() else {
        return Ok(1);
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(analysis)?);
    } else {
        print_recipe_summary(analysis);
        print!("{}", render_table(&analysis.table));
    }
    Ok(0)
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

fn print_outcome(outcome: &ActionOutcome) {
    for warning in &outcome.warnings {
        println!("Warning: {warning}");
    }
    if let Some(message) = outcome.message.as_deref() {
        println!("{message}");
    }
}

fn print_recipe_summary(analysis: &ideatree_contracts::regulation::RecipeAnalysis) {
    let recipe = &analysis.recipe;
    println!("Dish: {}", recipe.dish);
    if !recipe.ingredients.is_empty() {
        println!("Ingredients: {}", recipe.ingredients.join(", "));
    }
    if !recipe.additives.is_empty() {
        println!("Additives: {}", recipe.additives.join(", "));
    }
    for (idx, step) in recipe.steps.iter().enumerate() {
        println!("  {}. {step}", idx + 1);
    }
}

fn render_tree(session: &Session) -> String {
    if session.forest.is_empty() {
        return "(no idea tree yet)\n".to_string();
    }
    let mut out = format!("Idea tree: {}\n", session.keyword);
    for (path, node) in session.forest.walk() {
        let indent = "  ".repeat(path.depth());
        let star = if session.is_favorite(node.id) { " *" } else { "" };
        out.push_str(&format!(
            "{indent}[{path}] {}  @{}{star}\n",
            node.title,
            node.id.short()
        ));
        if !node.desc.trim().is_empty() {
            out.push_str(&format!("{indent}    {}\n", node.desc.trim()));
        }
    }
    out
}

fn render_table(table: &RegulationTable) -> String {
    if table.is_empty() {
        return "(no regulation rows)\n".to_string();
    }
    let widths: Vec<usize> = table
        .columns
        .iter()
        .map(|column| {
            (0..table.rows.len())
                .map(|row| table.cell(row, column).chars().count())
                .chain(std::iter::once(column.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let format_row = |cells: Vec<&str>| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| {
                let pad = width.saturating_sub(cell.chars().count());
                format!("{cell}{}", " ".repeat(pad))
            })
            .collect();
        format!("{}\n", padded.join(" | ").trim_end())
    };

    let mut out = format_row(table.columns.iter().map(String::as_str).collect());
    out.push_str(&format!(
        "{}\n",
        widths
            .iter()
            .map(|width| "-".repeat(*width))
            .collect::<Vec<String>>()
            .join("-+-")
    ));
    for row in 0..table.rows.len() {
        out.push_str(&format_row(
            table
                .columns
                .iter()
                .map(|column| table.cell(row, column))
                .collect(),
        ));
    }
    out
}
