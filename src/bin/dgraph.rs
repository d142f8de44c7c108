//! dgraph CLI tool
//!
//! Command-line access to the discourse graphs stored in a vault directory.
//!
//! ## Commands
//!
//! - `validate <vault>`: Check every canvas's relations against the type schema
//! - `reify <vault> <canvas>`: Write every completed relation on a canvas into frontmatter
//! - `relations <vault> <file>`: List the relations recorded in a file's frontmatter

use clap::{Parser, Subcommand};
use discourse_graph::{
    canvas::{CanvasFile, CANVAS_FRONTMATTER_KEY},
    config::{SettingsProvider, TomlSettingsProvider},
    editor::Editor,
    reify::FrontmatterReifier,
    schema::TypeSchema,
    toast::ToastBus,
    validator::is_valid_connection,
    vault::{MdVault, Vault, VaultPath},
    DiscourseError,
};
use std::{path::PathBuf, sync::Arc};

#[derive(Parser)]
#[command(name = "dgraph")]
#[command(author, version, about = "Inspect and reify discourse graph canvases in a vault", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check every canvas in the vault for relations the schema does not allow
    Validate {
        /// Vault root directory
        vault: PathBuf,

        /// Settings file (defaults to discourse-graph.toml in the vault root)
        #[arg(short, long)]
        settings: Option<PathBuf>,
    },

    /// Write each relation bound at both ends on a canvas into its files' frontmatter
    Reify {
        /// Vault root directory
        vault: PathBuf,

        /// Canvas file, relative to the vault root
        canvas: String,

        /// Settings file (defaults to discourse-graph.toml in the vault root)
        #[arg(short, long)]
        settings: Option<PathBuf>,
    },

    /// List the relations stored in a file's frontmatter
    Relations {
        /// Vault root directory
        vault: PathBuf,

        /// File, relative to the vault root
        file: String,

        /// Settings file (defaults to discourse-graph.toml in the vault root)
        #[arg(short, long)]
        settings: Option<PathBuf>,
    },
}

fn settings_provider(vault: &std::path::Path, settings: Option<PathBuf>) -> TomlSettingsProvider {
    match settings {
        Some(path) => TomlSettingsProvider::new(path),
        None => TomlSettingsProvider::in_vault(vault),
    }
}

async fn load_editor(
    vault: &MdVault,
    provider: &TomlSettingsProvider,
    canvas: &VaultPath,
) -> Result<Editor, DiscourseError> {
    let schema = Arc::new(provider.get_schema()?);
    let config = provider.get_config()?;
    let text = vault.read_text(canvas).await?;
    let file = CanvasFile::parse(&text)?;
    let mut editor = Editor::new(canvas.as_str(), schema, config, ToastBus::new());
    file.data.load_into(&mut editor)?;
    Ok(editor)
}

/// Human-readable problems with one canvas's relations.
fn canvas_problems(editor: &Editor, schema: &TypeSchema) -> Vec<String> {
    let mut problems = Vec::new();
    for relation in editor.relations() {
        let Some((start, end)) = editor.relation_endpoints(&relation.id) else {
            problems.push(format!("{}: not bound at both ends", relation.id));
            continue;
        };
        if start.id == end.id {
            problems.push(format!("{}: both ends on \"{}\"", relation.id, start.props.title));
        } else if !is_valid_connection(
            schema,
            &start.props.node_type_id,
            &end.props.node_type_id,
            &relation.props.relation_type_id,
        ) {
            problems.push(format!(
                "{}: a {} cannot be connected to a {} with \"{}\"",
                relation.id,
                schema.node_type_name(&start.props.node_type_id),
                schema.node_type_name(&end.props.node_type_id),
                relation.props.relation_type_id
            ));
        }
    }
    problems
}

async fn is_canvas(vault: &MdVault, file: &VaultPath) -> bool {
    match vault.read_frontmatter(file).await {
        Ok(fm) => fm.get(CANVAS_FRONTMATTER_KEY) == Some(&serde_yaml::Value::Bool(true)),
        Err(e) => {
            tracing::warn!("Skipping {file}: {e}");
            false
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Validate { vault, settings } => {
            let provider = settings_provider(&vault, settings);
            let schema = provider.get_schema()?;
            let md_vault = MdVault::new(&vault)?;
            let problem_count = runtime.block_on(async {
                let mut problem_count = 0;
                for file in md_vault.files("md").await? {
                    if !is_canvas(&md_vault, &file).await {
                        continue;
                    }
                    let editor = match load_editor(&md_vault, &provider, &file).await {
                        Ok(editor) => editor,
                        Err(e) => {
                            println!("{file}: {e}");
                            problem_count += 1;
                            continue;
                        }
                    };
                    let problems = canvas_problems(&editor, &schema);
                    println!(
                        "{file}: {} relations, {} problems",
                        editor.relations().count(),
                        problems.len()
                    );
                    for problem in problems.iter() {
                        println!("  {problem}");
                    }
                    problem_count += problems.len();
                }
                Ok::<usize, DiscourseError>(problem_count)
            })?;
            if problem_count > 0 {
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::Reify {
            vault,
            canvas,
            settings,
        } => {
            let provider = settings_provider(&vault, settings);
            let md_vault = Arc::new(MdVault::new(&vault)?);
            let canvas = VaultPath::new(&canvas);
            runtime.block_on(async {
                let editor = load_editor(&md_vault, &provider, &canvas)
                    .await?
                    .into_shared();
                let reifier = FrontmatterReifier::new(md_vault.clone());
                for (id, result) in reifier.reify_all(&editor).await {
                    match result {
                        Ok(report) if report.changed => println!(
                            "{id}: {} -[{}]- {} written",
                            report.source, report.relation_type_id, report.target
                        ),
                        Ok(report) => println!(
                            "{id}: {} -[{}]- {} already present",
                            report.source, report.relation_type_id, report.target
                        ),
                        Err(e) => println!("{id}: {e}"),
                    }
                }
                Ok::<(), DiscourseError>(())
            })?;
            Ok(())
        }

        Commands::Relations {
            vault,
            file,
            settings,
        } => {
            let provider = settings_provider(&vault, settings);
            let schema = provider.get_schema()?;
            let md_vault = Arc::new(MdVault::new(&vault)?);
            let file = VaultPath::new(&file);
            runtime.block_on(async {
                let reifier = FrontmatterReifier::new(md_vault.clone());
                for relation in reifier.relations_of(&schema, &file).await? {
                    let target = relation
                        .target
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "(unresolved)".to_string());
                    println!("{} [[{}]] -> {target}", relation.text, relation.link);
                }
                Ok::<(), DiscourseError>(())
            })?;
            Ok(())
        }
    }
}
