//! Command dispatch: one function per subcommand

use std::io;
use std::path::Path;

use clap::CommandFactory;
use clap_complete::generate;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::application::ApplicationError;
use crate::cli::args::{Cli, Commands, ConfigCommands};
use crate::cli::output;
use crate::cli::{CliError, CliResult};
use crate::config::{global_config_path, local_config_path, Settings};
use crate::domain::{BuildMode, Diagnostic, Forest, NodeView, TreeNodeConvert};
use crate::infrastructure::di::ServiceContainer;

#[derive(Serialize)]
struct ShowDocument<'a> {
    roots: Vec<NodeView>,
    diagnostics: &'a [Diagnostic],
}

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    match &cli.command {
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        Commands::Config {
            command: ConfigCommands::Template,
        } => {
            output::info(&Settings::template());
            Ok(())
        }
        command => {
            let container = ServiceContainer::new()?;
            dispatch(&container, command)
        }
    }
}

fn dispatch(container: &ServiceContainer, command: &Commands) -> CliResult<()> {
    match command {
        Commands::Tree { file, lazy, expand } => tree(container, file.as_deref(), *lazy, expand),
        Commands::Show { file, lazy, expand } => show(container, file.as_deref(), *lazy, expand),
        Commands::Check { file } => check(container, file.as_deref()),
        Commands::Move { file, id, to } => move_entity(container, file, id, to.as_deref()),
        Commands::Remove { file, id, policy } => {
            remove(container, file, id, policy.map(Into::into))
        }
        Commands::Rank { titles } => rank(container, titles),
        Commands::Config { command } => config(container, command),
        Commands::Completion { .. } => Err(CliError::Usage("completion handled before dispatch".into())),
    }
}

fn mode(lazy: bool) -> Option<BuildMode> {
    lazy.then_some(BuildMode::Lazy)
}

fn render(forest: &Forest) {
    for tree in forest.to_tree_strings() {
        // termtree ends every tree with a newline
        print!("{tree}");
    }
}

fn report(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        output::warning(diagnostic);
    }
}

#[instrument(skip(container))]
fn tree(container: &ServiceContainer, file: Option<&Path>, lazy: bool, expand: &[String]) -> CliResult<()> {
    let output = container
        .hierarchy
        .build_revealed(file, mode(lazy), expand)?;
    render(&output.forest);
    report(&output.diagnostics);
    Ok(())
}

#[instrument(skip(container))]
fn show(container: &ServiceContainer, file: Option<&Path>, lazy: bool, expand: &[String]) -> CliResult<()> {
    let output = container
        .hierarchy
        .build_revealed(file, mode(lazy), expand)?;
    let document = ShowDocument {
        roots: output.forest.to_view(),
        diagnostics: &output.diagnostics,
    };
    let json = serde_json::to_string_pretty(&document).map_err(|e| ApplicationError::OperationFailed {
        context: "serialize view".into(),
        source: Box::new(e),
    })?;
    output::info(&json);
    Ok(())
}

#[instrument(skip(container))]
fn check(container: &ServiceContainer, file: Option<&Path>) -> CliResult<()> {
    let output = container.hierarchy.build(file, Some(BuildMode::Lazy))?;
    let entities = output.forest.collection().len();
    if output.diagnostics.is_empty() {
        output::success(&format!("{entities} entities, no anomalies"));
        return Ok(());
    }
    output::header(&format!("{entities} entities, {} anomalies", output.diagnostics.len()));
    for diagnostic in &output.diagnostics {
        output::failure(diagnostic);
    }
    Err(CliError::Diagnostics(output.diagnostics.len()))
}

#[instrument(skip(container))]
fn move_entity(container: &ServiceContainer, file: &Path, id: &str, to: Option<&str>) -> CliResult<()> {
    let result = container.hierarchy.reparent(Some(file), id, to)?;
    debug!("move: {:?}", result.outcome);
    render(&result.forest);
    output::action(
        "Moved",
        &format!("{id} under {} ({:?})", to.unwrap_or("<root>"), result.outcome),
    );
    Ok(())
}

#[instrument(skip(container))]
fn remove(
    container: &ServiceContainer,
    file: &Path,
    id: &str,
    policy: Option<crate::domain::OrphanPolicy>,
) -> CliResult<()> {
    let result = container.hierarchy.remove(Some(file), id, policy)?;
    render(&result.forest);
    output::action("Removed", &format!("{id} ({:?})", result.outcome));
    Ok(())
}

fn rank(container: &ServiceContainer, titles: &[String]) -> CliResult<()> {
    for title in titles {
        let (ordinal, group) = container.hierarchy.classify(title);
        output::info(&format!("{ordinal}\t{group}\t{title}"));
    }
    Ok(())
}

fn config(container: &ServiceContainer, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            output::info(&container.settings.to_toml()?);
        }
        ConfigCommands::Template => {
            output::info(&Settings::template());
        }
        ConfigCommands::Path => {
            let cwd = container
                .fs
                .current_dir()
                .map_err(|e| crate::infrastructure::InfraError::io("current directory", e))?;
            let local = local_config_path(&cwd);
            let paths = global_config_path().into_iter().chain(std::iter::once(local));
            for path in paths {
                let marker = if container.fs.exists(&path) { "exists" } else { "missing" };
                output::detail(&format!("{} ({marker})", path.display()));
            }
        }
    }
    Ok(())
}
