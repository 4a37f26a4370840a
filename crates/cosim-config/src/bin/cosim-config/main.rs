mod cli;

use cosim_config::action_plan::CompiledPlan;
use cosim_config::comm_settings::CommunicationSettings;
use cosim_config::deployment::ServicesDeployment;
use cosim_config::workflow::Workflow;
use cosim_config::xml_parser::{ParseOptions, StructuredXmlParser};

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("COSIM_CONFIG_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let options = ParseOptions { strict: cli.strict };
    let command_result = match cli.command {
        cli::Command::Parse(parse_cli) => parse(parse_cli, options),
        cli::Command::Compile(compile_cli) => compile(compile_cli, options),
        cli::Command::CommSettings(comm_cli) => comm_settings(comm_cli, options),
        cli::Command::Dev(dev_cli) => dev(dev_cli, options),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn parse(cli: cli::ParseCommand, options: ParseOptions) -> anyhow::Result<()> {
    let tree = StructuredXmlParser::new(options).parse(&cli.file)?;

    output(&cli.output, &tree)
}

#[derive(serde::Serialize)]
struct CompileOutput<'w> {
    actions: &'w CompiledPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    services_deployment: Option<ServicesDeployment>,
}

pub fn compile(cli: cli::CompileCommand, options: ParseOptions) -> anyhow::Result<()> {
    let workflow = Workflow::load(&cli.plan, options)?;

    let services_deployment = cli
        .services_deployment
        .as_deref()
        .map(|path| workflow.services_deployment(path))
        .transpose()?;

    output(
        &cli.output,
        &CompileOutput {
            actions: &workflow.compiled,
            services_deployment,
        },
    )
}

pub fn comm_settings(cli: cli::CommSettingsCommand, options: ParseOptions) -> anyhow::Result<()> {
    let document = StructuredXmlParser::new(options).parse(&cli.file)?;
    let settings = CommunicationSettings::from_dictionary(&cli.file, &document)?;

    output(&cli.output, &settings)
}

fn output(output: &cli::OutputArgs, value: &impl serde::Serialize) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
    };

    Ok(())
}

/// (cosim-config-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(cli: cli::DevCommand, options: ParseOptions) -> anyhow::Result<()> {
    use cli::DevSubCommand::*;

    match cli.command {
        Variables { plan } => {
            let workflow = Workflow::load(&plan, options)?;
            println!("{:#?}", workflow.registry);
        }
        Tree { file } => {
            let tree = StructuredXmlParser::new(options).parse(&file)?;
            println!("{tree:#?}");
        }
    }

    Ok(())
}
