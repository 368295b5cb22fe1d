use clap::Parser;
use eb::cli::{Cli, Commands};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "eb=debug",
        _ => "eb=trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("EB_LOG").unwrap_or_else(|_| EnvFilter::new(default)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn main() -> Result<()> {
    // Fancy miette diagnostics
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    init_tracing(cli.global.verbose);
    let global = &cli.global;

    match cli.command {
        Commands::Init(args) => eb::cli::commands::init::run(args, global),
        Commands::Entity(cmd) => eb::cli::commands::entity::run(cmd, global),
        Commands::Prop(cmd) => eb::cli::commands::prop::run(cmd, global),
        Commands::Row(cmd) => eb::cli::commands::row::run(cmd, global),
        Commands::Share(args) => eb::cli::commands::share::run(args, global),
        Commands::Public(args) => eb::cli::commands::public::run(args, global),
        Commands::Workflow(cmd) => eb::cli::commands::workflow::run(cmd, global),
        Commands::Comment(cmd) => eb::cli::commands::comment::run(cmd, global),
        Commands::Log(args) => eb::cli::commands::log::run(args, global),
        Commands::Apikey(cmd) => eb::cli::commands::apikey::run(cmd, global),
        Commands::Completions(args) => eb::cli::commands::completions::run(args, global),
    }
}
