//! Command-line arguments

use clap::{Parser, Subcommand, ValueEnum};

use crate::cli::commands::{
    apikey::ApiKeyCommands, comment::CommentCommands, completions::CompletionsArgs,
    entity::EntityCommands, init::InitArgs, log::LogArgs, prop::PropCommands,
    public::PublicArgs, row::RowCommands, share::ShareArgs, workflow::WorkflowCommands,
};
use crate::entities::Visibility;

#[derive(Parser, Debug)]
#[command(name = "eb")]
#[command(author, version, about = "Entity Builder - user-defined records with typed properties, sharing and workflows")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command
#[derive(clap::Args, Debug, Clone)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, value_enum, default_value = "auto")]
    pub format: OutputFormat,

    /// Tenant to act in (defaults to `default_tenant` from config)
    #[arg(long, global = true, env = "EB_TENANT")]
    pub tenant: Option<String>,

    /// User to act as (anonymous when omitted)
    #[arg(long, global = true, env = "EB_USER")]
    pub user: Option<String>,

    /// Role of the user (repeatable)
    #[arg(long = "role", global = true, value_delimiter = ',')]
    pub roles: Vec<String>,

    /// Group of the user (repeatable)
    #[arg(long = "group", global = true, value_delimiter = ',')]
    pub groups: Vec<String>,

    /// More log output (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress informational messages
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Table for lists, readable text for single records
    Auto,
    Table,
    Tsv,
    Csv,
    Json,
    Yaml,
    /// Identifiers only
    Id,
}

/// Sharing mode as given on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityArg {
    Private,
    Tenant,
    Roles,
    Groups,
    Users,
    Public,
}

impl From<VisibilityArg> for Visibility {
    fn from(arg: VisibilityArg) -> Self {
        match arg {
            VisibilityArg::Private => Visibility::Private,
            VisibilityArg::Tenant => Visibility::Tenant,
            VisibilityArg::Roles => Visibility::Roles,
            VisibilityArg::Groups => Visibility::Groups,
            VisibilityArg::Users => Visibility::Users,
            VisibilityArg::Public => Visibility::Public,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new project in the current directory
    Init(InitArgs),

    /// Define entities (record types)
    #[command(subcommand)]
    Entity(EntityCommands),

    /// Define properties of an entity
    #[command(subcommand)]
    Prop(PropCommands),

    /// Create, read, update and delete rows
    #[command(subcommand)]
    Row(RowCommands),

    /// Change who can see and edit a row
    Share(ShareArgs),

    /// View a publicly shared row
    Public(PublicArgs),

    /// Workflow states, steps and transitions
    #[command(subcommand)]
    Workflow(WorkflowCommands),

    /// Comments and reactions on rows
    #[command(subcommand)]
    Comment(CommentCommands),

    /// Activity history of a row
    Log(LogArgs),

    /// API keys and keyed calls
    #[command(subcommand)]
    Apikey(ApiKeyCommands),

    /// Generate shell completions
    Completions(CompletionsArgs),
}
