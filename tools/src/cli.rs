use clap::{Parser, Subcommand};

/// `agency-tools`: operator bootstrap commands, grounded on
/// `original_source/cc-agency/cc_agency/tools/main.py`'s subcommand
/// dispatch (`ccagency create-db-user|create-broker-user|drop-db-collections`).
#[derive(Debug, Parser)]
#[clap(name = "agency-tools", version)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the database and run its schema migrations, as specified in
    /// the agency configuration's `store.database_url`.
    CreateDbUser {
        #[clap(short = 'c', long = "config")]
        config: Option<String>,
    },
    /// Create (or update) a broker user account interactively.
    CreateBrokerUser {
        #[clap(short = 'c', long = "config")]
        config: Option<String>,
    },
    /// Drop the named tables' contents.
    DropDbCollections {
        #[clap(short = 'c', long = "config")]
        config: Option<String>,
        #[clap(value_enum, required = true, num_args = 1..)]
        collections: Vec<Collection>,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
#[clap(rename_all = "snake_case")]
pub enum Collection {
    Experiments,
    Batches,
    Users,
    BlockEntries,
    CallbackTokens,
}

impl Collection {
    pub fn table_name(self) -> &'static str {
        match self {
            Collection::Experiments => "experiments",
            Collection::Batches => "batches",
            Collection::Users => "users",
            Collection::BlockEntries => "block_entries",
            Collection::CallbackTokens => "callback_tokens",
        }
    }
}
