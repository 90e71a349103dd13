use clap::Parser;

/// `agency-broker`: the multi-worker HTTP intake/API plane (spec §6).
#[derive(Debug, Parser)]
#[clap(name = "agency-broker", version)]
pub struct Args {
    /// Path to the YAML config document. Falls back to `CC_AGENCY_CONFIG`,
    /// then `agency.yml` in the working directory.
    #[clap(short = 'c', long = "config")]
    pub config: Option<String>,
}
