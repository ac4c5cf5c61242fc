use super::Parser;

#[derive(Parser, Debug)]
pub struct Cli {
    /// Path to the TOML settings file.
    #[arg(long)]
    pub settings: Option<String>,
}
