use clap::Parser;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    #[arg(long, env = "PHANTOM_API_ADDR", default_value = "0.0.0.0:5000")]
    pub listen_addr: String,

    /// Directory holding the persisted JSON collections.
    #[arg(long, env = "PHANTOM_DATA_DIR", default_value = "data")]
    pub data_dir: String,

    /// Shared secret expected in the X-API-Key header. Authentication is
    /// disabled when unset.
    #[arg(long, env = "PHANTOM_API_KEY")]
    pub api_key: Option<String>,
}
