use clap::Subcommand;
use hearlab_core::{ApiClient, Config, HttpApiClient};

#[derive(Subcommand)]
pub enum BlockAction {
    /// Fetch a block and print it
    Show {
        /// Block slug
        slug: String,
        /// Print raw JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: BlockAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        BlockAction::Show { slug, json } => {
            let config = Config::load()?;
            let api = HttpApiClient::new(&config.api.base_url, config.api.timeout_secs)?;
            let runtime = tokio::runtime::Runtime::new()?;
            let block = runtime.block_on(api.get_block(&slug))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&block)?);
            } else {
                println!("Block: {} (id {})", block.slug, block.id);
                match block.session_id {
                    Some(id) => println!("Session: {id}"),
                    None => println!("Session: none"),
                }
                println!("Playlists: {}", block.playlists.len());
                for playlist in &block.playlists {
                    println!("  - {} (id {})", playlist.name, playlist.id);
                }
            }
        }
    }
    Ok(())
}
