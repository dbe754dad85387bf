use std::path::Path;

use dataprep_notebooks::{init_tracing, taxi, NotebookConfig, CONFIG_FILE};

fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = NotebookConfig::load_or_default(Path::new(CONFIG_FILE))?;
    taxi::run(&config)
}
