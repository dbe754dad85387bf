use std::path::Path;

use dataprep_notebooks::{census, init_tracing, NotebookConfig, CONFIG_FILE};

fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = NotebookConfig::load_or_default(Path::new(CONFIG_FILE))?;
    census::run(&config)
}
