use std::path::Path;

use mpp_api::state::unmapped_labels;
use mpp_api::ApiConfig;
use mpp_vision::{load_labels, CategoryMapper};

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = ApiConfig::from_env();

    println!(
        "api-selfcheck: starting with model={}",
        config.model.path.display()
    );
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    let mapper = CategoryMapper::load(config.category_table_path.as_deref())?;
    println!(
        "api-selfcheck: category table {} ({} labels)",
        mapper.version(),
        mapper.len()
    );

    ensure_file(&config.model.path)?;
    let labels = load_labels(&config.model.labels_path)?;
    ensure_labels_mapped(&mapper, &labels)?;

    println!("api-selfcheck: ok");
    Ok(())
}

fn ensure_file(path: &Path) -> anyhow::Result<()> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| anyhow::anyhow!("{} not available: {}", path.display(), e))?;
    if metadata.len() == 0 {
        return Err(anyhow::anyhow!("{} is empty", path.display()));
    }
    Ok(())
}

fn ensure_labels_mapped(mapper: &CategoryMapper, labels: &[String]) -> anyhow::Result<()> {
    let unmapped = unmapped_labels(labels, mapper);
    if !unmapped.is_empty() {
        return Err(anyhow::anyhow!(
            "{} model labels have no category: {}",
            unmapped.len(),
            unmapped.join(", ")
        ));
    }
    Ok(())
}
