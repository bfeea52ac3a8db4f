//! `brainproxy models`: print the upstream model list.

use anyhow::Result;
use futures::StreamExt;

use brainproxy::config::Config;
use brainproxy::cost::PriceTable;
use brainproxy::llm::{ModelCatalog, ModelFilter};

pub async fn run(config_path: &str, all: bool) -> Result<()> {
    let config = Config::load(config_path).await?;
    let provider = super::provider(&config)?;
    let filter = ModelFilter::new(config.proxy.blocked_model_markers.clone());
    let prices = PriceTable::with_overrides(&config.proxy.pricing);

    let mut models = ModelCatalog::new(provider).models();
    let mut shown = 0usize;
    while let Some(info) = models.next().await {
        let info = info?;
        if !all && !filter.is_listable(&info) {
            continue;
        }
        let name = info.display_name.as_deref().unwrap_or_default();
        println!("{:<40} {:<40} {}", info.id(), name, prices.label(info.id()));
        shown += 1;
    }

    if shown == 0 {
        println!("No models available");
    }
    Ok(())
}
