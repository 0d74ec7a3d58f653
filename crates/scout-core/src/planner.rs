use crate::error::AppError;
use crate::models::{IdentifierMode, ProductInput, Provider, SearchConfig};

/// Fallback order, most specific identifier first.
pub const CANONICAL_ORDER: [SearchConfig; 8] = [
    SearchConfig::new(IdentifierMode::Barcode, Provider::Google),
    SearchConfig::new(IdentifierMode::Barcode, Provider::Yahoo),
    SearchConfig::new(IdentifierMode::Barcode, Provider::OpenAi),
    SearchConfig::new(IdentifierMode::Sku, Provider::Google),
    SearchConfig::new(IdentifierMode::Sku, Provider::Yahoo),
    SearchConfig::new(IdentifierMode::Sku, Provider::OpenAi),
    SearchConfig::new(IdentifierMode::TitleSku, Provider::Google),
    SearchConfig::bypassing(IdentifierMode::AllFields, Provider::OpenAi),
];

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// SKU-only configs are skipped for SKUs shorter than this.
    pub min_sku_length: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self { min_sku_length: 5 }
    }
}

/// Builds the ordered config queue for a product.
///
/// Pure: the same product and config always yield the same queue.
pub fn plan(product: &ProductInput, config: &PlannerConfig) -> Result<Vec<SearchConfig>, AppError> {
    let queue: Vec<SearchConfig> = CANONICAL_ORDER
        .iter()
        .copied()
        .filter(|c| is_applicable(c.mode, product, config))
        .collect();

    if queue.is_empty() {
        return Err(AppError::InvalidInput(
            "no usable identifier for any search strategy".into(),
        ));
    }
    Ok(queue)
}

fn is_applicable(mode: IdentifierMode, product: &ProductInput, config: &PlannerConfig) -> bool {
    match mode {
        IdentifierMode::Barcode => product.barcode().is_some(),
        IdentifierMode::Sku => product
            .sku()
            .is_some_and(|s| s.chars().count() >= config.min_sku_length),
        IdentifierMode::TitleSku => product.title().is_some(),
        IdentifierMode::AllFields => {
            product.barcode().is_some() || product.sku().is_some() || product.title().is_some()
        }
    }
}
