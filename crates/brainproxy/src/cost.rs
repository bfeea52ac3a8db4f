//! Per-call pricing and the process-wide running total.

use serde::Deserialize;
use tokio::sync::Mutex;

use crate::llm::UsageMetadata;

const TOKENS_PER_UNIT: f64 = 1_000_000.0;

/// Price per million tokens for models whose id starts with `model`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PriceEntry {
    pub model: String,
    pub input: f64,
    pub output: f64,
}

impl PriceEntry {
    fn new(model: &str, input: f64, output: f64) -> Self {
        Self {
            model: model.to_string(),
            input,
            output,
        }
    }

    pub fn is_free(&self) -> bool {
        self.input == 0.0 && self.output == 0.0
    }
}

// ============================================================================
// PriceTable
// ============================================================================

/// Model prices keyed by name prefix.
#[derive(Debug, Clone)]
pub struct PriceTable {
    entries: Vec<PriceEntry>,
}

impl PriceTable {
    pub fn new(entries: Vec<PriceEntry>) -> Self {
        Self { entries }
    }

    /// Published Gemini prices (USD per million tokens).
    pub fn builtin() -> Self {
        Self::new(vec![
            PriceEntry::new("gemini-1.5-flash", 0.075, 0.30),
            PriceEntry::new("gemini-1.5-flash-8b", 0.0375, 0.15),
            PriceEntry::new("gemini-1.5-pro", 1.25, 5.00),
            PriceEntry::new("gemini-2.0-flash", 0.10, 0.40),
            PriceEntry::new("gemini-2.0-flash-exp", 0.0, 0.0),
            PriceEntry::new("gemini-2.0-flash-lite-preview-02-05", 0.075, 0.30),
            PriceEntry::new("gemini-exp-1206", 0.0, 0.0),
            PriceEntry::new("gemini-2.0-pro-exp-02-05", 0.0, 0.0),
        ])
    }

    /// Built-in table with `overrides` replacing or extending entries.
    pub fn with_overrides(overrides: &[PriceEntry]) -> Self {
        let mut table = Self::builtin();
        for entry in overrides {
            table.entries.retain(|e| e.model != entry.model);
            table.entries.push(entry.clone());
        }
        table
    }

    /// Entry with the longest key that prefixes `model`.
    pub fn lookup(&self, model: &str) -> Option<&PriceEntry> {
        self.entries
            .iter()
            .filter(|e| model.starts_with(e.model.as_str()))
            .max_by_key(|e| e.model.len())
    }

    /// Cost of one upstream call. Unknown models cost nothing.
    pub fn cost(&self, model: &str, usage: &UsageMetadata) -> f64 {
        let Some(price) = self.lookup(model) else {
            return 0.0;
        };
        if price.is_free() {
            return 0.0;
        }
        let input = usage.prompt_token_count as f64 / TOKENS_PER_UNIT * price.input;
        let output = usage.candidates_token_count as f64 / TOKENS_PER_UNIT * price.output;
        input + output
    }

    /// Human-readable label for model listings.
    pub fn label(&self, model: &str) -> String {
        match self.lookup(model) {
            None => "Price: Variable".to_string(),
            Some(p) if p.is_free() => "Price: Free (Beta)".to_string(),
            Some(p) => format!("${:.2}/1M tokens", p.input),
        }
    }
}

impl Default for PriceTable {
    fn default() -> Self {
        Self::builtin()
    }
}

// ============================================================================
// CostTracker
// ============================================================================

/// Running total across all requests since startup.
#[derive(Debug, Default)]
pub struct CostTracker {
    total: Mutex<f64>,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `amount` and return the new total.
    pub async fn add(&self, amount: f64) -> f64 {
        let mut total = self.total.lock().await;
        *total += amount;
        *total
    }

    pub async fn total(&self) -> f64 {
        *self.total.lock().await
    }
}
