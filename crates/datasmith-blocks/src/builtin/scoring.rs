//! Quality scoring blocks. Scores land in the context as numbers in `[0, 1]`
//! and never fail the run.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use datasmith_types::{Context, DatasmithError, Result};

use crate::block::{Block, BlockSchema};
use crate::config::BlockConfig;
use crate::metrics::{self, RougeVariant};
use crate::registry::BlockRegistration;
use crate::schema::{ConfigSchema, Param};

// ---------------------------------------------------------------------------
// CoherenceScore — average sentence length as a coherence proxy
// ---------------------------------------------------------------------------

/// Score sentence structure of a text field.
pub struct CoherenceScore {
    field_name: String,
}

impl CoherenceScore {
    pub const TYPE: &'static str = "CoherenceScore";

    pub fn from_config(config: &Map<String, Value>) -> Result<Self> {
        let config = BlockConfig::new(Self::TYPE, config.clone());
        Ok(Self {
            field_name: config.str_or("field_name", "assistant")?,
        })
    }

    pub fn registration() -> BlockRegistration {
        BlockRegistration::new(
            BlockSchema {
                block_type: Self::TYPE.to_string(),
                name: "Coherence Score".to_string(),
                description: "Score average sentence length of a text field".to_string(),
                inputs: vec![],
                outputs: vec!["coherence_score".to_string()],
                config_schema: Self::config_schema().to_value(),
                algorithm: None,
                paper: None,
            },
            |config| Ok(Box::new(Self::from_config(config)?)),
        )
    }

    fn config_schema() -> ConfigSchema {
        ConfigSchema::new().param(Param::string("field_name").default("assistant").field_reference())
    }

    fn score(text: &str) -> f64 {
        let sentences: Vec<&str> = text
            .split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if sentences.is_empty() {
            return 0.0;
        }
        let total_words: usize = sentences.iter().map(|s| s.split_whitespace().count()).sum();
        let average = total_words as f64 / sentences.len() as f64;
        (average / 20.0).min(1.0)
    }
}

#[async_trait]
impl Block for CoherenceScore {
    fn type_name(&self) -> &str {
        Self::TYPE
    }

    fn outputs(&self) -> &[&str] {
        &["coherence_score"]
    }

    async fn execute(&self, context: &Context) -> Result<Context> {
        let text = context.get_string(&self.field_name, "");
        let mut output = Context::new();
        output.insert("coherence_score", json!(Self::score(&text)));
        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// DiversityScore — pairwise dissimilarity of a text list
// ---------------------------------------------------------------------------

/// Score how different the texts in a list field are from each other.
pub struct DiversityScore {
    field_name: String,
}

impl DiversityScore {
    pub const TYPE: &'static str = "DiversityScore";

    pub fn from_config(config: &Map<String, Value>) -> Result<Self> {
        let config = BlockConfig::new(Self::TYPE, config.clone());
        Ok(Self {
            field_name: config.str_or("field_name", "assistant")?,
        })
    }

    pub fn registration() -> BlockRegistration {
        BlockRegistration::new(
            BlockSchema {
                block_type: Self::TYPE.to_string(),
                name: "Diversity Score".to_string(),
                description: "Score pairwise dissimilarity across a list of texts".to_string(),
                inputs: vec![],
                outputs: vec!["diversity_score".to_string()],
                config_schema: Self::config_schema().to_value(),
                algorithm: None,
                paper: None,
            },
            |config| Ok(Box::new(Self::from_config(config)?)),
        )
    }

    fn config_schema() -> ConfigSchema {
        ConfigSchema::new().param(Param::string("field_name").default("assistant").field_reference())
    }
}

#[async_trait]
impl Block for DiversityScore {
    fn type_name(&self) -> &str {
        Self::TYPE
    }

    fn outputs(&self) -> &[&str] {
        &["diversity_score"]
    }

    async fn execute(&self, context: &Context) -> Result<Context> {
        // anything but a list of at least two entries scores zero
        let score = match context.get(&self.field_name) {
            Some(Value::Array(items)) => {
                let texts: Vec<String> = items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect();
                metrics::mean_pairwise_diversity(&texts)
            }
            _ => 0.0,
        };

        let mut output = Context::new();
        output.insert("diversity_score", json!(score));
        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// RougeScore — overlap with a reference text
// ---------------------------------------------------------------------------

/// Score n-gram or subsequence overlap between generated and reference text.
#[derive(Debug)]
pub struct RougeScore {
    generated_field: String,
    reference_field: String,
    variant: RougeVariant,
}

impl RougeScore {
    pub const TYPE: &'static str = "RougeScore";

    pub fn from_config(config: &Map<String, Value>) -> Result<Self> {
        let config = BlockConfig::new(Self::TYPE, config.clone());
        let rouge_type = config.str_or("rouge_type", "rouge1")?;
        let variant = RougeVariant::parse(&rouge_type).ok_or_else(|| {
            DatasmithError::InvalidConfig {
                block_type: Self::TYPE.to_string(),
                message: format!(
                    "parameter 'rouge_type' must be one of rouge1, rouge2, rougeL, got '{rouge_type}'"
                ),
            }
        })?;
        Ok(Self {
            generated_field: config.str_or("generated_field", "assistant")?,
            reference_field: config.str_or("reference_field", "reference")?,
            variant,
        })
    }

    pub fn registration() -> BlockRegistration {
        BlockRegistration::new(
            BlockSchema {
                block_type: Self::TYPE.to_string(),
                name: "ROUGE Score".to_string(),
                description: "Score text overlap against a reference field".to_string(),
                inputs: vec![],
                outputs: vec!["rouge_score".to_string()],
                config_schema: Self::config_schema().to_value(),
                algorithm: None,
                paper: None,
            },
            |config| Ok(Box::new(Self::from_config(config)?)),
        )
    }

    fn config_schema() -> ConfigSchema {
        ConfigSchema::new()
            .param(Param::string("generated_field").default("assistant").field_reference())
            .param(Param::string("reference_field").default("reference").field_reference())
            .param(
                Param::string("rouge_type")
                    .default("rouge1")
                    .choices(&["rouge1", "rouge2", "rougeL"]),
            )
    }
}

#[async_trait]
impl Block for RougeScore {
    fn type_name(&self) -> &str {
        Self::TYPE
    }

    fn outputs(&self) -> &[&str] {
        &["rouge_score"]
    }

    async fn execute(&self, context: &Context) -> Result<Context> {
        let generated = context.get_string(&self.generated_field, "");
        let reference = context.get_string(&self.reference_field, "");
        let score = if generated.is_empty() || reference.is_empty() {
            0.0
        } else {
            metrics::rouge_f_measure(self.variant, &generated, &reference)
        };

        let mut output = Context::new();
        output.insert("rouge_score", json!(score));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    fn context_with(key: &str, value: Value) -> Context {
        let mut context = Context::new();
        context.insert(key, value);
        context
    }

    fn score_of(output: &Context, key: &str) -> f64 {
        output.get(key).and_then(Value::as_f64).unwrap()
    }

    // --- CoherenceScore ---

    #[tokio::test]
    async fn empty_field_scores_zero_coherence() {
        let block = CoherenceScore::from_config(&Map::new()).unwrap();
        let output = block.execute(&Context::new()).await.unwrap();
        assert_eq!(score_of(&output, "coherence_score"), 0.0);
    }

    #[tokio::test]
    async fn average_sentence_length_drives_the_score() {
        let block = CoherenceScore::from_config(&Map::new()).unwrap();
        // two sentences of five words each: 5 / 20 = 0.25
        let text = "one two three four five. six seven eight nine ten.";
        let output = block.execute(&context_with("assistant", json!(text))).await.unwrap();
        assert!((score_of(&output, "coherence_score") - 0.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn coherence_is_capped_at_one() {
        let block = CoherenceScore::from_config(&Map::new()).unwrap();
        let text = format!("{}.", "word ".repeat(50).trim());
        let output = block.execute(&context_with("assistant", json!(text))).await.unwrap();
        assert_eq!(score_of(&output, "coherence_score"), 1.0);
    }

    #[tokio::test]
    async fn punctuation_only_text_scores_zero() {
        let block = CoherenceScore::from_config(&Map::new()).unwrap();
        let output = block.execute(&context_with("assistant", json!("..."))).await.unwrap();
        assert_eq!(score_of(&output, "coherence_score"), 0.0);
    }

    // --- DiversityScore ---

    #[tokio::test]
    async fn non_list_fields_score_zero_diversity() {
        let block = DiversityScore::from_config(&Map::new()).unwrap();
        let output = block
            .execute(&context_with("assistant", json!("just a string")))
            .await
            .unwrap();
        assert_eq!(score_of(&output, "diversity_score"), 0.0);
    }

    #[tokio::test]
    async fn single_entry_lists_score_zero_diversity() {
        let block = DiversityScore::from_config(&Map::new()).unwrap();
        let output = block.execute(&context_with("assistant", json!(["only"]))).await.unwrap();
        assert_eq!(score_of(&output, "diversity_score"), 0.0);
    }

    #[tokio::test]
    async fn dissimilar_lists_score_positive_diversity() {
        let config = make_config(json!({"field_name": "variants"}));
        let block = DiversityScore::from_config(&config).unwrap();
        let output = block
            .execute(&context_with("variants", json!(["aaaa", "zzzz"])))
            .await
            .unwrap();
        assert!((score_of(&output, "diversity_score") - 1.0).abs() < 1e-9);
    }

    // --- RougeScore ---

    #[tokio::test]
    async fn missing_either_side_scores_zero_rouge() {
        let block = RougeScore::from_config(&Map::new()).unwrap();
        let output = block
            .execute(&context_with("assistant", json!("generated text")))
            .await
            .unwrap();
        assert_eq!(score_of(&output, "rouge_score"), 0.0);
    }

    #[tokio::test]
    async fn unigram_overlap_scores_between_zero_and_one() {
        let block = RougeScore::from_config(&Map::new()).unwrap();
        let mut context = Context::new();
        context.insert("assistant", json!("the cat sat"));
        context.insert("reference", json!("the cat ran"));
        let output = block.execute(&context).await.unwrap();
        assert!((score_of(&output, "rouge_score") - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn rouge_variant_and_fields_are_configurable() {
        let config = make_config(json!({
            "rouge_type": "rougeL",
            "generated_field": "summary",
            "reference_field": "gold",
        }));
        let block = RougeScore::from_config(&config).unwrap();
        let mut context = Context::new();
        context.insert("summary", json!("alpha beta gamma"));
        context.insert("gold", json!("alpha beta gamma"));
        let output = block.execute(&context).await.unwrap();
        assert_eq!(score_of(&output, "rouge_score"), 1.0);
    }

    #[test]
    fn unknown_rouge_type_is_an_invalid_config() {
        let config = make_config(json!({"rouge_type": "rougeW"}));
        let err = RougeScore::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("rouge_type"));
    }
}
