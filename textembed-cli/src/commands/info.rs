//! Info command - report tokenizer fields, session state and active options

use colored::Colorize;
use textembed::{EmbeddingPipeline, PipelineInfo};

use crate::output::{self, OutputFormat, TableDisplay};

impl TableDisplay for PipelineInfo {
    fn to_table(&self) -> String {
        let mut output = String::new();
        let options = &self.options;

        output.push_str(&format!("{}\n", "Pipeline".cyan().bold()));
        output.push_str(&format!(
            "  Model:          {}\n",
            self.model_id.as_deref().unwrap_or("-")
        ));
        output.push_str(&format!(
            "  Session:        {}\n",
            if self.session_loaded {
                "loaded".green()
            } else {
                "not loaded".red()
            }
        ));
        output.push_str(&format!(
            "  Tokenizer:      {}\n",
            if self.tokenizer_fields.is_empty() {
                "-".to_string()
            } else {
                self.tokenizer_fields.join(", ")
            }
        ));

        output.push_str(&format!("\n{}\n", "Options".cyan().bold()));
        output.push_str(&format!("  max_tokens:     {}\n", options.max_tokens));
        output.push_str(&format!("  show_special:   {}\n", options.show_special));
        output.push_str(&format!("  verbose:        {}\n", options.verbose));
        output.push_str(&format!(
            "  providers:      {}\n",
            options
                .execution_providers
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ));
        output.push_str(&format!("  external_data:  {}\n", options.external_data));
        output.push_str(&format!("  type_ids:       {}\n", options.include_type_ids));

        output
    }
}

/// Run the info command
pub async fn run(mut pipeline: EmbeddingPipeline, format: OutputFormat) -> anyhow::Result<()> {
    let info = pipeline.info().await;
    pipeline.release();

    output::print(&info, format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use textembed::EmbeddingOptions;

    #[test]
    fn test_info_table() {
        colored::control::set_override(false);
        let info = PipelineInfo {
            model_id: Some("mock/minilm".into()),
            tokenizer_fields: vec!["input_ids".into(), "attention_mask".into()],
            session_loaded: true,
            options: EmbeddingOptions::default(),
        };
        let table = info.to_table();
        assert!(table.contains("mock/minilm"));
        assert!(table.contains("loaded"));
        assert!(table.contains("input_ids, attention_mask"));
        assert!(table.contains("max_tokens:     512"));
        assert!(table.contains("providers:      cpu"));
    }
}
