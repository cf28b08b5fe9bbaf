//! Embed command - print the embedding vector for each input text

use std::time::Instant;

use colored::Colorize;
use serde::Serialize;
use tabled::{builder::Builder, settings::Style};
use textembed::EmbeddingPipeline;

use crate::output::{self, OutputFormat, TableDisplay};

const PREVIEW_VALUES: usize = 4;

/// One embedded text
#[derive(Debug, Serialize)]
pub struct TextEmbedding {
    pub text: String,
    pub dimension: usize,
    pub norm: f32,
    pub duration_ms: u64,
    pub embedding: Vec<f32>,
}

/// Result of the embed command
#[derive(Debug, Serialize)]
pub struct EmbedResult {
    pub model: String,
    pub embeddings: Vec<TextEmbedding>,
}

fn l2_norm(values: &[f32]) -> f32 {
    values.iter().map(|v| v * v).sum::<f32>().sqrt()
}

fn preview(values: &[f32]) -> String {
    let head: Vec<String> = values
        .iter()
        .take(PREVIEW_VALUES)
        .map(|v| format!("{:.4}", v))
        .collect();
    if values.len() > PREVIEW_VALUES {
        format!("[{}, ...]", head.join(", "))
    } else {
        format!("[{}]", head.join(", "))
    }
}

impl TableDisplay for EmbedResult {
    fn to_table(&self) -> String {
        let mut builder = Builder::default();
        builder.push_record(["Text", "Dim", "Norm", "Time", "Values"]);
        for item in &self.embeddings {
            builder.push_record([
                item.text.clone(),
                item.dimension.to_string(),
                format!("{:.4}", item.norm),
                format!("{}ms", item.duration_ms),
                preview(&item.embedding),
            ]);
        }

        let mut table = builder.build();
        table.with(Style::rounded());

        format!(
            "{} {}\n{}",
            "Model:".cyan().bold(),
            self.model,
            table
        )
    }
}

/// Embed every text in order, stopping at the first failure.
pub async fn embed_all(
    pipeline: &EmbeddingPipeline,
    model: &str,
    texts: &[String],
) -> anyhow::Result<EmbedResult> {
    let mut embeddings = Vec::with_capacity(texts.len());
    for text in texts {
        let start = Instant::now();
        let embedding = pipeline.embed(text).await?;
        embeddings.push(TextEmbedding {
            text: text.clone(),
            dimension: embedding.len(),
            norm: l2_norm(&embedding),
            duration_ms: start.elapsed().as_millis() as u64,
            embedding,
        });
    }

    Ok(EmbedResult {
        model: model.to_string(),
        embeddings,
    })
}

/// Run the embed command
pub async fn run(
    mut pipeline: EmbeddingPipeline,
    model: &str,
    texts: &[String],
    format: OutputFormat,
) -> anyhow::Result<()> {
    let result = embed_all(&pipeline, model, texts).await;
    pipeline.release();

    output::print(&result?, format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_norm() {
        assert!((l2_norm(&[3.0, 4.0]) - 5.0).abs() < 1e-6);
        assert_eq!(l2_norm(&[]), 0.0);
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview(&[1.0, 2.0]), "[1.0000, 2.0000]");
        assert_eq!(
            preview(&[1.0, 2.0, 3.0, 4.0, 5.0]),
            "[1.0000, 2.0000, 3.0000, 4.0000, ...]"
        );
    }

    #[test]
    fn test_table_lists_texts() {
        colored::control::set_override(false);
        let result = EmbedResult {
            model: "mock/minilm".into(),
            embeddings: vec![TextEmbedding {
                text: "hi".into(),
                dimension: 4,
                norm: 2.0,
                duration_ms: 3,
                embedding: vec![1.0; 4],
            }],
        };
        let table = result.to_table();
        assert!(table.contains("Model: mock/minilm"));
        assert!(table.contains("hi"));
        assert!(table.contains("2.0000"));
    }
}
