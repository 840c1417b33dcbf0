//! Reusable skills distilled from successful transform runs
//!
//! When a run is marked for learning, the instruction, any mid-run
//! refinements, and the generated program (code mode) are persisted as a
//! named skill so later runs on similar data can start from it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::TargetSchema;

use super::config::TransformOutcome;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub doc_path: PathBuf,
    pub program_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

pub struct SkillGenerator {
    skills_dir: PathBuf,
}

impl SkillGenerator {
    pub fn new(skills_dir: impl Into<PathBuf>) -> Self {
        Self {
            skills_dir: skills_dir.into(),
        }
    }

    /// Persist a finished run as a skill under `<skills_dir>/<slug>/`
    pub fn save(
        &self,
        name: &str,
        instruction: &str,
        schema: &TargetSchema,
        outcome: &TransformOutcome,
        program_filename: &str,
    ) -> Result<Skill> {
        let slug = slugify(name);
        let skill_dir = self.skills_dir.join(&slug);
        std::fs::create_dir_all(&skill_dir)
            .with_context(|| format!("creating skill directory {}", skill_dir.display()))?;

        let program_path = match &outcome.assets.program {
            Some(source) => {
                let path = skill_dir.join(program_filename);
                std::fs::write(&path, source)
                    .with_context(|| format!("writing {}", path.display()))?;
                Some(path)
            }
            None => None,
        };

        let doc_path = skill_dir.join("SKILL.md");
        let doc = render_doc(name, instruction, schema, outcome, program_path.as_deref());
        std::fs::write(&doc_path, doc)
            .with_context(|| format!("writing {}", doc_path.display()))?;

        tracing::info!("Saved skill '{}' to {}", slug, skill_dir.display());
        Ok(Skill {
            name: slug,
            doc_path,
            program_path,
            created_at: Utc::now(),
        })
    }
}

fn render_doc(
    name: &str,
    instruction: &str,
    schema: &TargetSchema,
    outcome: &TransformOutcome,
    program_path: Option<&std::path::Path>,
) -> String {
    let mut doc = format!("# Skill: {}\n\n", name);
    doc.push_str(&format!(
        "Created: {}\nSchema: {} ({})\nItems produced: {}\n\n",
        Utc::now().format("%Y-%m-%d"),
        schema.name,
        outcome.manifest.schema_hash,
        outcome.manifest.item_count
    ));

    doc.push_str("## Instruction\n\n");
    doc.push_str(instruction);
    doc.push_str("\n\n");

    doc.push_str(&format!(
        "## Target schema\n\n```json\n{}\n```\n\n",
        serde_json::to_string_pretty(schema).unwrap_or_default()
    ));

    if !outcome.assets.refinements.is_empty() {
        doc.push_str("## Refinements\n\n");
        for refinement in &outcome.assets.refinements {
            doc.push_str(&format!("- {}\n", refinement));
        }
        doc.push('\n');
    }

    if let Some(path) = program_path {
        doc.push_str(&format!(
            "## Program\n\nSee `{}`.\n\n",
            path.file_name().unwrap_or_default().to_string_lossy()
        ));
    }

    if !outcome.manifest.sample.is_empty() {
        doc.push_str(&format!(
            "## Sample output\n\n```json\n{}\n```\n\n",
            serde_json::to_string_pretty(&outcome.manifest.sample).unwrap_or_default()
        ));
    }

    if let Some(text) = &outcome.assets.documentation {
        doc.push_str("## Notes\n\n");
        doc.push_str(text);
        doc.push('\n');
    }

    doc
}

/// Lowercase, alphanumerics kept, everything else collapsed to single dashes
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, FieldSpec};
    use crate::transform::config::{LearnedAssets, TransformConfig, TransformManifest};

    fn outcome(assets: LearnedAssets) -> TransformOutcome {
        let config = TransformConfig::new("/tmp/run");
        TransformOutcome {
            manifest: TransformManifest {
                run_id: config.run_id,
                artifact_path: "/tmp/run/artifact.json".into(),
                format: "json".to_string(),
                item_count: 2,
                schema_hash: "abc123".to_string(),
                validation_passed: true,
                validation_errors: 0,
                sample: vec![],
                created_at: Utc::now(),
            },
            items: vec![],
            assets,
            chunks: 1,
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Parse CRM export!"), "parse-crm-export");
        assert_eq!(slugify("  weird -- name  "), "weird-name");
    }

    #[test]
    fn test_save_writes_doc_and_program() {
        let dir = tempfile::tempdir().unwrap();
        let generator = SkillGenerator::new(dir.path());
        let schema = TargetSchema::new(
            "person",
            vec![FieldSpec::required("title", FieldKind::String)],
        );

        let assets = LearnedAssets {
            program: Some("print('hi')".to_string()),
            refinements: vec!["skip the header row".to_string()],
            documentation: None,
        };
        let skill = generator
            .save(
                "Parse CRM export",
                "Turn the CSV into person records",
                &schema,
                &outcome(assets),
                "transform.py",
            )
            .unwrap();

        assert_eq!(skill.name, "parse-crm-export");
        let doc = std::fs::read_to_string(&skill.doc_path).unwrap();
        assert!(doc.contains("Turn the CSV into person records"));
        assert!(doc.contains("skip the header row"));

        let program = std::fs::read_to_string(skill.program_path.unwrap()).unwrap();
        assert_eq!(program, "print('hi')");
    }

    #[test]
    fn test_save_without_program() {
        let dir = tempfile::tempdir().unwrap();
        let generator = SkillGenerator::new(dir.path());
        let schema = TargetSchema::new("person", vec![]);

        let skill = generator
            .save(
                "direct run",
                "instruction",
                &schema,
                &outcome(LearnedAssets::default()),
                "transform.py",
            )
            .unwrap();
        assert!(skill.program_path.is_none());
        assert!(skill.doc_path.exists());
    }
}
