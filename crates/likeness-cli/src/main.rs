use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use likeness_core::{ImageView, TemplatePipeline, TemplateRecord, TemplateRole};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "likeness", about = "Face template creation and 1:1 matching")]
struct Cli {
    /// Directory with the model files and an optional likeness.toml
    #[arg(short, long, default_value = "models", global = true)]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Role {
    Enrollment,
    Verification,
}

impl From<Role> for TemplateRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Enrollment => TemplateRole::Enrollment,
            Role::Verification => TemplateRole::Verification,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build a template from one or more face images
    Template {
        /// Input images (any format the image crate decodes)
        images: Vec<PathBuf>,
        /// Where to write the 2048-byte template
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, value_enum, default_value = "enrollment")]
        role: Role,
    },
    /// Score two template files against each other
    Match {
        a: PathBuf,
        b: PathBuf,
        /// Emit the score as JSON instead of plain text
        #[arg(long)]
        json: bool,
    },
    /// Build a probe template from images and score it against a stored one
    Verify {
        images: Vec<PathBuf>,
        /// Template file to compare against
        #[arg(long)]
        against: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Template { images, output, role } => {
            let record = build_template(&cli.config_dir, &images, role.into())?;
            report_record(&record);
            fs::write(&output, &record.template)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("template written to {}", output.display());
        }
        Commands::Match { a, b, json } => {
            let ta = read_template(&a)?;
            let tb = read_template(&b)?;
            let score = TemplatePipeline::match_templates(&ta, &tb)?;
            print_score(score, json);
        }
        Commands::Verify { images, against, json } => {
            let record = build_template(&cli.config_dir, &images, TemplateRole::Verification)?;
            report_record(&record);
            let gallery = read_template(&against)?;
            let score = TemplatePipeline::match_templates(&record.template, &gallery)?;
            print_score(score, json);
        }
    }

    Ok(())
}

fn build_template(
    config_dir: &Path,
    paths: &[PathBuf],
    role: TemplateRole,
) -> Result<TemplateRecord> {
    if paths.is_empty() {
        bail!("no input images given");
    }

    let mut pipeline = TemplatePipeline::initialize(config_dir)?;

    let mut buffers = Vec::with_capacity(paths.len());
    for path in paths {
        let decoded = image::open(path)
            .with_context(|| format!("decoding {}", path.display()))?
            .to_rgb8();
        tracing::debug!(path = %path.display(), width = decoded.width(), height = decoded.height(), "image loaded");
        buffers.push((
            decoded.width() as usize,
            decoded.height() as usize,
            decoded.into_raw(),
        ));
    }

    let views: Vec<ImageView<'_>> = buffers
        .iter()
        .map(|(w, h, data)| ImageView::new(*w, *h, 3, data))
        .collect();

    Ok(pipeline.create_template(&views, role))
}

fn report_record(record: &TemplateRecord) {
    if record.has_face() {
        for (i, eyes) in record.eyes.iter().enumerate() {
            println!(
                "image {i}: eyes at ({}, {}) / ({}, {})",
                eyes.left_x, eyes.left_y, eyes.right_x, eyes.right_y
            );
        }
    } else {
        tracing::warn!("no usable face in any input image; template is the zero sentinel");
    }
}

fn read_template(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn print_score(score: f64, json: bool) {
    if json {
        println!("{}", serde_json::json!({ "similarity": score }));
    } else {
        println!("similarity: {score:.3}");
    }
}
