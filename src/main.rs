use anyhow::Context;
use casegen_rs::casegen::{Case, CaseGenerator, GenerationRequest, Settings, TranslationCache};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Translation cache file (YAML), created if missing
    #[arg(long, global = true, default_value = "translations.yaml")]
    cache: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a case for a diagnosis
    Generate {
        /// Diagnosis the case is built around
        #[arg(short, long, required_unless_present = "request")]
        target: Option<String>,

        /// Read the whole request from a JSON file instead
        #[arg(short, long, conflicts_with = "target")]
        request: Option<PathBuf>,

        #[arg(long)]
        icd_code: Option<String>,

        /// Free-text context for every collaborator
        #[arg(long)]
        context: Option<String>,

        /// Case fields, comma separated
        #[arg(short, long, value_delimiter = ',')]
        fields: Vec<String>,

        /// Anamnesis categories, comma separated
        #[arg(long, value_delimiter = ',')]
        categories: Vec<String>,

        /// Output language
        #[arg(short, long)]
        language: Option<String>,
    },
    /// Translate an existing case file
    Translate {
        /// Case JSON file
        #[arg(short = 'i', long)]
        case: PathBuf,

        /// Target language
        #[arg(short, long)]
        language: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref()).context("failed to load settings")?;
    let cache = Arc::new(TranslationCache::load(&args.cache).await?);
    let generator = CaseGenerator::from_settings(&settings, cache.clone())?;

    let result = match args.command {
        Commands::Generate {
            target,
            request,
            icd_code,
            context,
            fields,
            categories,
            language,
        } => {
            let mut request = match (request, target) {
                (Some(path), _) => {
                    let content = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    serde_json::from_str::<GenerationRequest>(&content)
                        .with_context(|| format!("invalid request in {}", path.display()))?
                }
                (None, Some(target)) => GenerationRequest::new(target),
                (None, None) => anyhow::bail!("either --target or --request is required"),
            };
            if icd_code.is_some() {
                request.icd_code = icd_code;
            }
            if context.is_some() {
                request.context = context;
            }
            if !fields.is_empty() {
                request.fields = fields;
            }
            if !categories.is_empty() {
                request.categories = categories;
            }
            if language.is_some() {
                request.language = language;
            }
            generator.run(request).await
        }
        Commands::Translate { case, language } => {
            let content = std::fs::read_to_string(&case)
                .with_context(|| format!("failed to read {}", case.display()))?;
            let case: Case = serde_json::from_str(&content)?;
            match generator.translation() {
                Some(translation) => translation.translate(case, &language).await,
                None => anyhow::bail!("translation is not configured"),
            }
        }
    };

    // Labels fetched before a failure are still worth keeping
    if let Err(e) = cache.save(&args.cache).await {
        log::warn!("Failed to save translation cache: {}", e);
    }

    match result {
        Ok(case) => {
            println!("{}", serde_json::to_string_pretty(&case)?);
            Ok(())
        }
        Err(e) => {
            log::error!("{} ({}): {}", e.code(), e.status_code(), e);
            Err(e.into())
        }
    }
}
