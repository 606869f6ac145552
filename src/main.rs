use anyhow::Result;
use clap::{Parser, Subcommand};
use stac_crawler::banner::Hero;
use stac_crawler::catalog_plan::{
    clear_catalog_directory, copy_layer_metadata, find_json_files, render_tree, save_json,
    CatalogPlan, CrawlSummary, SUMMARY_FILE,
};
use stac_crawler::config::{catalog_toml, CatalogConfig, UploadMethod};
use stac_crawler::crawl::crawl;
use stac_crawler::error::CatalogError;
use stac_crawler::layer_metadata::LayerMetadata;
use stac_crawler::stac_operations::CATALOG_FILE;
use stac_crawler::storage::{client_from_profile, BucketUrl, Lister};
use stac_crawler::upload::{
    browser_links, plan_uploads, run_uploads, AnyUploader, GsutilUploader, S3Uploader,
};
use stac_crawler::verify::verify_catalog;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Crawl a storage bucket and publish a STAC catalog of its geospatial files")]
struct Cli {
    /// Path to the TOML configuration
    #[arg(short, long, default_value = "catalog.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a starter configuration file
    Template {
        #[arg(short, long, default_value = "catalog.toml")]
        output: PathBuf,
    },
    /// Crawl the bucket and write catalog, collection and item documents
    Generate {
        #[arg(long)]
        bucket: Option<String>,
        #[arg(long)]
        prefix: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Remove existing JSON files from the output directory first
        #[arg(long)]
        clear: bool,
        /// Also save the document plan to this path
        #[arg(long)]
        plan: Option<PathBuf>,
        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Write the documents of a previously saved plan
    Apply {
        plan: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Copy the generated catalog to the bucket
    Upload {
        /// Local catalog directory
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Destination such as gs://bucket/prefix/
        #[arg(long)]
        destination: Option<String>,
        #[arg(long)]
        dry_run: bool,
        #[arg(short, long)]
        yes: bool,
    },
    /// Read back a generated catalog and check its links
    Verify {
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Render the landing page banner
    Banner {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        subtitle: Option<String>,
        #[arg(long)]
        background: Option<String>,
        #[arg(long, default_value = CATALOG_FILE)]
        catalog_href: String,
        #[arg(short, long, default_value = "index.html")]
        output: PathBuf,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} (y/N): ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn clear_output(dir: &Path, yes: bool) -> Result<()> {
    if !dir.exists() {
        info!("Catalog directory '{}' does not exist", dir.display());
        return Ok(());
    }
    let files = find_json_files(dir)?;
    if files.is_empty() {
        info!("No JSON files found in '{}'", dir.display());
        return Ok(());
    }

    println!("Found {} JSON files to remove:", files.len());
    for file in files.iter().take(10) {
        println!("  - {}", file.display());
    }
    if files.len() > 10 {
        println!("  ... and {} more files", files.len() - 10);
    }
    if !yes && !confirm("Delete all these JSON files?")? {
        println!("Operation cancelled.");
        return Ok(());
    }

    let removed = clear_catalog_directory(dir, &files)?;
    println!("Removed {removed} JSON files from {}", dir.display());
    Ok(())
}

async fn generate(
    mut config: CatalogConfig,
    bucket: Option<String>,
    prefix: Option<String>,
    output: Option<PathBuf>,
    clear: bool,
    plan_path: Option<PathBuf>,
    yes: bool,
) -> Result<()> {
    if let Some(bucket) = bucket {
        config.bucket.name = bucket;
    }
    if let Some(prefix) = prefix {
        config.bucket.prefix = prefix;
    }
    let out_dir = output.unwrap_or_else(|| config.output.dir.clone());

    if clear {
        clear_output(&out_dir, yes)?;
    }

    let lister = Lister::from_config(&config).await?;
    let prefix = config.crawl_prefix();
    let result = crawl(&lister, &config.bucket.name, &config.bucket_url(), &prefix).await?;
    if result.items.is_empty() {
        return Err(CatalogError::NoAssetsFound {
            bucket: config.bucket.name.clone(),
            prefix,
        }
        .into());
    }

    let (metadata, metadata_asset) = match &config.output.layer_metadata {
        Some(path) => (
            LayerMetadata::read_or_default(path),
            copy_layer_metadata(path, &out_dir)?,
        ),
        None => (LayerMetadata::default(), false),
    };

    let plan = CatalogPlan::from_crawl(&config, &result, &metadata, metadata_asset)?;
    if let Some(plan_path) = plan_path {
        plan.write(&plan_path)?;
        info!("Plan saved to {}", plan_path.display());
    }
    plan.execute(&out_dir)?;

    let summary = CrawlSummary::new(&result, &plan);
    save_json(&summary, &out_dir.join(SUMMARY_FILE))?;

    println!("Catalog generation complete");
    println!("  Master catalog: {}", out_dir.join(CATALOG_FILE).display());
    println!("  Collections: {}", summary.crawl_summary.collections_generated);
    println!("  Items: {}", summary.crawl_summary.stac_items_generated);
    println!();
    print!("{}", render_tree(&result.tree));
    println!();
    println!("Root catalog will be published at {}{}", config.root_url(), CATALOG_FILE);
    Ok(())
}

async fn upload(
    config: CatalogConfig,
    catalog: Option<PathBuf>,
    destination: Option<String>,
    dry_run: bool,
    yes: bool,
) -> Result<()> {
    let root = catalog.unwrap_or_else(|| config.output.dir.clone());
    let (bucket, prefix) = match destination {
        Some(destination) => {
            let url = BucketUrl::from_url(&destination)?;
            let prefix = stac_crawler::config::normalize_prefix(&url.key);
            (url.bucket, prefix)
        }
        None => (config.bucket.name.clone(), config.upload_prefix()),
    };

    let tasks = plan_uploads(&root, &bucket, &prefix)?;
    if tasks.is_empty() {
        println!("No JSON files found to upload");
        return Ok(());
    }

    let uploader = match config.upload.method {
        UploadMethod::Gsutil => AnyUploader::Gsutil(GsutilUploader::new(
            &config.upload.tool,
            &config.upload.cache_control,
            Duration::from_secs(config.upload.timeout_secs),
        )),
        UploadMethod::S3 => {
            let client = client_from_profile(
                config.bucket.profile.as_deref(),
                config.bucket.endpoint.as_deref(),
            )
            .await;
            AnyUploader::S3(S3Uploader::new(client, &config.upload.cache_control))
        }
    };

    let preview = run_uploads(&uploader, &tasks, true).await?;
    println!("{}", preview.summary());
    if dry_run {
        return Ok(());
    }
    if !yes && !confirm("Proceed with the actual upload?")? {
        println!("Upload cancelled.");
        return Ok(());
    }

    let report = run_uploads(&uploader, &tasks, false).await?;
    println!("{}", report.summary());
    if !report.uploaded.is_empty() {
        println!("Cache-Control set to '{}'", config.upload.cache_control);
        println!("View on STAC Browser:");
        for (label, url) in browser_links(&report, &bucket, &prefix) {
            println!("  {label}: {url}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Template { output } => {
            CatalogConfig::from_template(&catalog_toml())?.write(&output)?;
            println!("Wrote {}", output.display());
        }
        Commands::Generate {
            bucket,
            prefix,
            output,
            clear,
            plan,
            yes,
        } => {
            let config = CatalogConfig::read(&cli.config)?;
            generate(config, bucket, prefix, output, clear, plan, yes).await?;
        }
        Commands::Apply { plan, output } => {
            let config = CatalogConfig::read(&cli.config)?;
            let out_dir = output.unwrap_or(config.output.dir);
            let written = CatalogPlan::read(&plan)?.execute(&out_dir)?;
            println!("Wrote {written} documents to {}", out_dir.display());
        }
        Commands::Upload {
            catalog,
            destination,
            dry_run,
            yes,
        } => {
            let config = CatalogConfig::read(&cli.config)?;
            upload(config, catalog, destination, dry_run, yes).await?;
        }
        Commands::Verify { catalog } => {
            let config = CatalogConfig::read(&cli.config)?;
            let dir = catalog.unwrap_or_else(|| config.output.dir.clone());
            let report = verify_catalog(&dir, &config.root_url())?;
            println!(
                "{} catalogs, {} collections, {} items",
                report.catalogs, report.collections, report.items
            );
            for (path, error) in report.invalid.iter() {
                println!("  invalid {path}: {error}");
            }
            for link in report.broken_links.iter() {
                println!("  broken {} link in {}: {}", link.rel, link.document, link.href);
            }
            if !report.is_ok() {
                anyhow::bail!("Catalog in {} has problems", dir.display());
            }
        }
        Commands::Banner {
            title,
            subtitle,
            background,
            catalog_href,
            output,
        } => {
            let hero = Hero::new(title, subtitle, background);
            std::fs::write(&output, hero.render_page(&catalog_href))?;
            println!("Wrote {}", output.display());
        }
    }

    Ok(())
}
