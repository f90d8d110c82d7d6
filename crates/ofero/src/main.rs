use std::path::Path;
use std::process;
use std::sync::Arc;

use tracing_subscriber::filter::LevelFilter;

use ofero::cache::{OcrCache, SqliteOcrCache};
use ofero::cli::{
    CacheArgs, CacheCommands, Cli, Commands, ExtractArgs, PagesArgs, TextArgs,
};
use ofero::config::{self, AppConfig};
use ofero::engine::{CriterionEngine, Outcome};
use ofero::error::AppError;
use ofero::locate::SearchSpec;
use ofero::ocr::{ChatVisionOcr, ChatVisionOcrConfig, VisionOcr};
use ofero::pdf::{PageSource, PdfiumPageSource};
use ofero::scan::{PageKind, classify, normalized_char_count};
use ofero::{display_page, hybrid::HybridExtractor};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    init_tracing(determine_log_level(&cli));

    if let Err(err) = run(cli).await {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

fn determine_log_level(cli: &Cli) -> LevelFilter {
    match cli.verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn init_tracing(level: LevelFilter) {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Some(Commands::Extract(args)) => run_extract(args).await,
        Some(Commands::Pages(args)) => run_pages(args).await,
        Some(Commands::Text(args)) => run_text(args).await,
        Some(Commands::Cache(args)) => run_cache(args).await,
        None => {
            Cli::print_help();
            Ok(())
        }
    }
}

async fn run_extract(args: ExtractArgs) -> Result<(), AppError> {
    let cfg = config::load()?;
    let engine = build_engine(&cfg, &args.input)?;
    let range = resolve_range(args.from_page, args.to_page, engine.page_count())?;

    let spec = SearchSpec {
        header_label: args.label,
        auto_increment: args.auto_increment,
        question_number: args.number,
    };

    match engine.extract_answer(&spec, Some(range)).await? {
        Outcome::Found(answer) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!(
                    "page {} ({})",
                    display_page(answer.source_page),
                    answer.confidence_note
                );
                println!();
                println!("{}", answer.paragraph_text);
            }
        }
        Outcome::NotFound => {
            println!("no matching section found");
        }
    }
    Ok(())
}

async fn run_pages(args: PagesArgs) -> Result<(), AppError> {
    let source = PdfiumPageSource::open(&args.input)?;
    println!("{} pages in {}", source.page_count(), args.input.display());
    println!("{:>5}  {:>6}  kind", "page", "chars");
    for page_index in 0..source.page_count() {
        let text = source.native_text(page_index)?;
        let chars = normalized_char_count(&text);
        let kind = match classify(&text) {
            PageKind::Native => "native",
            PageKind::Scanned => "scanned",
        };
        println!("{:>5}  {:>6}  {kind}", display_page(page_index), chars);
    }
    Ok(())
}

async fn run_text(args: TextArgs) -> Result<(), AppError> {
    let cfg = config::load()?;
    let extractor = build_extractor(&cfg, &args.input)?;
    let (start, end) = resolve_range(args.from_page, args.to_page, extractor.page_count())?;

    let range = extractor.text_for_range(start, end).await;
    for page in &range.pages {
        let origin = if page.is_scanned { "ocr" } else { "native" };
        println!("--- page {} ({origin}) ---", display_page(page.page_number));
        println!("{}", page.raw_text);
    }
    if let Some(failure) = range.failed {
        eprintln!(
            "stopped at page {}: {}",
            display_page(failure.page_number),
            failure.error
        );
        return Err(failure.error.into());
    }
    Ok(())
}

async fn run_cache(args: CacheArgs) -> Result<(), AppError> {
    let cfg = config::load()?;
    let cache = SqliteOcrCache::open(&cfg.cache.db_path)?;
    match args.command {
        CacheCommands::Stats => {
            let count = cache.count().await?;
            println!(
                "{count} cached transcription(s) in {}",
                cfg.cache.db_path.display()
            );
        }
        CacheCommands::Clear(clear) => {
            if !clear.yes {
                println!("refusing to clear without --yes");
                return Ok(());
            }
            let removed = cache.clear().await?;
            println!("removed {removed} cached transcription(s)");
        }
    }
    Ok(())
}

fn build_engine(cfg: &AppConfig, input: &Path) -> Result<CriterionEngine, AppError> {
    let (source, cache, ocr) = build_collaborators(cfg, input)?;
    Ok(CriterionEngine::new(
        source,
        cache,
        ocr,
        cfg.extraction.render_dpi,
    ))
}

fn build_extractor(cfg: &AppConfig, input: &Path) -> Result<HybridExtractor, AppError> {
    let (source, cache, ocr) = build_collaborators(cfg, input)?;
    Ok(HybridExtractor::new(
        source,
        cache,
        ocr,
        cfg.extraction.render_dpi,
    ))
}

type Collaborators = (
    Arc<dyn PageSource>,
    Arc<dyn OcrCache>,
    Option<Arc<dyn VisionOcr>>,
);

fn build_collaborators(cfg: &AppConfig, input: &Path) -> Result<Collaborators, AppError> {
    let source: Arc<dyn PageSource> = Arc::new(PdfiumPageSource::open(input)?);
    let cache: Arc<dyn OcrCache> = Arc::new(SqliteOcrCache::open(&cfg.cache.db_path)?);

    let ocr: Option<Arc<dyn VisionOcr>> = if cfg.ocr.is_configured() {
        let client = ChatVisionOcr::new(
            ChatVisionOcrConfig::builder()
                .base_url(cfg.ocr.base_url.clone())
                .api_key(cfg.ocr.api_key.clone())
                .model(cfg.ocr.model.clone())
                .max_completion_tokens(cfg.ocr.max_completion_tokens)
                .timeout_secs(cfg.ocr.timeout_secs)
                .build(),
        )?;
        Some(Arc::new(client))
    } else {
        tracing::debug!("no OCR provider configured; scanned pages will not be transcribed");
        None
    };

    Ok((source, cache, ocr))
}

/// Convert a 1-based inclusive page selection to the internal 0-based,
/// end-exclusive range, validating it against the document.
fn resolve_range(
    from_page: Option<usize>,
    to_page: Option<usize>,
    page_count: usize,
) -> Result<(usize, usize), AppError> {
    let from = from_page.unwrap_or(1);
    let to = to_page.unwrap_or(page_count.max(1));
    if from == 0 || from > to || to > page_count {
        return Err(AppError::InvalidPageRange {
            from,
            to,
            page_count,
        });
    }
    Ok((from - 1, to))
}
