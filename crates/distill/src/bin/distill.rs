// ABOUTME: CLI binary for the distill article extractor.
// ABOUTME: Extracts URLs or local HTML files and prints the rendered body or the JSON result.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use digests_distill::{load_builtin_profiles, load_ftr_dir, Client, ContentType, ExtractionResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "distill")]
#[command(about = "Extract the article from web pages")]
struct Args {
    /// Output format: html (default), markdown/md, text/txt
    #[arg(short = 'f', long = "format", default_value = "html")]
    format: String,

    /// Output file path (default: stdout)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Output the full result as JSON instead of the rendered body
    #[arg(long = "json")]
    json_output: bool,

    /// HTML file to extract from (requires --url)
    #[arg(long = "html")]
    html: Option<PathBuf>,

    /// Page URL for --html: keys the profile lookup and resolves links
    #[arg(long = "url")]
    url: Option<String>,

    /// Allow fetching from private/local networks
    #[arg(long = "allow-private-networks")]
    allow_private_networks: bool,

    /// Do not follow next-page links
    #[arg(long = "no-paginate")]
    no_paginate: bool,

    /// Maximum pages per article, the first included
    #[arg(long = "max-pages")]
    max_pages: Option<usize>,

    /// Directory of <host>.txt site-config files to add to the built-in profiles
    #[arg(long = "profiles")]
    profiles: Option<PathBuf>,

    /// Base URL of a remote site-config service
    #[arg(long = "profile-service")]
    profile_service: Option<String>,

    /// Log progress to stderr (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// URLs to extract (fetch mode)
    #[arg()]
    urls: Vec<String>,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "digests_distill=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into());
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Rendered body(ies), or the JSON result(s).
fn format_output(
    results: &[ExtractionResult],
    content_type: ContentType,
    json_output: bool,
) -> Result<String, serde_json::Error> {
    if json_output {
        if results.len() == 1 {
            serde_json::to_string_pretty(&results[0])
        } else {
            serde_json::to_string_pretty(results)
        }
    } else {
        Ok(results
            .iter()
            .map(|r| r.render(content_type))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

fn build_client(args: &Args, content_type: ContentType) -> Result<Client, String> {
    let mut builder = Client::builder()
        .content_type(content_type)
        .allow_private_networks(args.allow_private_networks)
        .follow_pagination(!args.no_paginate);
    if let Some(max_pages) = args.max_pages {
        builder = builder.max_pages(max_pages);
    }
    if let Some(ref service) = args.profile_service {
        builder = builder.profile_service(service.clone());
    }
    if let Some(ref dir) = args.profiles {
        let mut table = load_builtin_profiles();
        let loaded = load_ftr_dir(&mut table, dir).map_err(|e| format!("{:#}", e))?;
        tracing::info!(loaded, dir = %dir.display(), "loaded site-config files");
        builder = builder.profiles(table);
    }
    Ok(builder.build())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    if args.html.is_some() && args.url.is_none() {
        eprintln!("error: --url is required when using --html");
        return ExitCode::from(1);
    }

    if args.html.is_none() && args.urls.is_empty() {
        eprintln!("error: at least one URL is required, or use --html with --url");
        return ExitCode::from(1);
    }

    if args.html.is_some() && !args.urls.is_empty() {
        eprintln!("error: cannot use both --html and positional URLs");
        return ExitCode::from(1);
    }

    let content_type = ContentType::from(args.format.as_str());
    let client = match build_client(&args, content_type) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("error loading profiles: {}", e);
            return ExitCode::from(1);
        }
    };

    let mut results: Vec<ExtractionResult> = Vec::new();
    let mut had_error = false;

    if let (Some(html_path), Some(url)) = (&args.html, &args.url) {
        match fs::read_to_string(html_path) {
            Ok(html_content) => match client.extract_html(&html_content, url).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    eprintln!("error extracting HTML: {}", e);
                    had_error = true;
                }
            },
            Err(e) => {
                eprintln!("error reading file {:?}: {}", html_path, e);
                had_error = true;
            }
        }
    } else {
        for url in &args.urls {
            match client.extract(url).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    eprintln!("error extracting {}: {}", url, e);
                    had_error = true;
                }
            }
        }
    }

    if !results.is_empty() {
        match format_output(&results, content_type, args.json_output) {
            Ok(output_str) => {
                if let Some(output_path) = &args.output {
                    if let Err(e) = fs::write(output_path, &output_str) {
                        eprintln!("error writing to {:?}: {}", output_path, e);
                        had_error = true;
                    }
                } else {
                    println!("{}", output_str);
                }
            }
            Err(e) => {
                eprintln!("error serializing result: {}", e);
                had_error = true;
            }
        }
    }

    if had_error {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}
