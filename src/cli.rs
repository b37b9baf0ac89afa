use clap::{Args, Parser, Subcommand};
use log::warn;
use serde::Serialize;

use crate::engine::Engine;
use crate::error::Result;
use crate::fetch::ReqwestFetcher;
use crate::select::{clean_title, sequence_identifier};
use crate::types::{ApiResponse, FetchConfig, IdentifierMatch, SelectionPolicy};

#[derive(Parser)]
#[command(name = "mangrab", version, about = "Chapter resolution + metadata (JSON only)")]
pub struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a series or chapter URL to one concrete chapter URL
    Resolve(ResolveArgs),
    /// Chapter metadata: series, chapter, language, group, page count
    Info(UrlArgs),
    /// Per-page image URLs of a chapter
    Pages(UrlArgs),
}

#[derive(Args)]
struct ResolveArgs {
    /// Series or chapter URL. Chapter URLs pass through unchanged.
    url: String,
    /// Space-separated language priority list, e.g. "german english";
    /// "any" disables filtering
    #[arg(long)]
    language: Option<String>,
    /// Entry title naming the wanted chapter, e.g. "Bartender Vol.14 Ch.106".
    /// Without it the most recent upload wins.
    #[arg(long)]
    title: Option<String>,
}

#[derive(Args)]
struct UrlArgs {
    /// Chapter URL
    url: String,
    /// Space-separated language priority list (sent as the site's language
    /// cookie)
    #[arg(long)]
    language: Option<String>,
}

pub fn run() {
    env_logger::init();
    let cli = Cli::parse();

    let fetcher = match ReqwestFetcher::new() {
        Ok(f) => f,
        Err(e) => return print_json(&ApiResponse::<()>::err(e.to_string())),
    };

    match cli.cmd {
        Command::Resolve(args) => {
            let policy = build_policy(args.language.as_deref(), args.title.as_deref());
            let cfg = FetchConfig::for_languages(&policy.preferred_languages);
            let engine = Engine::new(&fetcher, cfg);
            finish(engine.resolve_chapter(&args.url, &policy));
        }
        Command::Info(args) => {
            let engine = engine_for(&fetcher, args.language.as_deref());
            finish(engine.chapter_info(&args.url));
        }
        Command::Pages(args) => {
            let engine = engine_for(&fetcher, args.language.as_deref());
            finish(engine.page_images(&args.url));
        }
    }
}

fn engine_for<'a>(fetcher: &'a ReqwestFetcher, language: Option<&str>) -> Engine<'a> {
    let policy = SelectionPolicy::from_language_config(language);
    Engine::new(fetcher, FetchConfig::for_languages(&policy.preferred_languages))
}

fn build_policy(language: Option<&str>, title: Option<&str>) -> SelectionPolicy {
    let mut policy = SelectionPolicy::from_language_config(language);
    if let Some(title) = title {
        let extract = sequence_identifier();
        match extract(&clean_title("", title)) {
            Some(target) => {
                policy.matcher = Some(IdentifierMatch {
                    series_name: String::new(), // the engine fills this in
                    target,
                    extract,
                });
            }
            // Same fallback the site's listing deserves anyway: newest wins.
            None => warn!(
                "could not parse a chapter identifier from {title:?}; selecting most recent upload"
            ),
        }
    }
    policy
}

fn finish<T: Serialize>(result: Result<T>) {
    match result {
        Ok(data) => print_json(&ApiResponse::ok(data)),
        Err(e) => print_json(&ApiResponse::<T>::err(e.to_string())),
    }
}

fn print_json<T: Serialize>(resp: &ApiResponse<T>) {
    println!(
        "{}",
        serde_json::to_string_pretty(resp).unwrap_or_else(|_| r#"{"ok":false}"#.into())
    );
}
