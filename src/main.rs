//! Mask-preview REPL.
//!
//! Runs against the real data directory: rules registered here are the
//! rules the add-in uses. Plain lines echo their masked form; commands
//! manage the rule set.

use tokio::io::{AsyncBufReadExt, BufReader};

use sheet_assist::masking::{MaskingEngine, RuleStore};
use sheet_assist::paths::DataPaths;
use sheet_assist::settings::Settings;
use sheet_assist::templates::TemplateStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let paths = DataPaths::resolve();
    paths.ensure();
    let settings = Settings::load(&paths);
    let engine = MaskingEngine::open(RuleStore::with_legacy(
        paths.rules_file(),
        paths.legacy_rules_file(),
    ));
    let templates = TemplateStore::new(paths.templates_file());

    eprintln!("sheet-assist mask preview");
    eprintln!("   Data dir: {}", paths.root().display());
    eprintln!("   Model: {}", settings.model);
    eprintln!(
        "   API key: {}",
        if settings.api_key().is_some() {
            "configured"
        } else {
            "not set"
        }
    );
    eprintln!("   Rules loaded: {}", engine.rule_count());
    eprintln!("   :rule <original> <category> — register a rule");
    eprintln!("   :alias <original> <placeholder> — bind a variant spelling");
    eprintln!("   :rules | :templates | :quit");
    eprintln!("   Any other line prints its masked preview.\n");

    let stdin = tokio::io::stdin();
    let reader = BufReader::new(stdin);
    let mut lines = reader.lines();

    eprint!("> ");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            eprint!("> ");
            continue;
        }
        match line.split_once(' ').map_or((line, ""), |(c, rest)| (c, rest)) {
            (":quit", _) | (":q", _) => break,
            (":rules", _) => {
                for rule in engine.all_rules() {
                    println!("{} -> {}", rule.original, rule.placeholder);
                }
            }
            (":templates", _) => {
                for t in templates.load_all() {
                    println!("{}: {}", t.title, t.body);
                }
            }
            // rsplit: originals may contain spaces, the last word is the
            // category/placeholder.
            (":rule", rest) => match rest.rsplit_once(' ') {
                Some((original, category)) => match engine.add_rule(original, category) {
                    Some(placeholder) => println!("{original} -> {placeholder}"),
                    None => println!("already registered (or blank)"),
                },
                None => println!("usage: :rule <original> <category>"),
            },
            (":alias", rest) => match rest.rsplit_once(' ') {
                Some((original, placeholder)) => {
                    if engine.add_rule_with_placeholder(original, placeholder) {
                        println!("{original} -> {placeholder}");
                    } else {
                        println!("already registered (or blank)");
                    }
                }
                None => println!("usage: :alias <original> <placeholder>"),
            },
            _ => println!("{}", engine.mask(line)),
        }
        eprint!("> ");
    }

    Ok(())
}
