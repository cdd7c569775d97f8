//! Runs one enrichment batch from the command line.
//!
//! Usage: `enrich_batch <file>` where the file holds one CNPJ per line. Progress
//! goes to stderr, each finished lead is printed to stdout as one JSON line.

use rust_cnpj_enrichment::config::Config;
use rust_cnpj_enrichment::models::{Lead, LogLevel};
use rust_cnpj_enrichment::orchestrator::{CallbackObserver, EnrichmentOrchestrator};
use tokio_util::sync::CancellationToken;

fn read_identifiers(contents: &str) -> Vec<Lead> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(Lead::new)
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_cnpj_enrichment=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: enrich_batch <file-with-one-cnpj-per-line>"))?;
    let contents = tokio::fs::read_to_string(&path).await?;
    let leads = read_identifiers(&contents);
    if leads.is_empty() {
        anyhow::bail!("{} contains no identifiers", path);
    }

    let config = Config::from_env()?;
    let orchestrator = EnrichmentOrchestrator::from_config(&config)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrompido, finalizando após a espera atual...");
            on_signal.cancel();
        }
    });

    let mut observer = CallbackObserver::new(
        |lead: Lead| match serde_json::to_string(&lead) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("Failed to serialize lead {}: {}", lead.cnpj, e),
        },
        |level: LogLevel, message: String| {
            let tag = match level {
                LogLevel::Info => "INFO",
                LogLevel::Success => " OK ",
                LogLevel::Warning => "WARN",
                LogLevel::Error => "ERRO",
            };
            eprintln!("[{}] {}", tag, message);
        },
    );

    let summary = orchestrator
        .process_batch(leads, &mut observer, None, cancel)
        .await;

    eprintln!(
        "Total {} | enriquecidos {} | falhas {} | ignorados {}{}",
        summary.total,
        summary.enriched,
        summary.failed,
        summary.skipped,
        if summary.aborted {
            " | interrompido (autenticação)"
        } else if summary.cancelled {
            " | cancelado"
        } else {
            ""
        }
    );

    if summary.aborted {
        std::process::exit(2);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_identifiers_skips_blank_and_comments() {
        let leads = read_identifiers("# lista\n11.222.333/0001-81\n\n  00000000000191  \n");
        let cnpjs: Vec<_> = leads.iter().map(|l| l.cnpj.as_str()).collect();
        assert_eq!(cnpjs, vec!["11.222.333/0001-81", "00000000000191"]);
    }
}
