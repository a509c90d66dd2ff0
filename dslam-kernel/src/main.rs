/**
 * DSLAM KERNEL - Point d'entrée du binaire
 *
 * RÔLE : Bootstrap (.env, logs, configuration, stockage) puis lancement d'un mode :
 * - complete        : collecte + tests de connectivité + statistiques (défaut)
 * - retest [max]    : nouveau test des DSLAM non fonctionnels
 * - report [dept]   : rapport détaillé JSON sur la sortie standard
 *
 * Ctrl-C demande l'arrêt après le lot en cours.
 */

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dslam_kernel::{
    load_config, CancelFlag, JsonFeed, JsonStore, Pipeline, SystemRunner,
};

#[derive(Debug, PartialEq, Eq)]
enum Mode {
    Complete,
    Retest(Option<usize>),
    Report(Option<String>),
}

fn parse_mode<I, S>(args: I) -> Result<Mode>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_string()).collect();
    match args.first().map(String::as_str) {
        None | Some("complete") => Ok(Mode::Complete),
        Some("retest") => match args.get(1) {
            Some(max) => {
                let max = max
                    .parse::<usize>()
                    .with_context(|| format!("invalid retest count: {max}"))?;
                Ok(Mode::Retest(Some(max)))
            }
            None => Ok(Mode::Retest(None)),
        },
        Some("report") => Ok(Mode::Report(args.get(1).cloned())),
        Some(other) => bail!("unknown mode `{other}` (expected complete, retest [max] or report [department])"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dslam_kernel=info")),
        )
        .init();

    let mode = parse_mode(std::env::args().skip(1))?;
    let config = load_config().await;

    let store = JsonStore::open(&config.data_dir)
        .with_context(|| format!("cannot open data directory {}", config.data_dir.display()))?;
    let store = Arc::new(store);

    let cancel = CancelFlag::new();
    let signal_flag = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_flag.cancel();
            warn!("cancellation requested (Ctrl-C), stopping after the current batch");
        }
    });

    let pipeline = Pipeline::new(config.clone(), store, Arc::new(SystemRunner), cancel);

    let outcome = match mode {
        Mode::Complete => {
            let feed = JsonFeed::load(&config.inventory_file)
                .await
                .with_context(|| format!("cannot load inventory {}", config.inventory_file.display()))?;
            let report = pipeline.with_feed(Arc::new(feed)).run_complete().await;
            report.map(|r| {
                let q = r.statistics.quality;
                info!(
                    "quality: {} excellent, {} good, {} poor, {} unavailable",
                    q.excellent, q.good, q.poor, q.unavailable
                );
                for dept in r.statistics.struggling_departments(50) {
                    warn!(
                        "department {} below 50%: {}% ({}/{})",
                        dept.key, dept.reachability_rate, dept.reachable_count, dept.device_count
                    );
                }
            })
        }
        Mode::Retest(max) => pipeline.retest_failed(max).await.map(|r| {
            info!(
                "retested {}: {} newly functional, {} still failing",
                r.retested, r.newly_functional, r.still_failed
            );
        }),
        Mode::Report(department) => pipeline.detailed_report(department.as_deref()).map(|r| {
            match serde_json::to_string_pretty(&r) {
                Ok(json) => println!("{json}"),
                Err(e) => warn!("cannot serialize report: {e}"),
            }
        }),
    };

    signal_task.abort();
    outcome.context("run aborted")?;
    Ok(())
}
