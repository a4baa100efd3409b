//! `run` command implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{encode_batch, DispatcherSettings, Event, LifecycleSource};
use dispatcher::{
    open_store, Dispatcher, DispatcherBuilder, DispatcherConfig, FlushTarget, SendOptions,
    ShutdownSignal,
};
use observability::{record_dispatcher_snapshot, SessionAggregator};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::settings::{apply_overrides, load_settings, parse_fields};
use crate::cli::RunArgs;

/// Execute the `run` command
pub async fn run_batcher(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let mut settings = load_settings(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    apply_overrides(&mut settings, args)?;

    info!(
        endpoint = %settings.transport.endpoint,
        batch_threshold = settings.batch_threshold,
        storage = ?settings.storage.kind,
        dry_run = args.dry_run,
        "Configuration loaded"
    );

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }

    let config = build_config(&settings, args)?;
    let store = open_store(&settings.storage).context("Failed to open storage")?;
    let shutdown = ShutdownSignal::install();

    let dispatcher = DispatcherBuilder::new(config)
        .store(store)
        .lifecycle(Arc::new(shutdown.clone()))
        .build()
        .context("Failed to start dispatcher")?;

    // Registered after the dispatcher, so WINDOW_CLOSED is queued before input stops
    let (stop_tx, stop_rx) = oneshot::channel();
    shutdown.on_unloading(Box::new(move || {
        let _ = stop_tx.send(());
    }));

    let started = Instant::now();
    let stdin = BufReader::new(tokio::io::stdin());
    let session = pump_events(&dispatcher, stdin, args, stop_rx).await?;

    let snapshot = dispatcher.metrics();
    record_dispatcher_snapshot(&snapshot);

    if !dispatcher
        .wait_idle(Duration::from_secs(args.idle_timeout))
        .await
    {
        warn!(
            in_flight = dispatcher.metrics().in_flight,
            "Posts still in flight after idle timeout"
        );
    }

    let snapshot = dispatcher.metrics();
    record_dispatcher_snapshot(&snapshot);
    let summary = session.summary(snapshot, started.elapsed());

    info!(
        events_sent = summary.events_sent,
        batches_flushed = snapshot.batches_flushed,
        pending = snapshot.queue_len,
        storage_key = %dispatcher.storage_key(),
        "Event Batcher finished"
    );
    println!("{summary}");

    Ok(())
}

/// Dispatcher config from settings plus CLI-only options
fn build_config(settings: &DispatcherSettings, args: &RunArgs) -> Result<DispatcherConfig> {
    let mut config = DispatcherConfig::from_settings(settings);

    if args.dry_run {
        info!("Dry run mode - batches are logged, not posted");
        config = config.with_flush_target(dry_run_target());
    }

    let fields = parse_fields(&args.fields)?;
    if !fields.is_empty() {
        config = config.with_enricher(move |mut event| {
            for (key, value) in &fields {
                event.insert(key.clone(), value.clone());
            }
            event
        });
    }

    Ok(config)
}

fn dry_run_target() -> FlushTarget {
    FlushTarget::callback(|events: Vec<Event>| async move {
        encode_batch(&events).map(|body| {
            info!(batch = events.len(), body = %body, "Dry run batch");
        })
    })
}

/// Feed every input line to the dispatcher until EOF or shutdown
///
/// The previous event is held back one line so the last one can be sent
/// forcefully.
async fn pump_events<R>(
    dispatcher: &Dispatcher,
    input: R,
    args: &RunArgs,
    mut stop: oneshot::Receiver<()>,
) -> Result<SessionAggregator>
where
    R: AsyncBufRead + Unpin,
{
    let mut session = SessionAggregator::new();
    let mut lines = input.lines();
    let mut held: Option<(Event, usize)> = None;
    let options = SendOptions {
        forceful: false,
        debug_log: args.debug_log,
    };
    let mut interrupted = false;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = &mut stop => {
                warn!("Shutdown requested, stopping input");
                interrupted = true;
                None
            }
        };
        let Some(line) = line else { break };

        session.record_line();
        let Some(event) = parse_line(&line, &mut session) else {
            continue;
        };

        if let Some((previous, bytes)) = held.replace((event, line.len())) {
            send(dispatcher, &mut session, previous, bytes, options);
        }
    }

    if let Some((last, bytes)) = held {
        let options = SendOptions {
            forceful: args.force_last && !interrupted,
            ..options
        };
        send(dispatcher, &mut session, last, bytes, options);
    }

    Ok(session)
}

fn send(
    dispatcher: &Dispatcher,
    session: &mut SessionAggregator,
    event: Event,
    bytes: usize,
    options: SendOptions,
) {
    session.record_sent(event.event_name(), bytes);
    dispatcher.send_event_with(event, options);
}

/// Parse one input line; anything but a JSON object is skipped
fn parse_line(line: &str, session: &mut SessionAggregator) -> Option<Event> {
    let line = line.trim();
    if line.is_empty() {
        session.record_skipped("empty");
        return None;
    }

    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Skipping line that is not valid JSON");
            session.record_skipped("invalid_json");
            return None;
        }
    };

    match Event::try_from(value) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!(error = %e, "Skipping non-object line");
            session.record_skipped("not_an_object");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::sync::Mutex;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        run: RunArgs,
    }

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["event-batcher"];
        argv.extend_from_slice(extra);
        Wrapper::parse_from(argv).run
    }

    type Batches = Arc<Mutex<Vec<Vec<Event>>>>;

    fn recording_dispatcher(threshold: usize) -> (Dispatcher, Batches) {
        let batches: Batches = Arc::default();
        let sink = Arc::clone(&batches);
        let target = FlushTarget::callback(move |events| {
            sink.lock().unwrap().push(events);
            async { Ok(()) }
        });
        let dispatcher =
            Dispatcher::new(DispatcherConfig::new(target).with_batch_threshold(threshold))
                .unwrap();
        (dispatcher, batches)
    }

    #[tokio::test]
    async fn test_pump_skips_invalid_lines() {
        let (dispatcher, _batches) = recording_dispatcher(10);
        let input: &[u8] = b"{\"eventName\":\"a\"}\nnot json\n[1,2]\n\n{\"eventName\":\"b\"}\n";
        let (_stop_tx, stop_rx) = oneshot::channel();

        let session = pump_events(&dispatcher, input, &run_args(&[]), stop_rx)
            .await
            .unwrap();

        assert_eq!(session.lines_read, 5);
        assert_eq!(session.events_sent, 2);
        assert_eq!(session.lines_skipped, 3);
        let names: Vec<_> = dispatcher
            .get_event_list()
            .iter()
            .map(|e| e.event_name().map(str::to_string))
            .collect();
        assert_eq!(names, vec![Some("a".to_string()), Some("b".to_string())]);
    }

    #[tokio::test]
    async fn test_force_last_flushes_tail() {
        let (dispatcher, batches) = recording_dispatcher(10);
        let input: &[u8] = b"{\"n\":1}\n{\"n\":2}\n";
        let (_stop_tx, stop_rx) = oneshot::channel();

        pump_events(&dispatcher, input, &run_args(&["--force-last"]), stop_rx)
            .await
            .unwrap();
        assert!(dispatcher.wait_idle(Duration::from_secs(2)).await);

        let batches = batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(dispatcher.get_event_list().len(), 2);
    }

    #[tokio::test]
    async fn test_enricher_from_set_flags() {
        let settings: DispatcherSettings = serde_json::from_value(serde_json::json!({
            "batch_threshold": 5,
            "transport": { "endpoint": "https://collector.example.com/events" }
        }))
        .unwrap();
        let args = run_args(&["--dry-run", "--set", "app=shop"]);

        let dispatcher = Dispatcher::new(build_config(&settings, &args).unwrap()).unwrap();
        dispatcher.send_event(Event::named("view"));

        let events = dispatcher.get_event_list();
        assert_eq!(events[0].get("app"), Some(&serde_json::json!("shop")));
    }
}
