use clap::Parser;
use miette::{IntoDiagnostic, Result};
use orderflow::application::engine::OrderLifecycle;
use orderflow::application::reconciliation::Reconciler;
use orderflow::config::{GatewayKind, Settings};
use orderflow::domain::audit::AuditEvent;
use orderflow::domain::ports::{OrderRepositoryRef, PaymentGatewayRef};
use orderflow::infrastructure::audit::{FanoutAuditSink, InMemoryAuditSink, TracingAuditSink};
use orderflow::infrastructure::in_memory::InMemoryOrderRepository;
use orderflow::infrastructure::razorpay::RazorpayGateway;
#[cfg(feature = "storage-rocksdb")]
use orderflow::infrastructure::rocksdb::RocksDBOrderRepository;
use orderflow::infrastructure::simulated_gateway::SimulatedGateway;
use orderflow::interfaces::csv::order_writer::OrderWriter;
use orderflow::interfaces::jsonl::event_reader::EventReader;
use orderflow::interfaces::replay::{ReplayOutcome, Replayer};
use orderflow::telemetry::init_tracing;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Checkout event log (JSON Lines)
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    #[command(flatten)]
    settings: Settings,
}

#[cfg(feature = "storage-rocksdb")]
fn open_repository(db_path: Option<PathBuf>) -> Result<OrderRepositoryRef> {
    let repository: OrderRepositoryRef = match db_path {
        Some(path) => Arc::new(RocksDBOrderRepository::open(path).into_diagnostic()?),
        None => Arc::new(InMemoryOrderRepository::new()),
    };
    Ok(repository)
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_repository(db_path: Option<PathBuf>) -> Result<OrderRepositoryRef> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Arc::new(InMemoryOrderRepository::new()))
}

/// Prints every security alert and anomaly raised during the replay.
fn report_flagged(audit: &InMemoryAuditSink) {
    for event in audit.flagged() {
        match &event {
            AuditEvent::SecurityAlert {
                gateway_order_ref, ..
            } => eprintln!(
                "Order {}: flagged for review: signature mismatch on {gateway_order_ref}",
                event.order_id()
            ),
            AuditEvent::Anomaly { detail, .. } => {
                eprintln!("Order {}: flagged for review: {detail}", event.order_id())
            }
            AuditEvent::Transition(_) => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.settings.log_format);

    let repository = open_repository(cli.db_path)?;
    let engine_config = cli.settings.engine_config();
    let (gateway, simulator) = match cli.settings.gateway {
        GatewayKind::Simulated => {
            let simulator = Arc::new(SimulatedGateway::new(
                cli.settings.key_id.clone(),
                cli.settings.key_secret.clone(),
            ));
            let gateway: PaymentGatewayRef = simulator.clone();
            (gateway, Some(simulator))
        }
        GatewayKind::Razorpay => {
            let config = cli.settings.razorpay_config().into_diagnostic()?;
            let gateway = RazorpayGateway::new(config, engine_config.gateway_timeout)
                .into_diagnostic()?;
            let gateway: PaymentGatewayRef = Arc::new(gateway);
            (gateway, None)
        }
    };

    let review = InMemoryAuditSink::new();
    let audit = FanoutAuditSink::new(vec![Arc::new(TracingAuditSink), Arc::new(review.clone())]);
    let lifecycle = Arc::new(OrderLifecycle::new(
        repository,
        gateway,
        Arc::new(audit),
        engine_config,
    ));
    let reconciler = Reconciler::new(lifecycle.clone(), cli.settings.reconciliation_policy())
        .into_diagnostic()?;
    info!(
        currency = %lifecycle.config().currency,
        gateway_timeout = ?lifecycle.config().gateway_timeout,
        pending_timeout = ?reconciler.policy().pending_timeout,
        "replaying checkout events"
    );
    let replayer = Replayer::new(lifecycle.clone(), reconciler, simulator);

    let file = File::open(cli.input).into_diagnostic()?;
    for (line, event) in EventReader::new(file).events() {
        match event {
            Ok(event) => match replayer.apply(event).await {
                Ok(ReplayOutcome::Settled(order)) => {
                    if let Err(e) = order.outcome() {
                        eprintln!("Line {line}: payment not completed: {e}");
                    }
                }
                Ok(_) => {}
                Err(e) => eprintln!("Line {line}: error processing event: {e}"),
            },
            Err(e) => eprintln!("Line {line}: error reading event: {e}"),
        }
    }

    report_flagged(&review);

    let mut orders = lifecycle.list_all().await.into_diagnostic()?;
    orders.reverse();

    let stdout = io::stdout();
    let mut writer = OrderWriter::new(stdout.lock());
    writer.write_orders(&orders).into_diagnostic()?;

    Ok(())
}
