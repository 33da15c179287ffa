mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    DialogService, QueryContext, QueryMarkerOption, QueryScroller, Record, ReqwestClient,
    ScrollEntry, SessionContext,
};
use shared::domain::{DialogHandle, RecordId, SessionId, TenantId, UserId};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{load_settings, Settings};

/// Pages through a dialog's query and prints each record as a JSON line.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    tenant_id: Option<String>,
    #[arg(long)]
    session_id: Option<String>,
    #[arg(long)]
    user_id: Option<String>,
    #[arg(long)]
    page_size: Option<usize>,
    /// Handle of the dialog whose query is paged.
    #[arg(long)]
    dialog: String,
    /// Record id the window starts from.
    #[arg(long)]
    anchor: Option<String>,
    /// Forward pages to load, including the first.
    #[arg(long, default_value_t = 1)]
    pages: usize,
    /// Also load one page before the first record.
    #[arg(long)]
    backward: bool,
}

impl Args {
    fn apply(&self, settings: &mut Settings) {
        if let Some(v) = &self.server_url {
            settings.server_url = v.clone();
        }
        if let Some(v) = &self.tenant_id {
            settings.tenant_id = v.clone();
        }
        if let Some(v) = &self.session_id {
            settings.session_id = Some(v.clone());
        }
        if let Some(v) = &self.user_id {
            settings.user_id = Some(v.clone());
        }
        if let Some(v) = self.page_size {
            settings.page_size = v;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    args.apply(&mut settings);
    let session_id = settings
        .session_id
        .clone()
        .context("no session id: pass --session-id or set DIALOG_SESSION_ID")?;

    let mut session = SessionContext::new(
        settings.server_url.clone(),
        TenantId::new(settings.tenant_id.clone()),
        SessionId::new(session_id),
    );
    if let Some(user_id) = &settings.user_id {
        session = session.with_user(UserId::new(user_id.clone()));
    }

    let http = ReqwestClient::new().context("building http client")?;
    let service = DialogService::with_default_models(Arc::new(http));
    let scroller = QueryContext::new(service, session, DialogHandle::new(args.dialog.clone()))
        .into_scroller(
            args.anchor.clone().map(RecordId::new),
            vec![QueryMarkerOption::IsEmpty, QueryMarkerOption::HasMore],
        );

    load_window(&scroller, &args, settings.page_size).await?;
    info!(
        dialog = %args.dialog,
        buffered = scroller.len(),
        complete = scroller.is_complete(),
        "query window loaded"
    );

    for entry in scroller.buffer_with_markers() {
        match entry {
            ScrollEntry::Record(record) => print_record(&record)?,
            ScrollEntry::Marker(marker) => eprintln!("[{marker:?}]"),
        }
    }
    Ok(())
}

async fn load_window(scroller: &QueryScroller, args: &Args, page_size: usize) -> Result<()> {
    scroller
        .refresh(page_size)
        .await
        .context("loading first page")?;
    for page in 1..args.pages {
        if !scroller.has_more_forward() {
            break;
        }
        scroller
            .page_forward(page_size)
            .await
            .with_context(|| format!("loading forward page {}", page + 1))?;
    }
    if args.backward {
        scroller
            .page_backward(page_size)
            .await
            .context("loading backward page")?;
    }
    Ok(())
}

fn print_record(record: &Record) -> Result<()> {
    println!("{}", serde_json::to_string(record)?);
    Ok(())
}
